// 1.1: fixed-point arithmetic. a signed i128 read as value * 2^-48: 80 integer bits, 48 fractional.
// every balance, price, weight and rate in the engine is one of these. no floats anywhere near solvency.
// library code goes through try_* (Result) so overflow surfaces as an error instead of a panic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FRAC_BITS: u32 = 48;
const FRAC_MASK: u128 = (1u128 << FRAC_BITS) - 1;
const LOW_64: u128 = u64::MAX as u128;

// 16 decimal digits is finer than 2^-49, so display -> parse is lossless
const DISPLAY_DIGITS: usize = 16;
// 14 digits is coarser than 2^-48, so representation error never shows
const UI_DIGITS: usize = 14;
// parse keeps 20 fractional digits: frac * 2^48 still fits in u128
const PARSE_DIGITS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("fixed-point arithmetic overflow")]
    Overflow,

    #[error("fixed-point division by zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFixedError {
    #[error("invalid fixed-point literal {0:?}")]
    Invalid(String),

    #[error("fixed-point literal {0:?} out of range")]
    OutOfRange(String),
}

/// Signed 80.48 binary fixed-point number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixedPoint(i128);

impl FixedPoint {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1 << FRAC_BITS);
    pub const MAX: Self = Self(i128::MAX);
    pub const MIN: Self = Self(i128::MIN);
    /// Smallest positive value, 2^-48.
    pub const DELTA: Self = Self(1);

    pub const fn from_bits(bits: i128) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> i128 {
        self.0
    }

    pub const fn from_num(value: i64) -> Self {
        Self((value as i128) << FRAC_BITS)
    }

    pub const fn from_u64(value: u64) -> Self {
        Self((value as i128) << FRAC_BITS)
    }

    /// num / den, e.g. `from_ratio(3, 4)` is 0.75.
    pub fn from_ratio(num: i64, den: i64) -> Result<Self, MathError> {
        Self::from_num(num).try_div(Self::from_num(den))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        mul_bits(self.0, rhs.0).map(Self)
    }

    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        div_bits(self.0, rhs.0).ok().map(Self)
    }

    pub fn checked_neg(self) -> Option<Self> {
        self.0.checked_neg().map(Self)
    }

    pub fn checked_abs(self) -> Option<Self> {
        self.0.checked_abs().map(Self)
    }

    pub fn try_add(self, rhs: Self) -> Result<Self, MathError> {
        self.checked_add(rhs).ok_or(MathError::Overflow)
    }

    pub fn try_sub(self, rhs: Self) -> Result<Self, MathError> {
        self.checked_sub(rhs).ok_or(MathError::Overflow)
    }

    pub fn try_mul(self, rhs: Self) -> Result<Self, MathError> {
        self.checked_mul(rhs).ok_or(MathError::Overflow)
    }

    pub fn try_div(self, rhs: Self) -> Result<Self, MathError> {
        div_bits(self.0, rhs.0).map(Self)
    }

    pub fn try_neg(self) -> Result<Self, MathError> {
        self.checked_neg().ok_or(MathError::Overflow)
    }

    pub fn try_abs(self) -> Result<Self, MathError> {
        self.checked_abs().ok_or(MathError::Overflow)
    }

    /// Division that clamps to MIN/MAX instead of failing. Only for display ratios.
    pub fn saturating_div(self, rhs: Self) -> Self {
        match div_bits(self.0, rhs.0) {
            Ok(bits) => Self(bits),
            Err(_) if self.is_negative() != rhs.is_negative() => Self::MIN,
            Err(_) => Self::MAX,
        }
    }

    /// Largest integer value <= self. Exact, never overflows.
    pub fn floor(self) -> Self {
        Self(self.0 & !(FRAC_MASK as i128))
    }

    /// Smallest integer value >= self.
    pub fn checked_ceil(self) -> Option<Self> {
        if self.0 as u128 & FRAC_MASK == 0 {
            Some(self)
        } else {
            self.floor().checked_add(Self::ONE)
        }
    }

    pub fn round_to_zero(self) -> Self {
        if self.is_negative() {
            let magnitude = self.0.unsigned_abs() & !FRAC_MASK;
            Self((magnitude as i128).wrapping_neg())
        } else {
            self.floor()
        }
    }

    pub fn to_i64_floor(self) -> Option<i64> {
        i64::try_from(self.0 >> FRAC_BITS).ok()
    }

    pub fn to_i64_ceil(self) -> Option<i64> {
        self.checked_ceil()?.to_i64_floor()
    }

    pub fn to_i64_round_to_zero(self) -> Option<i64> {
        self.round_to_zero().to_i64_floor()
    }

    /// Rounded through `to_ui_string`, so 0.85 comes back as exactly 0.85.
    pub fn to_decimal(self) -> Option<Decimal> {
        Decimal::from_str(&self.to_ui_string()).ok()
    }
}

/// Full 256-bit product of two magnitudes as (high, low).
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = (a >> 64, a & LOW_64);
    let (b1, b0) = (b >> 64, b & LOW_64);
    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let (mid, carry_a) = p01.overflowing_add(p10);
    let (mid, carry_b) = mid.overflowing_add(p00 >> 64);
    let carries = (carry_a as u128 + carry_b as u128) << 64;

    let low = (mid << 64) | (p00 & LOW_64);
    let high = p11 + (mid >> 64) + carries;
    (high, low)
}

// product >> 48, rounding toward negative infinity like an arithmetic shift
fn mul_bits(a: i128, b: i128) -> Option<i128> {
    let negative = (a < 0) != (b < 0);
    let (high, low) = widening_mul(a.unsigned_abs(), b.unsigned_abs());
    if high >> FRAC_BITS != 0 {
        return None;
    }
    let mut magnitude = (high << (128 - FRAC_BITS)) | (low >> FRAC_BITS);
    let truncated = low & FRAC_MASK != 0;

    if negative {
        if truncated {
            magnitude = magnitude.checked_add(1)?;
        }
        from_negative_magnitude(magnitude)
    } else {
        i128::try_from(magnitude).ok()
    }
}

// (a << 48) / b on 256 bits, truncating toward zero
fn div_bits(a: i128, b: i128) -> Result<i128, MathError> {
    if b == 0 {
        return Err(MathError::DivisionByZero);
    }
    let negative = (a < 0) != (b < 0);
    let divisor = b.unsigned_abs();
    let numerator = a.unsigned_abs();
    let high = numerator >> (128 - FRAC_BITS);
    let low = numerator << FRAC_BITS;
    if high >= divisor {
        return Err(MathError::Overflow);
    }

    let mut remainder = high;
    let mut quotient: u128 = 0;
    for i in (0..128).rev() {
        let carry = remainder >> 127;
        remainder = (remainder << 1) | ((low >> i) & 1);
        quotient <<= 1;
        if carry == 1 || remainder >= divisor {
            remainder = remainder.wrapping_sub(divisor);
            quotient |= 1;
        }
    }

    if negative {
        from_negative_magnitude(quotient).ok_or(MathError::Overflow)
    } else {
        i128::try_from(quotient).map_err(|_| MathError::Overflow)
    }
}

fn from_negative_magnitude(magnitude: u128) -> Option<i128> {
    if magnitude > 1u128 << 127 {
        None
    } else {
        // 2^127 maps onto i128::MIN
        Some((magnitude as i128).wrapping_neg())
    }
}

// integer and fraction digits of a magnitude, fraction rounded half-up to `digits` places
fn decimal_parts(magnitude: u128, digits: usize) -> (u128, u128) {
    let scale = 10u128.pow(digits as u32);
    let integer = magnitude >> FRAC_BITS;
    let fraction = ((magnitude & FRAC_MASK) * scale + (1u128 << (FRAC_BITS - 1))) >> FRAC_BITS;
    if fraction == scale {
        (integer + 1, 0)
    } else {
        (integer, fraction)
    }
}

fn write_decimal(negative: bool, integer: u128, fraction: u128, digits: usize, trim: bool) -> String {
    let mut out = String::new();
    if negative && (integer != 0 || fraction != 0) {
        out.push('-');
    }
    out.push_str(&integer.to_string());
    if digits > 0 && !(trim && fraction == 0) {
        let padded = format!("{:0width$}", fraction, width = digits);
        out.push('.');
        out.push_str(if trim { padded.trim_end_matches('0') } else { &padded });
    }
    out
}

impl FixedPoint {
    /// Rounded to 14 fractional digits with trailing zeros trimmed. Hides the
    /// binary truncation noise, e.g. 0.1 reads as "0.1". Not lossless.
    pub fn to_ui_string(self) -> String {
        let (integer, fraction) = decimal_parts(self.0.unsigned_abs(), UI_DIGITS);
        write_decimal(self.0 < 0, integer, fraction, UI_DIGITS, true)
    }
}

// `{}` is lossless (16 digits, parses back to the same bits).
// `{:.N}` rounds to 14 digits first, then to N, so noise never leaks into the last place.
impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let magnitude = self.0.unsigned_abs();
        let out = match f.precision() {
            None => {
                let (integer, fraction) = decimal_parts(magnitude, DISPLAY_DIGITS);
                write_decimal(negative, integer, fraction, DISPLAY_DIGITS, true)
            }
            Some(precision) => {
                let precision = precision.min(UI_DIGITS);
                let (mut integer, fraction) = decimal_parts(magnitude, UI_DIGITS);
                let step = 10u128.pow((UI_DIGITS - precision) as u32);
                let mut rounded = (fraction + step / 2) / step;
                if rounded == 10u128.pow(precision as u32) {
                    integer += 1;
                    rounded = 0;
                }
                write_decimal(negative, integer, rounded, precision, false)
            }
        };
        f.write_str(&out)
    }
}

impl fmt::Debug for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for FixedPoint {
    type Err = ParseFixedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseFixedError::Invalid(s.to_string());
        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let out_of_range = || ParseFixedError::OutOfRange(s.to_string());
        let integer: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| out_of_range())?
        };
        if integer >> (127 - FRAC_BITS) > 1 {
            return Err(out_of_range());
        }

        let mut frac_digits: String = frac_part.chars().take(PARSE_DIGITS).collect();
        while frac_digits.len() < PARSE_DIGITS {
            frac_digits.push('0');
        }
        let frac_scaled: u128 = frac_digits.parse().map_err(|_| invalid())?;
        let denom = 10u128.pow(PARSE_DIGITS as u32);
        let frac_bits = ((frac_scaled << FRAC_BITS) + denom / 2) / denom;

        let magnitude = (integer << FRAC_BITS)
            .checked_add(frac_bits)
            .ok_or_else(out_of_range)?;
        let bits = if negative {
            from_negative_magnitude(magnitude)
        } else {
            i128::try_from(magnitude).ok()
        };
        bits.map(Self).ok_or_else(out_of_range)
    }
}

impl TryFrom<String> for FixedPoint {
    type Error = ParseFixedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FixedPoint> for String {
    fn from(value: FixedPoint) -> Self {
        value.to_string()
    }
}

impl TryFrom<Decimal> for FixedPoint {
    type Error = ParseFixedError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        value.to_string().parse()
    }
}

impl From<i64> for FixedPoint {
    fn from(value: i64) -> Self {
        Self::from_num(value)
    }
}

impl From<u64> for FixedPoint {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

// operator forms panic on overflow like std integers. unit tests only; library code
// goes through the try_* forms.
#[cfg(test)]
mod ops {
    use super::FixedPoint;
    use std::iter::Sum;
    use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

    impl Add for FixedPoint {
        type Output = Self;
        fn add(self, rhs: Self) -> Self {
            self.checked_add(rhs).expect("attempt to add with overflow")
        }
    }

    impl Sub for FixedPoint {
        type Output = Self;
        fn sub(self, rhs: Self) -> Self {
            self.checked_sub(rhs).expect("attempt to subtract with overflow")
        }
    }

    impl Mul for FixedPoint {
        type Output = Self;
        fn mul(self, rhs: Self) -> Self {
            self.checked_mul(rhs).expect("attempt to multiply with overflow")
        }
    }

    impl Div for FixedPoint {
        type Output = Self;
        fn div(self, rhs: Self) -> Self {
            match self.try_div(rhs) {
                Ok(v) => v,
                Err(e) => panic!("fixed-point division failed: {e}"),
            }
        }
    }

    impl Neg for FixedPoint {
        type Output = Self;
        fn neg(self) -> Self {
            self.checked_neg().expect("attempt to negate with overflow")
        }
    }

    impl AddAssign for FixedPoint {
        fn add_assign(&mut self, rhs: Self) {
            *self = *self + rhs;
        }
    }

    impl SubAssign for FixedPoint {
        fn sub_assign(&mut self, rhs: Self) {
            *self = *self - rhs;
        }
    }

    impl Sum for FixedPoint {
        fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
            iter.fold(FixedPoint::ZERO, |acc, x| acc + x)
        }
    }
}

/// Overflow-checked sum for engine code.
pub fn try_sum<I: IntoIterator<Item = FixedPoint>>(values: I) -> Result<FixedPoint, MathError> {
    values
        .into_iter()
        .try_fold(FixedPoint::ZERO, |acc, x| acc.try_add(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    #[test]
    fn one_is_two_to_the_48() {
        assert_eq!(FixedPoint::ONE.to_bits(), 1i128 << 48);
        assert_eq!(FixedPoint::from_num(-3).to_bits(), -3i128 << 48);
    }

    #[test]
    fn mul_keeps_fraction_precision() {
        assert_eq!(fp("1.5") * fp("2.25"), fp("3.375"));
        assert_eq!(fp("-1.5") * fp("2"), fp("-3"));
        assert_eq!(fp("0.5") * fp("0.5"), fp("0.25"));
    }

    #[test]
    fn mul_truncates_toward_negative_infinity() {
        let tiny = FixedPoint::DELTA;
        let half = fp("0.5");
        assert_eq!(tiny * half, FixedPoint::ZERO);
        assert_eq!((-tiny) * half, -tiny);
    }

    #[test]
    fn mul_overflow_is_reported() {
        let big = FixedPoint::from_num(1i64 << 50);
        assert_eq!(big.checked_mul(big), None);
        assert_eq!(big.try_mul(big), Err(MathError::Overflow));
        assert!(FixedPoint::from_num(1i64 << 39).checked_mul(FixedPoint::from_num(1 << 30)).is_some());
    }

    #[test]
    fn checked_forms_report_what_operators_panic_on() {
        assert_eq!(FixedPoint::MAX.try_add(FixedPoint::DELTA), Err(MathError::Overflow));
        assert_eq!(FixedPoint::MIN.try_sub(FixedPoint::DELTA), Err(MathError::Overflow));
        assert_eq!(FixedPoint::MIN.try_neg(), Err(MathError::Overflow));
        assert!(std::panic::catch_unwind(|| FixedPoint::MAX + FixedPoint::DELTA).is_err());
    }

    #[test]
    fn mul_large_operands_uses_wide_intermediate() {
        // both operands have > 64 significant bits
        let a = FixedPoint::from_num(1_000_000_000_000);
        let b = fp("0.000001");
        let product = a * b;
        assert!((product - FixedPoint::from_num(1_000_000)).try_abs().unwrap() < fp("0.01"));
    }

    #[test]
    fn div_shifts_dividend() {
        assert_eq!(fp("1") / fp("4"), fp("0.25"));
        assert_eq!(fp("-7.5") / fp("2.5"), fp("-3"));
        assert_eq!(FixedPoint::from_ratio(1, 3).unwrap() * fp("3") <= FixedPoint::ONE, true);
    }

    #[test]
    fn div_by_zero_is_an_error() {
        assert_eq!(FixedPoint::ONE.try_div(FixedPoint::ZERO), Err(MathError::DivisionByZero));
        assert_eq!(FixedPoint::ONE.checked_div(FixedPoint::ZERO), None);
    }

    #[test]
    fn div_overflow_is_an_error() {
        let big = FixedPoint::from_num(1i64 << 60);
        assert_eq!(big.try_div(FixedPoint::DELTA), Err(MathError::Overflow));
    }

    #[test]
    fn floor_and_ceil_are_exact() {
        assert_eq!(fp("2.7").floor(), fp("2"));
        assert_eq!(fp("-2.7").floor(), fp("-3"));
        assert_eq!(fp("2.1").checked_ceil(), Some(fp("3")));
        assert_eq!(fp("-2.1").checked_ceil(), Some(fp("-2")));
        assert_eq!(fp("5").checked_ceil(), Some(fp("5")));
        assert_eq!(FixedPoint::MAX.checked_ceil(), None);
    }

    #[test]
    fn round_to_zero_drops_fraction() {
        assert_eq!(fp("2.7").round_to_zero(), fp("2"));
        assert_eq!(fp("-2.7").round_to_zero(), fp("-2"));
        assert_eq!(fp("-2.7").to_i64_round_to_zero(), Some(-2));
        assert_eq!(fp("-2.7").to_i64_floor(), Some(-3));
        assert_eq!(fp("2.2").to_i64_ceil(), Some(3));
    }

    #[test]
    fn display_trims_and_rounds() {
        assert_eq!(fp("1.25").to_string(), "1.25");
        assert_eq!(fp("-0.5").to_string(), "-0.5");
        assert_eq!(FixedPoint::from_num(42).to_string(), "42");
        assert_eq!(FixedPoint::from_ratio(1, 3).unwrap().to_ui_string(), "0.33333333333333");
        assert_eq!(format!("{:.2}", fp("3.14159")), "3.14");
        assert_eq!(format!("{:.2}", fp("2")), "2.00");
    }

    #[test]
    fn ui_string_hides_truncation_noise() {
        // 0.1 is not representable in binary
        assert_ne!(fp("0.1").to_string(), "0.1");
        assert_eq!(fp("0.1").to_ui_string(), "0.1");
        assert_eq!((fp("0.1") + fp("0.2")).to_ui_string(), "0.3");
        assert_eq!(format!("{:.3}", fp("0.1")), "0.100");
        assert_eq!(fp("-0.1").to_ui_string(), "-0.1");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<FixedPoint>().is_err());
        assert!("1.2.3".parse::<FixedPoint>().is_err());
        assert!("abc".parse::<FixedPoint>().is_err());
        assert!(".".parse::<FixedPoint>().is_err());
        assert!("99999999999999999999999999".parse::<FixedPoint>().is_err());
    }

    #[test]
    fn extremes_round_trip_through_strings() {
        for v in [FixedPoint::MAX, FixedPoint::MIN, FixedPoint::DELTA, -FixedPoint::DELTA] {
            assert_eq!(v.to_string().parse::<FixedPoint>().unwrap(), v);
        }
    }

    #[test]
    fn decimal_conversion() {
        let v = FixedPoint::try_from(dec!(0.85)).unwrap();
        assert_eq!(v, fp("0.85"));
        assert_eq!(v.to_decimal(), Some(dec!(0.85)));
    }

    #[test]
    fn serde_as_string() {
        let json = serde_json::to_string(&fp("1.5")).unwrap();
        assert_eq!(json, "\"1.5\"");
        let back: FixedPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp("1.5"));
    }

    #[test]
    fn ordering_and_clamp() {
        assert!(fp("-1") < fp("0.5"));
        assert_eq!(fp("3").clamp(fp("-1"), fp("1")), fp("1"));
        assert_eq!(fp("-3").max(fp("-1")), fp("-1"));
        assert_eq!(try_sum([fp("1"), fp("2"), fp("-0.5")]), Ok(fp("2.5")));
        assert_eq!(try_sum([FixedPoint::MAX, FixedPoint::ONE]), Err(MathError::Overflow));
    }
}

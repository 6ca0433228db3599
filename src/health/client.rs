// 8.3: closed-form "how much can move before health hits zero" helpers. health is piecewise
// linear in a token balance: one slope while the balance is an asset, another once it is a liab.

use super::HealthError;
use crate::fixed::FixedPoint;

/// Amount of a token that can be removed from `starting_spot` before `health` reaches zero.
/// The first part comes out of the asset balance, the rest becomes a liability.
pub fn spot_amount_taken_for_health_zero(
    mut health: FixedPoint,
    starting_spot: FixedPoint,
    asset_weighted_price: FixedPoint,
    liab_weighted_price: FixedPoint,
) -> Result<FixedPoint, HealthError> {
    if !health.is_positive() {
        return Ok(FixedPoint::ZERO);
    }
    let mut taken_spot = FixedPoint::ZERO;
    if starting_spot.is_positive() {
        if asset_weighted_price.is_positive() {
            let asset_max = health.try_div(asset_weighted_price)?;
            if asset_max <= starting_spot {
                return Ok(asset_max);
            }
        }
        taken_spot = starting_spot;
        health = health.try_sub(starting_spot.try_mul(asset_weighted_price)?)?;
    }
    if health.is_positive() {
        if !liab_weighted_price.is_positive() {
            return Err(HealthError::NonPositiveLiabPrice);
        }
        taken_spot = taken_spot.try_add(health.try_div(liab_weighted_price)?)?;
    }
    Ok(taken_spot)
}

/// Amount of a token that must be added to `starting_spot` to lift negative `health` to zero.
pub fn spot_amount_given_for_health_zero(
    health: FixedPoint,
    starting_spot: FixedPoint,
    asset_weighted_price: FixedPoint,
    liab_weighted_price: FixedPoint,
) -> Result<FixedPoint, HealthError> {
    spot_amount_taken_for_health_zero(
        health.try_neg()?,
        starting_spot.try_neg()?,
        liab_weighted_price,
        asset_weighted_price,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    #[test]
    fn taken_within_asset_balance() {
        // 100 health, asset worth 2 weighted: 50 can go before health is zero
        let taken = spot_amount_taken_for_health_zero(fp("100"), fp("80"), fp("2"), fp("4")).unwrap();
        assert_eq!(taken, fp("50"));
    }

    #[test]
    fn taken_crosses_into_borrow() {
        // 20 of asset uses 40 health, remaining 60 at 4 per unit borrowed = 15
        let taken = spot_amount_taken_for_health_zero(fp("100"), fp("20"), fp("2"), fp("4")).unwrap();
        assert_eq!(taken, fp("35"));
    }

    #[test]
    fn nothing_taken_from_unhealthy_account() {
        let taken = spot_amount_taken_for_health_zero(fp("-5"), fp("20"), fp("2"), fp("4")).unwrap();
        assert_eq!(taken, FixedPoint::ZERO);
    }

    #[test]
    fn given_repays_borrow_first() {
        // -60 health with a 10 borrow: repaying 10 at 4 lifts 40, then 20 more at 2 per unit
        let given = spot_amount_given_for_health_zero(fp("-60"), fp("-10"), fp("2"), fp("4")).unwrap();
        assert_eq!(given, fp("20"));
    }

    #[test]
    fn zero_liab_price_is_an_error() {
        let err = spot_amount_taken_for_health_zero(fp("10"), FixedPoint::ZERO, fp("1"), FixedPoint::ZERO);
        assert!(matches!(err, Err(HealthError::NonPositiveLiabPrice)));
    }
}

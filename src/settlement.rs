// 10.0: settle pnl. perp profit is only real once it has been moved out of a losing
// counterparty's token balance. this module picks counterparties and sizes a settlement;
// the engine applies it.

use serde::{Deserialize, Serialize};

use crate::fixed::{FixedPoint, MathError};
use crate::market::PerpMarket;
use crate::types::AccountId;

/// Which end of the pnl distribution to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleDirection {
    MaxPositive,
    MaxNegative,
}

/// Snapshot of one account's position in the market, taken before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleCandidateInput {
    pub account: AccountId,
    /// Unsettled pnl at the oracle price, funding included
    pub pnl: FixedPoint,
    /// (min, max) from the position's settle limit window
    pub settle_limit: (i64, i64),
    /// How much of the settle token the account can pay out; only used for losers
    pub max_settle: FixedPoint,
}

impl SettleCandidateInput {
    pub fn limited_pnl(&self) -> FixedPoint {
        let (min, max) = self.settle_limit;
        self.pnl
            .clamp(FixedPoint::from_num(min), FixedPoint::from_num(max))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleCandidate {
    pub account: AccountId,
    /// Signed like the pnl: positive for winners, negative for losers
    pub settleable: FixedPoint,
}

fn rank<T>(items: &mut [T], direction: SettleDirection, candidate: impl Fn(&T) -> &SettleCandidate) {
    // account id breaks ties so the order never depends on input order
    items.sort_by(|a, b| {
        let (a, b) = (candidate(a), candidate(b));
        let by_amount = match direction {
            SettleDirection::MaxPositive => b.settleable.cmp(&a.settleable),
            SettleDirection::MaxNegative => a.settleable.cmp(&b.settleable),
        };
        by_amount.then(a.account.cmp(&b.account))
    });
}

/// A loser's settleable pnl once it is limited to what the account can pay out.
fn reclamp(settleable: FixedPoint, max_settle: FixedPoint) -> FixedPoint {
    if max_settle.is_positive() {
        settleable.max(max_settle.checked_neg().unwrap_or(FixedPoint::MIN))
    } else {
        FixedPoint::ZERO
    }
}

/// Up to `count` accounts with the largest settleable pnl in `direction`, best first.
///
/// Losers are further limited by `max_settle`, which only ever moves them toward zero. That
/// limit is applied walking down the ranking; once `count` reclamped entries sit strictly
/// ahead of their successor the head of the list cannot change anymore and the walk stops.
/// Losers that cannot pay anything stay in the list at zero.
pub fn settle_candidates(
    inputs: &[SettleCandidateInput],
    direction: SettleDirection,
    count: usize,
) -> Vec<SettleCandidate> {
    if count == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<(SettleCandidate, FixedPoint)> = inputs
        .iter()
        .filter_map(|input| {
            let limited = input.limited_pnl();
            let wanted = match direction {
                SettleDirection::MaxPositive => limited.is_positive(),
                SettleDirection::MaxNegative => limited.is_negative(),
            };
            let candidate = SettleCandidate {
                account: input.account,
                settleable: limited,
            };
            wanted.then_some((candidate, input.max_settle))
        })
        .collect();
    rank(&mut candidates, direction, |(c, _)| c);

    if direction == SettleDirection::MaxNegative {
        let mut stable = 0;
        for i in 0..candidates.len() {
            let next = candidates
                .get(i + 1)
                .map_or(FixedPoint::ZERO, |(c, _)| c.settleable);
            let (candidate, max_settle) = &mut candidates[i];
            candidate.settleable = reclamp(candidate.settleable, *max_settle);

            if candidate.settleable < next {
                stable += 1;
                if stable >= count {
                    break;
                }
            }
        }
        rank(&mut candidates, direction, |(c, _)| c);
    }

    candidates.truncate(count);
    candidates.into_iter().map(|(c, _)| c).collect()
}

/// Amount moved from loser `b` to winner `a`: bounded by both settle-limited pnls and by what
/// b can pay out of its settle token.
pub fn settlement_amount(
    a_settleable: FixedPoint,
    b_settleable: FixedPoint,
    b_max_settle: FixedPoint,
) -> Result<FixedPoint, MathError> {
    Ok(a_settleable
        .min(b_settleable.try_neg()?)
        .min(b_max_settle)
        .max(FixedPoint::ZERO))
}

/// Fee paid by the winner to whoever ran the settlement. A flat part once the amount
/// passes a threshold, plus a fraction that grows as the winner's health approaches
/// liquidation. Never more than the settlement itself.
pub fn compute_settle_fee(
    market: &PerpMarket,
    settlement: FixedPoint,
    liq_end_health: FixedPoint,
    maint_health: FixedPoint,
) -> Result<FixedPoint, MathError> {
    let low_health_fee = if liq_end_health.is_negative() {
        let fee = settlement.try_mul(market.settle_fee_fraction_low_health)?;
        if maint_health.is_negative() {
            fee
        } else {
            let scale = liq_end_health
                .try_neg()?
                .try_div(maint_health.try_sub(liq_end_health)?)?;
            fee.try_mul(scale)?
        }
    } else {
        FixedPoint::ZERO
    };

    let flat_fee = if settlement >= market.settle_fee_amount_threshold {
        market.settle_fee_flat
    } else {
        FixedPoint::ZERO
    };

    Ok(low_health_fee.try_add(flat_fee)?.min(settlement))
}

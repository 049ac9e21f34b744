//! Property-based tests for payout distribution.
//!
//! Every payout model must conserve the pool exactly: payouts are
//! non-negative, one per member, and sum to the distributable pool for any
//! member count and any portfolio values.

use bullpen_ledger::settlement::{MemberStanding, PayoutModel, RakeConfig};
use proptest::prelude::*;

fn standings(values: &[i64]) -> Vec<MemberStanding> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| MemberStanding {
            user_id: i as i64 + 1,
            buy_in: 100,
            portfolio_value: value,
            last_trade_at: None,
        })
        .collect()
}

fn arb_model() -> impl Strategy<Value = PayoutModel> {
    prop_oneof![
        Just(PayoutModel::WinnerTakeAll),
        Just(PayoutModel::ProportionalToValue),
        // Tier shares that sum to at most 100%.
        (0i64..=5_000, 0i64..=3_000, 0i64..=2_000)
            .prop_map(|(a, b, c)| PayoutModel::TieredTopThree { bps: [a, b, c] }),
    ]
}

proptest! {
    #[test]
    fn payouts_conserve_the_pool(
        model in arb_model(),
        pool in 0i64..=1_000_000_000,
        values in prop::collection::vec(-1_000_000i64..=1_000_000_000, 1..20),
    ) {
        let standings = standings(&values);
        let payouts = model.distribute(pool, &standings);

        prop_assert_eq!(payouts.len(), standings.len());
        prop_assert!(payouts.iter().all(|&p| p >= 0));
        prop_assert_eq!(payouts.iter().sum::<i64>(), pool.max(0));
    }

    #[test]
    fn winner_take_all_pays_only_rank_one(
        pool in 1i64..=1_000_000_000,
        values in prop::collection::vec(0i64..=1_000_000, 1..20),
    ) {
        let payouts = PayoutModel::WinnerTakeAll.distribute(pool, &standings(&values));
        prop_assert_eq!(payouts[0], pool);
        prop_assert!(payouts[1..].iter().all(|&p| p == 0));
    }

    #[test]
    fn rake_stays_within_band_and_pool(
        pool in 0i64..=1_000_000_000,
        bps in 0i64..=10_000,
        min in 0i64..=10_000,
        span in 0i64..=1_000_000,
    ) {
        let config = RakeConfig {
            percentage_bps: bps,
            min_amount: min,
            max_amount: min + span,
        };
        let rake = config.rake_for(pool);
        prop_assert!(rake >= 0);
        prop_assert!(rake <= pool.max(0));
        prop_assert!(rake <= min + span);
    }
}

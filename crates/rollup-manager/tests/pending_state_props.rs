//! Randomized checks of the pending-state protocol.

use proptest::prelude::*;
use std::collections::BTreeMap;

use rollup_manager::devnet::{Devnet, OUTSIDER, PERMISSIONLESS_AGGREGATOR};
use rollup_manager::{CallContext, Event, PendingState, RollupManagerError};

const PENDING_TIMEOUT: u64 = 1_000;

#[derive(Clone, Debug)]
enum Step {
    Sequence { batches: u64, wait: u64 },
    Verify { wait: u64 },
    Consolidate { num: u64, wait: u64 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1u64..4, 0u64..600).prop_map(|(batches, wait)| Step::Sequence { batches, wait }),
        (0u64..600).prop_map(|wait| Step::Verify { wait }),
        (1u64..8, 0u64..600).prop_map(|(num, wait)| Step::Consolidate { num, wait }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_consolidation_only_folds_aged_states(steps in prop::collection::vec(step(), 1..40)) {
        let mut net = Devnet::with_timeouts(0, PENDING_TIMEOUT).unwrap();
        let rollup_id = net.create_rollup(1001).unwrap();
        let mut now = 1;
        let mut last_tip = 0;
        net.sequence(rollup_id, 1, now).unwrap();

        for step in steps {
            let queued: BTreeMap<u64, PendingState> = net
                .manager
                .rollup(rollup_id)
                .unwrap()
                .pending_state_transitions
                .clone();

            match step {
                Step::Sequence { batches, wait } => {
                    now += wait;
                    net.sequence(rollup_id, batches, now).unwrap();
                }
                Step::Verify { wait } => {
                    now += wait;
                    let t = net.next_transition(rollup_id).unwrap();
                    let result = net.verify(PERMISSIONLESS_AGGREGATOR, rollup_id, &t, now);
                    if t.final_batch > t.init_batch {
                        prop_assert!(result.is_ok(), "{:?}", result);
                    } else {
                        let is_tip_error = matches!(
                            result,
                            Err(RollupManagerError::FinalBatchNotAboveTip { .. })
                        );
                        prop_assert!(is_tip_error);
                    }
                }
                Step::Consolidate { num, wait } => {
                    now += wait;
                    let rollup = net.manager.rollup(rollup_id).unwrap();
                    let in_range = num > rollup.last_pending_state_consolidated
                        && num <= rollup.last_pending_state;
                    let result = net
                        .manager
                        .consolidate_pending_state(&CallContext::new(OUTSIDER, now), rollup_id, num);
                    if !in_range {
                        prop_assert_eq!(result, Err(RollupManagerError::InvalidPendingStateNum(num)));
                    }
                }
            }

            for event in net.manager.drain_events() {
                if let Event::ConsolidatePendingState { pending_state_num, .. } = event {
                    let entry = queued
                        .get(&pending_state_num)
                        .copied()
                        .or_else(|| net.manager.pending_state(rollup_id, pending_state_num).unwrap());
                    let entry = entry.unwrap();
                    prop_assert!(entry.timestamp + PENDING_TIMEOUT <= now);
                }
            }

            let rollup = net.manager.rollup(rollup_id).unwrap();
            prop_assert!(rollup.last_pending_state_consolidated <= rollup.last_pending_state);
            prop_assert!(rollup.last_verified_batch <= rollup.effective_last_verified_batch());
            prop_assert!(rollup.effective_last_verified_batch() <= rollup.last_batch_sequenced);

            let tip = rollup.effective_last_verified_batch();
            prop_assert!(tip >= last_tip);
            last_tip = tip;
        }
    }

    #[test]
    fn prop_consolidating_twice_fails(waits in prop::collection::vec(0u64..300, 1..6)) {
        let mut net = Devnet::with_timeouts(0, PENDING_TIMEOUT).unwrap();
        let rollup_id = net.create_rollup(1001).unwrap();
        let mut now = 1;

        for wait in &waits {
            now += wait;
            net.sequence(rollup_id, 1, now).unwrap();
            let t = net.next_transition(rollup_id).unwrap();
            net.verify(PERMISSIONLESS_AGGREGATOR, rollup_id, &t, now).unwrap();
        }

        let last = net.manager.rollup(rollup_id).unwrap().last_pending_state;
        let late = CallContext::new(OUTSIDER, now + PENDING_TIMEOUT);
        net.manager.consolidate_pending_state(&late, rollup_id, last).unwrap();
        prop_assert_eq!(
            net.manager.consolidate_pending_state(&late, rollup_id, last),
            Err(RollupManagerError::InvalidPendingStateNum(last))
        );
    }
}

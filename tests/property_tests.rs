use proptest::prelude::*;

use partty::pty::{PtyError, PtyResult};
use partty::session::{Deferral, ReadinessGate};

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Write(Vec<u8>),
    Resize(u16, u16),
    Kill,
    Fail,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Op::Write),
        (1u16..500, 1u16..500).prop_map(|(cols, rows)| Op::Resize(cols, rows)),
        Just(Op::Kill),
        Just(Op::Fail),
    ]
}

type Gate = ReadinessGate<Vec<Op>, usize>;

fn submit(gate: &mut Gate, log: &mut Vec<Op>, runs: &mut usize, op: Op) -> PtyResult<Deferral> {
    gate.defer(log, runs, move |log, runs| {
        *runs += 1;
        if op == Op::Fail {
            return Err(PtyError::NotConnected);
        }
        log.push(op);
        Ok(())
    })
}

proptest! {
    #[test]
    fn test_replay_keeps_submission_order(
        before in prop::collection::vec(arb_op(), 0..32),
        after in prop::collection::vec(arb_op(), 0..8),
    ) {
        let mut gate = Gate::new();
        let mut log = Vec::new();
        let mut runs = 0;

        for op in before.iter().cloned() {
            prop_assert_eq!(submit(&mut gate, &mut log, &mut runs, op).unwrap(), Deferral::Queued);
        }
        prop_assert!(log.is_empty());
        prop_assert_eq!(runs, 0);

        let errors = gate.mark_ready(&mut log, &mut runs);
        prop_assert_eq!(runs, before.len());
        prop_assert_eq!(errors.len(), before.iter().filter(|op| **op == Op::Fail).count());

        let expected: Vec<Op> = before.iter().filter(|op| **op != Op::Fail).cloned().collect();
        prop_assert_eq!(&log, &expected);

        for op in after.iter().cloned() {
            let failing = op == Op::Fail;
            let result = submit(&mut gate, &mut log, &mut runs, op);
            prop_assert_eq!(result.is_err(), failing);
        }
        prop_assert_eq!(runs, before.len() + after.len());
        prop_assert!(gate.mark_ready(&mut log, &mut runs).is_empty());
        prop_assert_eq!(runs, before.len() + after.len());
    }
}

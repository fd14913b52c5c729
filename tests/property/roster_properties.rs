//! Property-based tests for id assignment

use proptest::prelude::*;

use mental_poker::game::Roster;
use mental_poker::{ParticipantId, SigningKey};

#[derive(Debug, Clone)]
enum Op {
    Register,
    Remove(usize),
    Disqualify(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Register),
        1 => any::<usize>().prop_map(Op::Remove),
        1 => any::<usize>().prop_map(Op::Disqualify),
    ]
}

proptest! {
    #[test]
    fn prop_ids_grow_strictly_and_are_never_reused(ops in prop::collection::vec(arb_op(), 1..40)) {
        let key = SigningKey::generate().public_key();
        let mut roster = Roster::new();
        let mut issued: Vec<ParticipantId> = Vec::new();

        for op in ops {
            match op {
                Op::Register => {
                    let id = roster.register("player", key);
                    prop_assert!(!id.is_caller());
                    if let Some(last) = issued.last() {
                        prop_assert!(id > *last);
                    }
                    issued.push(id);
                }
                Op::Remove(pick) if !issued.is_empty() => {
                    roster.remove(issued[pick % issued.len()]);
                }
                Op::Disqualify(pick) if !issued.is_empty() => {
                    let id = issued[pick % issued.len()];
                    let was_active = roster.is_active(id);
                    prop_assert_eq!(roster.disqualify(id), was_active);
                    prop_assert!(!roster.is_active(id));
                }
                _ => {}
            }
        }

        prop_assert!(roster.active_count() <= roster.len());
        prop_assert!(roster.len() <= issued.len());
    }

    #[test]
    fn prop_stale_assigned_ids_are_refused(first in 1u32..20, gap in 0u32..5) {
        let key = SigningKey::generate().public_key();
        let mut roster = Roster::new();
        let assigned = ParticipantId::new(first + gap);
        roster.insert_assigned(assigned, "first", key).unwrap();

        prop_assert!(roster.insert_assigned(assigned, "again", key).is_err());
        prop_assert!(roster.insert_assigned(ParticipantId::new(first), "older", key).is_err());
        prop_assert_eq!(roster.register("next", key), ParticipantId::new(first + gap + 1));
    }
}

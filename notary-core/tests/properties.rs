//! Property tests for the uniqueness state machine.

use notary_core::{
    CommitResult, ConsumingTransaction, NotaryCommand, Party, SecureHash, StateRef,
    UniquenessStateMachine,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

/// A claim over a small universe of states so that conflicts are common.
#[derive(Debug, Clone)]
struct Claim {
    inputs: Vec<u8>,
    tx: u16,
}

fn claim_strategy() -> impl Strategy<Value = Claim> {
    (prop::collection::vec(0u8..24, 0..5), any::<u16>()).prop_map(|(inputs, tx)| Claim { inputs, tx })
}

fn state(n: u8) -> StateRef {
    StateRef::new(SecureHash::sha256([n]), u32::from(n % 4))
}

fn tx_id(n: u16) -> SecureHash {
    SecureHash::sha256(n.to_be_bytes())
}

fn open_machine() -> (TempDir, UniquenessStateMachine) {
    let temp_dir = TempDir::new().unwrap();
    let machine = UniquenessStateMachine::open(temp_dir.path().join("notary.redb")).unwrap();
    (temp_dir, machine)
}

fn apply(machine: &UniquenessStateMachine, claim: &Claim) -> CommitResult {
    let inputs = claim.inputs.iter().copied().map(state).collect();
    machine
        .apply_command(&NotaryCommand::claim(inputs, tx_id(claim.tx), Party::from_name("p")))
        .unwrap()
        .into_commit_result()
        .unwrap()
}

fn snapshot(machine: &UniquenessStateMachine) -> Vec<u8> {
    let mut bytes = Vec::new();
    machine.take_snapshot(&mut bytes).unwrap();
    bytes
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Each state is owned by the first claim that named it, and a claim
    /// succeeds exactly when none of its inputs were owned.
    #[test]
    fn first_writer_wins(claims in prop::collection::vec(claim_strategy(), 1..20)) {
        let (_dir, machine) = open_machine();
        let mut model: BTreeMap<StateRef, ConsumingTransaction> = BTreeMap::new();

        for claim in &claims {
            let inputs: Vec<StateRef> = claim.inputs.iter().copied().map(state).collect();
            let taken: BTreeMap<_, _> = inputs
                .iter()
                .filter_map(|s| model.get(s).map(|owner| (*s, owner.clone())))
                .collect();

            let result = apply(&machine, claim);

            if taken.is_empty() {
                prop_assert!(result.is_success());
                for (position, input) in inputs.iter().enumerate() {
                    model.entry(*input).or_insert_with(|| {
                        ConsumingTransaction::new(tx_id(claim.tx), position as u32, Party::from_name("p"))
                    });
                }
            } else {
                prop_assert_eq!(result.conflict().map(|c| &c.state_history), Some(&taken));
            }
        }

        prop_assert_eq!(machine.store().size().unwrap(), model.len() as u64);
        for (state_ref, owner) in &model {
            let stored = machine.store().get(state_ref).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(owner));
        }
    }

    /// A refused claim leaves the store exactly as it was.
    #[test]
    fn refused_claims_write_nothing(
        setup in prop::collection::vec(claim_strategy(), 1..10),
        refused in claim_strategy(),
    ) {
        let (_dir, machine) = open_machine();
        for claim in &setup {
            apply(&machine, claim);
        }
        let before = snapshot(&machine);

        if !apply(&machine, &refused).is_success() {
            prop_assert_eq!(snapshot(&machine), before);
        }
    }

    /// Replicas that apply the same commands converge to byte-identical
    /// snapshots, and a snapshot restores to the same bytes.
    #[test]
    fn replicas_converge(claims in prop::collection::vec(claim_strategy(), 0..20)) {
        let (_a_dir, a) = open_machine();
        let (_b_dir, b) = open_machine();

        for claim in &claims {
            prop_assert_eq!(apply(&a, claim), apply(&b, claim));
        }
        let bytes = snapshot(&a);
        prop_assert_eq!(&bytes, &snapshot(&b));

        let (_c_dir, c) = open_machine();
        c.install_snapshot(bytes.as_slice()).unwrap();
        prop_assert_eq!(snapshot(&c), bytes);
    }
}

//! Property tests for repair, storage round-trips and snapshot import.

use planstore_core::repair::{is_consistent, repair_entity_collection};
use planstore_core::WriteMode;
use planstore_testkit::prelude::*;
use proptest::prelude::*;
use serde_json::Value;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn repair_yields_consistent_state(state in inconsistent_collection_strategy()) {
        let repaired = repair_entity_collection(state.clone(), "task");
        prop_assert!(is_consistent(&repaired));
        prop_assert_eq!(&repaired["entities"], &state["entities"]);
        prop_assert_eq!(&repaired["currentId"], &state["currentId"]);
    }

    #[test]
    fn repair_is_idempotent(state in inconsistent_collection_strategy()) {
        let once = repair_entity_collection(state, "task");
        let twice = repair_entity_collection(once.clone(), "task");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn repair_keeps_consistent_state(state in consistent_collection_strategy()) {
        prop_assert_eq!(repair_entity_collection(state.clone(), "tag"), state);
    }

    #[test]
    fn save_then_unmigrated_load_roundtrips(state in consistent_collection_strategy()) {
        let harness = TestPersistence::memory();
        let loaded: Option<Value> = runtime().block_on(async {
            harness
                .persistence
                .save_raw("tag", None, state.clone(), WriteMode::Regular)
                .await
                .unwrap();
            harness.persistence.load_model("tag", None, true).await.unwrap()
        });
        prop_assert_eq!(loaded, Some(state));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn imported_snapshot_is_reconstructible_from_storage(snapshot in snapshot_strategy()) {
        let harness = TestPersistence::memory();
        let assembled = runtime().block_on(async {
            harness.persistence.import_complete(snapshot.clone()).await.unwrap();
            harness.persistence.assemble().await.unwrap()
        });
        prop_assert_eq!(&assembled, &*snapshot.data);
    }
}

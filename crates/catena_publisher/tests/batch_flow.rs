//! Integration tests for the batch publisher against the simulator.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use catena_core::{CatenaClient, CatenaConfig, ChainSimulator, Disclosure, SimulatorConfig, TxOptions};
use catena_publisher::{BatchPublisher, DisclosureStore, EntryState, PublisherConfig};

fn temp_store_path(name: &str) -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_batch_{name}_{id}.json"))
}

fn client(simulator: &Arc<ChainSimulator>) -> CatenaClient<ChainSimulator> {
    CatenaClient::new(
        Arc::clone(simulator),
        simulator.ledger_address(),
        CatenaConfig::default()
            .with_confirmation(Duration::from_millis(5), Some(Duration::from_secs(5))),
    )
}

fn disclosure(n: usize) -> Disclosure {
    Disclosure {
        organization: "TEST ORG".to_string(),
        recipient: format!("RECIPIENT {n}"),
        location: "WINNIPEG,MB,CA".to_string(),
        amount: format!("CAD {}", 1000 * n),
        funding_type: "C".to_string(),
        date: "2016-Q1".to_string(),
        purpose: "NAICS:54321".to_string(),
        comment: String::new(),
        amends: None,
    }
}

fn store(name: &str, count: usize) -> Arc<DisclosureStore> {
    let entries = (1..=count).map(|n| (format!("entry-{n}"), disclosure(n)));
    Arc::new(DisclosureStore::create(temp_store_path(name), entries).unwrap())
}

fn cleanup(store: &DisclosureStore) {
    fs::remove_file(store.path()).ok();
}

#[tokio::test]
async fn test_fresh_batch_confirms_everything() {
    let simulator = Arc::new(ChainSimulator::new());
    let store = store("fresh", 5);
    let publisher = BatchPublisher::new(
        client(&simulator),
        Arc::clone(&store),
        PublisherConfig::default().with_max_unconfirmed(2),
    );

    let summary = publisher.run().await.unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.newly_confirmed, 5);
    assert_eq!(summary.failed, 0);
    assert!(summary.is_complete());
    assert!(publisher.unconfirmed().is_empty());

    let reopened = DisclosureStore::open(store.path()).unwrap();
    let rows: BTreeSet<u64> = reopened
        .snapshot()
        .into_iter()
        .map(|(_, record)| {
            assert_eq!(record.state(), EntryState::Confirmed);
            assert_eq!(record.network_id.as_deref(), Some("5777"));
            record.row_number.unwrap()
        })
        .collect();
    assert_eq!(rows, (1..=5).collect());

    cleanup(&store);
}

#[tokio::test]
async fn test_second_run_skips_confirmed_entries() {
    let simulator = Arc::new(ChainSimulator::new());
    let store = store("rerun", 3);
    let publisher = BatchPublisher::new(client(&simulator), Arc::clone(&store), PublisherConfig::default());

    publisher.run().await.unwrap();
    let rerun = BatchPublisher::new(
        client(&simulator),
        Arc::new(DisclosureStore::open(store.path()).unwrap()),
        PublisherConfig::default(),
    );
    let summary = rerun.run().await.unwrap();

    assert_eq!(summary.previously_confirmed, 3);
    assert_eq!(summary.newly_confirmed, 0);
    assert!(summary.is_complete());
    assert_eq!(client(&simulator).get_disclosure_count().await.unwrap(), 3);

    cleanup(&store);
}

#[tokio::test]
async fn test_sent_entries_are_resumed_not_resent() {
    let simulator = Arc::new(ChainSimulator::new());
    let store = store("resume", 3);

    // A previous run sent entry-2 and died before recording the confirmation.
    let tx_id = client(&simulator)
        .publish_disclosure_tx(&disclosure(2), TxOptions::default())
        .await
        .unwrap();
    store.mark_sent("entry-2", tx_id).unwrap();

    let publisher = BatchPublisher::new(
        client(&simulator),
        Arc::new(DisclosureStore::open(store.path()).unwrap()),
        PublisherConfig::default(),
    );
    let summary = publisher.run().await.unwrap();

    assert_eq!(summary.resumed, 1);
    assert_eq!(summary.newly_confirmed, 3);
    assert_eq!(client(&simulator).get_disclosure_count().await.unwrap(), 3);

    let record = DisclosureStore::open(store.path()).unwrap().get("entry-2").unwrap();
    assert_eq!(record.tx_id, Some(tx_id));
    assert_eq!(record.row_number, Some(1));

    cleanup(&store);
}

#[tokio::test]
async fn test_entry_failure_does_not_halt_batch() {
    let simulator = Arc::new(ChainSimulator::new());
    let entries = vec![
        ("good-1".to_string(), disclosure(1)),
        (
            "bad".to_string(),
            Disclosure {
                amends: Some(0),
                ..disclosure(2)
            },
        ),
        ("good-2".to_string(), disclosure(3)),
    ];
    let store = Arc::new(DisclosureStore::create(temp_store_path("failure"), entries).unwrap());
    let publisher = BatchPublisher::new(client(&simulator), Arc::clone(&store), PublisherConfig::default());

    let summary = publisher.run().await.unwrap();
    assert_eq!(summary.newly_confirmed, 2);
    assert_eq!(summary.failed, 1);
    assert!(!summary.is_complete());

    assert_eq!(store.get("bad").unwrap().state(), EntryState::Unpublished);
    assert_eq!(store.get("good-2").unwrap().state(), EntryState::Confirmed);

    cleanup(&store);
}

#[tokio::test]
async fn test_mistyped_amends_fails_only_its_entry() {
    let simulator = Arc::new(ChainSimulator::new());
    let path = temp_store_path("mistyped");
    let fields = r#""organization": "TEST ORG", "recipient": "R", "location": "L", "amount": "CAD 1", "fundingType": "C", "date": "2016-Q1", "purpose": "P", "comment": """#;
    fs::write(
        &path,
        format!(r#"{{"good-1": {{{fields}}}, "bad": {{{fields}, "amends": "3"}}, "good-2": {{{fields}}}}}"#),
    )
    .unwrap();

    let store = Arc::new(DisclosureStore::open(&path).unwrap());
    let publisher = BatchPublisher::new(client(&simulator), Arc::clone(&store), PublisherConfig::default());
    let summary = publisher.run().await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.newly_confirmed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(client(&simulator).get_disclosure_count().await.unwrap(), 2);

    let reopened = DisclosureStore::open(&path).unwrap();
    assert_eq!(reopened.get("good-1").unwrap().row_number, Some(1));
    assert_eq!(reopened.get("good-2").unwrap().row_number, Some(2));
    let bad = reopened.get("bad").unwrap();
    assert_eq!(bad.state(), EntryState::Unpublished);
    assert_eq!(bad.payload["amends"], "3");

    cleanup(&store);
}

#[tokio::test]
async fn test_in_flight_cap() {
    let simulator = Arc::new(ChainSimulator::with_config(SimulatorConfig::default().manual_mining()));
    let store = store("cap", 4);
    let publisher = BatchPublisher::new(
        client(&simulator),
        Arc::clone(&store),
        PublisherConfig::default().with_max_unconfirmed(2),
    );
    let unconfirmed = Arc::clone(publisher.unconfirmed());
    let batch = tokio::spawn(async move { publisher.run().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(simulator.pending_count(), 2);
    assert_eq!(unconfirmed.len(), 2);
    let sent = store
        .snapshot()
        .into_iter()
        .filter(|(_, record)| matches!(record.state(), EntryState::Sent(_)))
        .count();
    assert_eq!(sent, 2);

    while !batch.is_finished() {
        simulator.mine();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let summary = batch.await.unwrap().unwrap();
    assert_eq!(summary.newly_confirmed, 4);
    assert!(unconfirmed.is_empty());

    cleanup(&store);
}

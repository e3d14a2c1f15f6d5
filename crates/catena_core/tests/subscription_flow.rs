//! Integration tests for the live `disclosureAdded` subscription.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use catena_core::{
    CatenaClient, CatenaConfig, ChainSimulator, Disclosure, DisclosureEvent,
    DisclosureSubscription, SubscriptionConfig, TxOptions,
};

fn setup() -> CatenaClient<ChainSimulator> {
    let simulator = Arc::new(ChainSimulator::new());
    let config = CatenaConfig::default().with_subscription_poll(Duration::from_millis(5));
    CatenaClient::new(Arc::clone(&simulator), simulator.ledger_address(), config)
}

fn disclosure(organization: &str) -> Disclosure {
    Disclosure {
        organization: organization.to_string(),
        recipient: "BITACCESS INC.".to_string(),
        location: "OTTAWA,ON,CA".to_string(),
        amount: "CAD 1234567".to_string(),
        funding_type: "G".to_string(),
        date: "2016-Q2".to_string(),
        purpose: "NAICS:44231".to_string(),
        comment: "MULTI_YEAR".to_string(),
        amends: None,
    }
}

async fn next_event(subscription: &mut DisclosureSubscription) -> DisclosureEvent {
    tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("subscription timed out")
        .expect("subscription closed")
}

#[tokio::test]
async fn test_events_match_publish_results() {
    let client = setup();
    let mut subscription = client.watch_disclosure_added(None);

    // Let the poll task record the current head before publishing.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut published = Vec::new();
    for organization in ["ORG A", "ORG B", "ORG C"] {
        published.push(
            client
                .publish_disclosure(&disclosure(organization), TxOptions::default())
                .await
                .unwrap(),
        );
    }

    for (expected, organization) in published.iter().zip(["ORG A", "ORG B", "ORG C"]) {
        let event = next_event(&mut subscription).await;
        assert_eq!(&event.published, expected);
        assert_eq!(event.disclosure.organization, organization);
    }

    let stats = subscription.stats();
    assert_eq!(stats.events_delivered.load(Ordering::Relaxed), 3);
    assert_eq!(stats.errors.load(Ordering::Relaxed), 0);

    subscription.stop();
    tokio::task::yield_now().await;
    assert!(!subscription.is_running());
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn test_replay_from_block() {
    let client = setup();
    let first = client
        .publish_disclosure(&disclosure("ORG A"), TxOptions::default())
        .await
        .unwrap();
    let second = client
        .publish_disclosure(&disclosure("ORG B"), TxOptions::default())
        .await
        .unwrap();

    let config = client.subscription_config().from_block(0);
    let mut subscription = client.watch_disclosure_added(Some(config));

    assert_eq!(next_event(&mut subscription).await.published, first);
    assert_eq!(next_event(&mut subscription).await.published, second);
    subscription.stop();
}

#[tokio::test]
async fn test_idle_subscription_keeps_polling() {
    let client = setup();
    let config = SubscriptionConfig::default()
        .with_poll_interval(Duration::from_millis(5))
        .from_block(0);
    let mut subscription = client.watch_disclosure_added(Some(config));

    // Nothing published: polls succeed with no events and the task keeps going.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(subscription.is_running());
    assert!(subscription.try_next().is_none());
    assert!(subscription.stats().polls.load(Ordering::Relaxed) > 0);

    let published = client
        .publish_disclosure(&disclosure("LATE ORG"), TxOptions::default())
        .await
        .unwrap();
    assert_eq!(next_event(&mut subscription).await.published, published);
}

#[tokio::test]
async fn test_cancel_token_ends_subscription_from_another_task() {
    let client = setup();
    let mut subscription = client.watch_disclosure_added(None);
    let token = subscription.cancel_token();
    assert!(!token.is_cancelled());

    tokio::spawn(async move { token.cancel() }).await.unwrap();

    let closed = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("subscription did not close");
    assert!(closed.is_none());
    assert!(!subscription.is_running());
}

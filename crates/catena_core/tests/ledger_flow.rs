//! Integration tests for publishing to the ledger against the simulator.

use std::sync::Arc;
use std::time::Duration;

use catena_core::simulator::ReceiptTampering;
use catena_core::{
    CatenaClient, CatenaConfig, CatenaError, ChainSimulator, Disclosure, ProviderError,
    SimulatorConfig, TxOptions,
};

fn config() -> CatenaConfig {
    CatenaConfig::default()
        .with_confirmation(Duration::from_millis(5), Some(Duration::from_secs(5)))
}

fn setup(simulator: ChainSimulator) -> (Arc<ChainSimulator>, CatenaClient<ChainSimulator>) {
    let simulator = Arc::new(simulator);
    let client = CatenaClient::new(Arc::clone(&simulator), simulator.ledger_address(), config());
    (simulator, client)
}

fn test_org() -> Disclosure {
    Disclosure {
        organization: "TEST ORG".to_string(),
        recipient: "GRANDMAS BAKING LTD.".to_string(),
        location: "WINNIPEG,MB,CA".to_string(),
        amount: "CAD 333770".to_string(),
        funding_type: "C".to_string(),
        date: "2016-Q1".to_string(),
        purpose: "NAICS:54321".to_string(),
        comment: String::new(),
        amends: None,
    }
}

fn bitaccess() -> Disclosure {
    Disclosure {
        organization: "Innovation, Science and Economic Development Canada".to_string(),
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

#[tokio::test]
async fn test_fresh_ledger_publish_and_pull() {
    let (_simulator, client) = setup(ChainSimulator::new());
    assert_eq!(client.get_disclosure_count().await.unwrap(), 0);

    let published = client
        .publish_disclosure(&test_org(), TxOptions::default())
        .await
        .unwrap();

    assert_eq!(published.row_number, 1);
    assert_eq!(published.network_id, "5777");
    assert_eq!(published.contract_address, client.disclosure_manager());
    assert!(published.block_number > 0);
    assert!(published.block_timestamp > 0);

    assert_eq!(client.get_disclosure_count().await.unwrap(), 1);
    let pulled = client.get_disclosure(1).await.unwrap();
    assert_eq!(pulled, test_org());
    assert_eq!(pulled.amends, None);
}

#[tokio::test]
async fn test_row_numbers_increment() {
    let (_simulator, client) = setup(ChainSimulator::new());

    let mut previous = 0;
    for disclosure in [test_org(), bitaccess(), test_org()] {
        let published = client
            .publish_disclosure(&disclosure, TxOptions::default())
            .await
            .unwrap();
        assert_eq!(published.row_number, previous + 1);
        previous = published.row_number;
    }
    assert_eq!(client.get_disclosure_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_amendment_path() {
    let (_simulator, client) = setup(ChainSimulator::new());
    client
        .publish_disclosure(&test_org(), TxOptions::default())
        .await
        .unwrap();

    let amended = Disclosure {
        amount: "CAD 400000".to_string(),
        amends: Some(1),
        ..test_org()
    };
    assert_eq!(amended.function_name(), "amendEntry");

    let new_tx = client
        .create_publish_disclosure_tx(&bitaccess(), TxOptions::default())
        .await
        .unwrap();
    let amend_tx = client
        .create_publish_disclosure_tx(&amended, TxOptions::default())
        .await
        .unwrap();
    assert_eq!(new_tx.gas_limit, "0x3d090");
    assert_eq!(amend_tx.gas_limit, "0x7a120");

    let published = client
        .publish_disclosure(&amended, TxOptions::default())
        .await
        .unwrap();
    assert_eq!(published.row_number, 2);

    // pullRow follows the amendment, pullEntry returns entries verbatim
    assert_eq!(client.get_disclosure(1).await.unwrap().amount, "CAD 400000");
    assert_eq!(client.get_disclosure_amendment(1).await.unwrap(), test_org());
    assert_eq!(client.get_disclosure_amendment(2).await.unwrap().amends, Some(1));
}

#[tokio::test]
async fn test_invalid_amends_fail_before_network() {
    let (simulator, client) = setup(ChainSimulator::new());

    for amends in [0, -1] {
        let disclosure = Disclosure {
            amends: Some(amends),
            ..test_org()
        };
        let calls_before = simulator.rpc_calls();

        let err = client
            .publish_disclosure(&disclosure, TxOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_argument_error(), "unexpected error {err}");

        let err = client
            .create_publish_disclosure_tx(&disclosure, TxOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatenaError::InvalidArgumentType { .. }));

        assert_eq!(simulator.rpc_calls(), calls_before);
    }

    let mut json = serde_json::to_value(test_org()).unwrap();
    json["amends"] = serde_json::json!("first row");
    assert!(serde_json::from_value::<Disclosure>(json).is_err());
}

#[tokio::test]
async fn test_create_tx_is_deterministic() {
    let (_simulator, client) = setup(ChainSimulator::new());
    let options = TxOptions::default()
        .with_nonce(7)
        .with_gas(300_000)
        .with_gas_price(1_000_000_000);

    let first = client
        .create_publish_disclosure_tx(&bitaccess(), options)
        .await
        .unwrap();
    let second = client
        .create_publish_disclosure_tx(&bitaccess(), options)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.value, "0x0");
    assert_eq!(first.nonce, "0x7");
    assert_eq!(first.gas_limit, "0x493e0");
    assert_eq!(first.gas_price, "0x3b9aca00");
    assert_eq!(first.chain_id, 5777);
    assert!(first.data.starts_with("0x"));
}

#[tokio::test]
async fn test_network_fills_unset_fields() {
    let (simulator, client) = setup(ChainSimulator::new());
    client
        .publish_disclosure(&test_org(), TxOptions::default())
        .await
        .unwrap();

    let tx = client
        .create_publish_disclosure_tx(&test_org(), TxOptions::default())
        .await
        .unwrap();
    assert_eq!(tx.from, simulator.owner());
    assert_eq!(tx.nonce, "0x1");
    assert_eq!(tx.gas_price, "0x4a817c800");
}

#[tokio::test]
async fn test_unauthorized_sender() {
    let (simulator, client) = setup(ChainSimulator::new());
    let intruder = simulator.account(2).unwrap();

    let err = client
        .publish_disclosure(&test_org(), TxOptions::default().with_from(intruder))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CatenaError::UnauthorizedSender {
            from: intruder,
            owner: simulator.owner(),
        }
    );
    assert_eq!(client.get_disclosure_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_tampered_receipts_are_rejected() {
    let (simulator, client) = setup(ChainSimulator::new());

    for tampering in [ReceiptTampering::StripLogs, ReceiptTampering::ForeignHash] {
        let tx_id = client
            .publish_disclosure_tx(&test_org(), TxOptions::default())
            .await
            .unwrap();
        simulator.tamper_receipt(tx_id, tampering);

        let err = client.wait_for_confirmation(tx_id).await.unwrap_err();
        assert!(
            matches!(err, CatenaError::InvalidReceipt { expected, .. } if expected == tx_id),
            "{tampering:?} gave {err}"
        );
    }
}

#[tokio::test]
async fn test_resume_after_restart() {
    let (simulator, client) = setup(ChainSimulator::with_config(
        SimulatorConfig::default().manual_mining(),
    ));

    let tx_id = client
        .publish_disclosure_tx(&bitaccess(), TxOptions::default())
        .await
        .unwrap();
    assert_eq!(client.get_published_tx(tx_id).await.unwrap(), None);

    // A second session only knows the transaction id.
    let restarted = CatenaClient::new(
        Arc::clone(&simulator),
        simulator.ledger_address(),
        config(),
    );
    let waiter = tokio::spawn(async move { restarted.wait_for_confirmation(tx_id).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    simulator.mine();

    let resumed = waiter.await.unwrap().unwrap();
    assert_eq!(resumed.row_number, 1);
    assert_eq!(resumed.tx_id, tx_id);
    assert_eq!(client.get_published_tx(tx_id).await.unwrap(), Some(resumed));
}

#[tokio::test]
async fn test_confirmation_timeout() {
    let simulator = Arc::new(ChainSimulator::with_config(
        SimulatorConfig::default().manual_mining(),
    ));
    let client = CatenaClient::new(
        Arc::clone(&simulator),
        simulator.ledger_address(),
        CatenaConfig::default()
            .with_confirmation(Duration::from_millis(5), Some(Duration::from_millis(30))),
    );

    let tx_id = client
        .publish_disclosure_tx(&test_org(), TxOptions::default())
        .await
        .unwrap();
    let err = client.wait_for_confirmation(tx_id).await.unwrap_err();
    assert!(matches!(err, CatenaError::ConfirmationTimeout { tx_id: id, .. } if id == tx_id));
}

#[tokio::test]
async fn test_nonce_conflict_is_a_network_error() {
    let (_simulator, client) = setup(ChainSimulator::new());

    let err = client
        .publish_disclosure(&test_org(), TxOptions::default().with_nonce(9))
        .await
        .unwrap_err();
    assert!(matches!(err, CatenaError::Network(ProviderError::Rpc { .. })));
}

#[tokio::test]
async fn test_gas_price_from_config_file() {
    let simulator = Arc::new(ChainSimulator::new());
    let config = CatenaConfig::from_toml_str("[gas]\ngas_price = 3000000000\n").unwrap();
    let client = CatenaClient::new(Arc::clone(&simulator), simulator.ledger_address(), config);

    let tx = client
        .create_publish_disclosure_tx(&test_org(), TxOptions::default())
        .await
        .unwrap();
    assert_eq!(tx.gas_price, "0xb2d05e00");
}

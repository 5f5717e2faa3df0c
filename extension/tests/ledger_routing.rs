use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::bip32::DerivationPath;
use extension_router::{Envelope, Message, Router, RouterError};
use serde_json::json;
use wallet_extension::config::ConfigFile;
use wallet_extension::context::BackgroundContext;
use wallet_extension::ledger::messages::*;
use wallet_extension::ledger::tx::{TxType, UnsignedTx};
use wallet_extension::ledger::handler::get_handler;
use wallet_extension::ledger::{EmulatedLedger, LedgerDevice, LedgerError, LedgerService, ROUTE};
use wallet_extension::rpc::{tx_hash, Broadcaster, RpcError, TxReceipt};
use wallet_extension::sdk::{Keystore, MASP_PARAM_FILES};
use wallet_extension::storage::{KvPrefix, KvStore, MemoryKvStore, PrefixedStore};
use wallet_extension::web_workers::init::SubmitTransferMsg;
use wallet_extension::web_workers::{
    SessionStatus, SubmitTransferMessageData, WorkerSignal, SDK_STORE_KEY,
};

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl Broadcaster for Recorder {
    async fn broadcast(&self, tx: &[u8]) -> Result<TxReceipt, RpcError> {
        self.sent.lock().unwrap().push(tx.to_vec());
        Ok(TxReceipt {
            hash: tx_hash(tx),
            code: 0,
            log: String::new(),
        })
    }
}

const CONFIG: &str = r#"
[chain]
chain_id = "namada-test.0123"
rpc_url = "http://127.0.0.1:26657"

[worker]
masp_params_dir = "/nonexistent/masp-params"
"#;

struct Harness {
    context: BackgroundContext,
    device: Arc<EmulatedLedger>,
    recorder: Arc<Recorder>,
}

async fn harness() -> Harness {
    let config = ConfigFile::parse(CONFIG).unwrap();
    config.validate().unwrap();

    let device = Arc::new(EmulatedLedger::from_seed(&[9u8; 32]).unwrap());
    let recorder = Arc::new(Recorder::default());
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let context =
        BackgroundContext::with_collaborators(&config, store, device.clone(), recorder.clone())
            .await
            .unwrap();

    Harness {
        context,
        device,
        recorder,
    }
}

#[tokio::test]
async fn test_minimal_ledger_route() {
    let service = LedgerService::load(
        Arc::new(EmulatedLedger::from_seed(&[9u8; 32]).unwrap()),
        Arc::new(Recorder::default()),
        PrefixedStore::new(Arc::new(MemoryKvStore::new()), KvPrefix::LedgerAccounts),
        "namada-test.0123",
    )
    .await
    .unwrap();

    let mut router = Router::new();
    router.register_message::<AddLedgerParentAccountMsg>().unwrap();
    router.register_message::<DeleteLedgerAccountMsg>().unwrap();
    router.add_handler(ROUTE, get_handler(Arc::new(service))).unwrap();

    let added = router
        .dispatch(Envelope::new(
            ROUTE,
            "add-ledger-parent-account",
            json!({ "path": "m/44'/877'/0'" }),
        ))
        .await
        .unwrap();
    let id = added["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let delete = Envelope::new(ROUTE, "delete-ledger-account", json!({ "id": id }));
    let ack = router.dispatch(delete.clone()).await.unwrap();
    assert_eq!(ack, json!({ "id": id }));

    let err = router.dispatch(delete).await.unwrap_err();
    assert_eq!(err.code(), "account-not-found");

    // Bound but never registered.
    let err = router
        .dispatch(Envelope::new(ROUTE, "query-ledger-accounts", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::UnregisteredMessageKind(_)));
}

#[tokio::test]
async fn test_add_then_delete_parent_account() {
    let h = harness().await;
    let port = &h.context.port;

    let account = port
        .send(AddLedgerParentAccountMsg {
            path: "m/44'/877'/0'".to_string(),
            alias: Some("Main".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(account.alias, "Main");

    let ack = port
        .send(DeleteLedgerAccountMsg {
            id: account.id.clone(),
        })
        .await
        .unwrap();
    assert_eq!(ack.id, account.id);

    let err = port
        .send(DeleteLedgerAccountMsg { id: account.id })
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Remote { ref code, .. } if code == "account-not-found"));

    h.context.shutdown().await;
}

#[tokio::test]
async fn test_unregistered_kind_is_rejected_before_handler() {
    let h = harness().await;

    let reply = h
        .context
        .port
        .request(Envelope::new(ROUTE, "export-ledger-seed", json!({})))
        .await
        .unwrap();
    assert!(!reply.ok);
    assert_eq!(reply.error.unwrap().code, "unregistered-message-kind");

    let reply = h
        .context
        .port
        .request(Envelope::new(
            "keyring",
            AddLedgerParentAccountMsg::KIND,
            json!({ "path": "m/44'/877'/0'" }),
        ))
        .await
        .unwrap();
    assert_eq!(reply.error.unwrap().code, "unknown-route");

    assert!(h.context.ledger.accounts().await.is_empty());
}

#[tokio::test]
async fn test_parent_child_lifecycle_through_router() {
    let h = harness().await;
    let router = &h.context.router;

    let parent = router
        .send(AddLedgerParentAccountMsg {
            path: "m/44'/877'/0'".to_string(),
            alias: None,
        })
        .await
        .unwrap();
    let child = router
        .send(AddLedgerAccountMsg {
            parent_id: parent.id.clone(),
            index: 1,
            alias: None,
        })
        .await
        .unwrap();
    assert_eq!(child.path, "m/44'/877'/0'/1'");

    let err = router
        .send(DeleteLedgerAccountMsg {
            id: parent.id.clone(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "account-has-children");
    let cause = err.handler_error().unwrap();
    assert!(matches!(
        cause.downcast_ref::<LedgerError>(),
        Some(LedgerError::HasChildren { .. })
    ));

    let renamed = router
        .send(RenameLedgerAccountMsg {
            id: child.id.clone(),
            alias: "Savings".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(renamed.alias, "Savings");
    assert_eq!(renamed.public_key, child.public_key);

    let accounts = router.send(QueryLedgerAccountsMsg {}).await.unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(accounts[0].id, parent.id);
}

#[tokio::test]
async fn test_sign_on_device_and_submit() {
    let h = harness().await;
    let port = &h.context.port;

    let account = port
        .send(AddLedgerParentAccountMsg {
            path: "m/44'/877'/0'".to_string(),
            alias: None,
        })
        .await
        .unwrap();

    let tx_bytes = port
        .send(GetTxBytesMsg {
            account_id: account.id.clone(),
            tx: UnsignedTx {
                tx_type: TxType::Bond,
                data: BASE64.encode(b"bond 100"),
                fee_amount: 2,
                gas_limit: 50_000,
                memo: None,
            },
        })
        .await
        .unwrap();

    let path = DerivationPath::from_str(&tx_bytes.path).unwrap();
    let raw = BASE64.decode(&tx_bytes.bytes).unwrap();
    let signature = h.device.sign(&path, &raw).await.unwrap();

    let receipt = port
        .send(SubmitSignedTxMsg {
            account_id: account.id.clone(),
            bytes: tx_bytes.bytes.clone(),
            signature: hex::encode(signature.serialize_compact()),
        })
        .await
        .unwrap();
    assert_eq!(receipt.code, 0);
    assert_eq!(h.recorder.sent.lock().unwrap().len(), 1);

    // A valid signature, but over different bytes.
    let wrong = h.device.sign(&path, b"other bytes").await.unwrap();
    let err = port
        .send(SubmitSignedTxMsg {
            account_id: account.id,
            bytes: tx_bytes.bytes,
            signature: hex::encode(wrong.serialize_compact()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Remote { ref code, .. } if code == "invalid-signature"));
    assert_eq!(h.recorder.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transfer_route_rejects_until_worker_is_ready() {
    let h = harness().await;

    // The masp params directory does not exist, so the worker never signals INIT.
    let mut status = h.context.worker.subscribe();
    status
        .wait_for(|s| *s == SessionStatus::Terminated)
        .await
        .unwrap();

    let err = h
        .context
        .port
        .send(SubmitTransferMsg(SubmitTransferMessageData {
            tx_msg: BASE64.encode(b"transfer"),
            password: "pw".to_string(),
            xsk: "xsk1".to_string(),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Remote { ref code, .. } if code == "worker-not-initialized"));
}

#[tokio::test]
async fn test_transfer_route_signs_once_worker_is_ready() {
    let params = tempfile::tempdir().unwrap();
    for name in MASP_PARAM_FILES {
        std::fs::write(params.path().join(name), b"params").unwrap();
    }
    let mut config = ConfigFile::parse(CONFIG).unwrap();
    config.worker.masp_params_dir = params.path().to_string_lossy().into_owned();

    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let mut keystore = Keystore::default();
    let secret = bitcoin::secp256k1::SecretKey::from_slice(&[7u8; 32]).unwrap();
    keystore.insert("xsk1", &secret, "pw").unwrap();
    PrefixedStore::new(store.clone(), KvPrefix::Sdk)
        .set(SDK_STORE_KEY, &keystore.encode().unwrap())
        .await
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let context = BackgroundContext::with_collaborators(
        &config,
        store,
        Arc::new(EmulatedLedger::from_seed(&[9u8; 32]).unwrap()),
        recorder.clone(),
    )
    .await
    .unwrap();

    // Nothing reads the INIT signal here; readiness alone opens the route.
    let mut status = context.worker.subscribe();
    status
        .wait_for(|s| *s == SessionStatus::Ready)
        .await
        .unwrap();

    let transfer = |password: &str| {
        SubmitTransferMsg(SubmitTransferMessageData {
            tx_msg: BASE64.encode(b"transfer"),
            password: password.to_string(),
            xsk: "xsk1".to_string(),
        })
    };
    let signal = context.port.send(transfer("pw")).await.unwrap();
    assert_eq!(signal, WorkerSignal::TransferSuccessful);
    assert_eq!(recorder.sent.lock().unwrap().len(), 1);

    let signal = context.port.send(transfer("wrong")).await.unwrap();
    assert_eq!(signal, WorkerSignal::TransferFailed);
    assert_eq!(recorder.sent.lock().unwrap().len(), 1);

    context.shutdown().await;
}

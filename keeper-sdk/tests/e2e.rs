//! Drives the SDK against a real server bound to a loopback port.

use keeper_core::{Credentials, DataType, RecordRequest};
use keeper_sdk::{HttpClient, LocalCache, SdkError, SyncReport, sync_all};
use keeper_server::ServerConfig;
use keeper_server::store::StoreKind;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

struct RunningServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    async fn start() -> Self {
        let config = ServerConfig {
            store: StoreKind::Memory,
            token_secret: Some("sdk-e2e-secret".into()),
            ..ServerConfig::default()
        };
        let state = keeper_server::build_state(&config).await.expect("state");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(keeper_server::serve(listener, state, async move {
            let _ = rx.await;
        }));
        Self {
            base_url: format!("http://{addr}"),
            shutdown: Some(tx),
            handle,
        }
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.expect("join").expect("serve");
    }
}

#[tokio::test]
async fn register_put_get_list_and_sync() {
    let server = RunningServer::start().await;
    let anonymous = HttpClient::new(&server.base_url).unwrap();

    let issued = anonymous
        .register(&Credentials::new("alice", "correct horse"))
        .await
        .unwrap();
    assert!(issued.expires_in > 0);
    let client = anonymous.clone().with_token(issued.token);

    assert!(client.list_records().await.unwrap().is_empty());
    assert!(client.get_record("mail").await.unwrap().is_none());

    let mail = client
        .put_record(&RecordRequest::new(DataType::Pass, "mail", "alice:hunter2"))
        .await
        .unwrap();
    assert_ne!(mail.id, 0);
    let note = client
        .put_record(&RecordRequest::new(DataType::Text, "shopping list", "milk:eggs"))
        .await
        .unwrap();

    let fetched = client.get_record("shopping list").await.unwrap().unwrap();
    assert_eq!(fetched.id, note.id);
    assert_eq!(fetched.data, "milk:eggs");
    assert_eq!(client.list_records().await.unwrap().len(), 2);

    let dir = TempDir::new().unwrap();
    let cache = LocalCache::new(dir.path());
    cache
        .reconcile(
            "alice",
            &RecordRequest::new(DataType::Pass, "mail", "alice:offline").to_draft(),
        )
        .await
        .unwrap();

    let report = sync_all(&client, &cache, "alice", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        report,
        SyncReport {
            created: 1,
            replaced: 1,
            unchanged: 0
        }
    );
    let cached = cache
        .load("alice", "mail", DataType::Pass)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.id, mail.id);
    assert_eq!(cached.data, "alice:hunter2");

    server.stop().await;
}

#[tokio::test]
async fn login_and_error_mapping() {
    let server = RunningServer::start().await;
    let client = HttpClient::new(&server.base_url).unwrap();

    client
        .register(&Credentials::new("bob", "pw"))
        .await
        .unwrap();
    let again = client.register(&Credentials::new("bob", "pw")).await;
    assert!(matches!(again, Err(SdkError::Server { status: 409, .. })));

    let wrong = client.login(&Credentials::new("bob", "nope")).await;
    assert!(matches!(wrong, Err(SdkError::Unauthorized(_))));

    let issued = client.login(&Credentials::new("bob", "pw")).await.unwrap();
    let authed = client.clone().with_token(issued.token);

    let mut tampered = RecordRequest::new(DataType::Text, "note", "a:b");
    tampered.data = "a:c".into();
    match authed.put_record(&tampered).await {
        Err(SdkError::Server { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("corrupted data"), "{message}");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let stranger = client.clone().with_token("not-a-token");
    assert!(matches!(
        stranger.list_records().await,
        Err(SdkError::Unauthorized(_))
    ));

    server.stop().await;
}

#[tokio::test]
async fn unreachable_server_is_detected() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new(format!("http://{addr}"))
        .unwrap()
        .with_token("t");
    let err = client
        .put_record(&RecordRequest::new(DataType::Pass, "mail", "a:b"))
        .await
        .unwrap_err();
    assert!(err.is_unreachable(), "{err}");
}

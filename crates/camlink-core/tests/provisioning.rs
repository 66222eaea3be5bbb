//! End-to-end provisioning flow against a scripted serial transport and a
//! fake transmitter HTTP endpoint.

use axum::routing::post;
use axum::{Json, Router};
use camlink_core::config::{shared, CameraConfig, SharedConfig};
use camlink_core::events::{ControlEvent, EventSender};
use camlink_core::http::HttpConfigClient;
use camlink_core::protocol::{DeviceGate, ProtocolError, Transport};
use camlink_core::provisioning::{ProvisionError, ProvisioningCoordinator};
use camlink_core::store::RecordStore;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Serial transport that pops scripted replies and records everything sent
struct ScriptedTransport {
    replies: Mutex<VecDeque<Vec<u8>>>,
    requests: Mutex<Vec<Vec<u8>>>,
    announces: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    fn with_replies<const N: usize>(replies: [&[u8]; N]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_vec()).collect()),
            requests: Mutex::new(Vec::new()),
            announces: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    fn announces(&self) -> Vec<String> {
        self.announces
            .lock()
            .unwrap()
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn request(
        &self,
        _path: &str,
        message: &[u8],
        _timeout: Duration,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.requests.lock().unwrap().push(message.to_vec());
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
    }

    fn send_only(&self, _path: &str, message: &[u8]) -> Result<(), ProtocolError> {
        self.announces.lock().unwrap().push(message.to_vec());
        Ok(())
    }
}

const SCAN_REPLY: &[u8] = br#"{"status":4,"payload":[{"SSID":"attic","BSSID":"aa:aa:aa:aa:aa:aa","signal_dbm":-70},{"SSID":"den","BSSID":"bb:bb:bb:bb:bb:bb","signal_dbm":-40}]}"#;

fn connect_reply(ip: &str) -> Vec<u8> {
    format!(r#"{{"status":2,"payload":{{"IPAddr":"{ip}"}}}}"#).into_bytes()
}

fn coordinator(
    transport: Arc<ScriptedTransport>,
    config: SharedConfig,
    store: RecordStore,
    events: EventSender,
) -> ProvisioningCoordinator<ScriptedTransport> {
    ProvisioningCoordinator::new(
        transport,
        DeviceGate::new(),
        config,
        HttpConfigClient::new(),
        store,
        events,
    )
    .with_local_ip("10.0.0.5".parse().unwrap())
}

/// Fake transmitter answering `POST /status` with a fixed status-5 message
async fn spawn_fake_tx(reply: Value) -> SocketAddr {
    let app = Router::new().route(
        "/status",
        post(move || {
            let reply = reply.clone();
            async move { Json(reply) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn scan_returns_networks_sorted_by_signal() {
    let transport = ScriptedTransport::with_replies([SCAN_REPLY]);
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("camera_tx.json"));
    let coordinator = coordinator(
        Arc::clone(&transport),
        shared(CameraConfig::default()),
        store,
        EventSender::sink(),
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    let networks = coordinator.scan_networks().await.unwrap();
    let order: Vec<(&str, i32)> = networks
        .iter()
        .map(|n| (n.ssid.as_str(), n.signal_dbm))
        .collect();
    assert_eq!(order, vec![("den", -40), ("attic", -70)]);

    // The wire carried exactly the scan request
    assert_eq!(
        transport.requests(),
        vec!["{\"status\":21,\"payload\":null}\n"]
    );
}

#[tokio::test]
async fn full_flow_stores_ip_config_and_record() {
    let tx_addr = spawn_fake_tx(json!({
        "status": 5,
        "payload": { "host": "10.0.0.5", "port": 8888, "width": 1920, "height": 1080, "framerate": 60 }
    }))
    .await;

    let transport =
        ScriptedTransport::with_replies([SCAN_REPLY, connect_reply("127.0.0.1").as_slice()]);
    let config = shared(CameraConfig::default());
    config.lock().await.tx_port = tx_addr.port();

    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("camera_tx.json"));
    let (events, mut rx) = EventSender::channel();
    let coordinator = coordinator(
        Arc::clone(&transport),
        Arc::clone(&config),
        store.clone(),
        events,
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    let networks = coordinator.scan_networks().await.unwrap();
    assert_eq!(networks[0].ssid, "den");

    let camera_ip = coordinator
        .connect_network(&networks[0].bssid, "hunter2")
        .await
        .unwrap();
    assert_eq!(camera_ip, "127.0.0.1");

    // Shared config carries the learned transmitter address and the pulled
    // stream settings
    {
        let config = config.lock().await;
        assert_eq!(config.tx_host, "127.0.0.1");
        assert_eq!((config.width, config.height), (1920, 1080));
        assert_eq!(config.framerate, 60);
        assert_eq!(config.rx_host, "10.0.0.5");
    }

    // The local IP went out as a status-23 announce, fire-and-forget
    let announces = transport.announces();
    assert_eq!(announces.len(), 1);
    assert!(announces[0].contains("\"status\":23"));
    assert!(announces[0].contains("10.0.0.5"));

    // Persisted record holds the camera IP and the pulled config blob
    let record = store.load().unwrap();
    assert_eq!(record.camera_ip, "127.0.0.1");
    assert_eq!(record.tx["width"], 1920);
    assert!(coordinator.record_matches_camera().await);

    // Events surfaced in order: scan result, then provisioned
    assert!(matches!(rx.recv().await, Some(ControlEvent::WifiNetworks(_))));
    assert_eq!(
        rx.recv().await,
        Some(ControlEvent::Provisioned {
            camera_ip: "127.0.0.1".to_string()
        })
    );
}

#[tokio::test]
async fn record_written_with_empty_tx_when_pull_unreachable() {
    // Reserve a port and close it again so the pull is refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = ScriptedTransport::with_replies([connect_reply("127.0.0.1").as_slice()]);
    let config = shared(CameraConfig::default());
    config.lock().await.tx_port = dead_port;

    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("camera_tx.json"));
    let coordinator = coordinator(
        Arc::clone(&transport),
        Arc::clone(&config),
        store.clone(),
        EventSender::sink(),
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    let camera_ip = coordinator
        .connect_network("bb:bb:bb:bb:bb:bb", "hunter2")
        .await
        .unwrap();
    assert_eq!(camera_ip, "127.0.0.1");

    // The pull failed but a record still exists, with an empty tx object
    let record = store.load().unwrap();
    assert_eq!(record.camera_ip, "127.0.0.1");
    assert_eq!(record.tx, json!({}));

    // Config untouched apart from the transmitter host
    let config = config.lock().await;
    assert_eq!(config.tx_host, "127.0.0.1");
    assert_eq!((config.width, config.height), (1280, 720));
}

#[tokio::test]
async fn rejected_connect_surfaces_verbatim_and_writes_nothing() {
    let transport = ScriptedTransport::with_replies([br#"{"status":3,"payload":null}"#.as_slice()]);
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("camera_tx.json"));
    let coordinator = coordinator(
        Arc::clone(&transport),
        shared(CameraConfig::default()),
        store.clone(),
        EventSender::sink(),
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    let err = coordinator
        .connect_network("bb:bb:bb:bb:bb:bb", "wrong-pass")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::ConnectRejected { .. }));
    assert!(err.to_string().contains("\"status\":3"));

    assert!(store.load().is_none());
    assert!(transport.announces().is_empty());
}

#[tokio::test]
async fn unexpected_reply_status_is_a_protocol_error() {
    let transport = ScriptedTransport::with_replies([br#"{"status":1,"payload":null}"#.as_slice()]);
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(
        Arc::clone(&transport),
        shared(CameraConfig::default()),
        RecordStore::new(dir.path().join("camera_tx.json")),
        EventSender::sink(),
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    let err = coordinator.scan_networks().await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Protocol(ProtocolError::UnexpectedStatus { actual: 1, .. })
    ));
}

#[tokio::test]
async fn silent_camera_reads_as_timeout() {
    let transport = ScriptedTransport::with_replies([b"".as_slice()]);
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(
        Arc::clone(&transport),
        shared(CameraConfig::default()),
        RecordStore::new(dir.path().join("camera_tx.json")),
        EventSender::sink(),
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    let err = coordinator.scan_networks().await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Protocol(ProtocolError::Timeout)
    ));
}

#[tokio::test]
async fn second_flow_is_rejected_while_device_is_held() {
    let transport = ScriptedTransport::with_replies([SCAN_REPLY]);
    let gate = DeviceGate::new();
    let dir = tempfile::tempdir().unwrap();
    let coordinator = ProvisioningCoordinator::new(
        Arc::clone(&transport),
        gate.clone(),
        shared(CameraConfig::default()),
        HttpConfigClient::new(),
        RecordStore::new(dir.path().join("camera_tx.json")),
        EventSender::sink(),
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    // Something else (e.g. a discovery scan) holds the device
    let guard = gate.try_acquire().unwrap();
    assert!(matches!(
        coordinator.scan_networks().await.unwrap_err(),
        ProvisionError::Busy
    ));
    assert!(matches!(
        coordinator.connect_network("bb", "pw").await.unwrap_err(),
        ProvisionError::Busy
    ));

    // Released: the same call goes through
    drop(guard);
    assert!(coordinator.scan_networks().await.is_ok());
}

#[tokio::test]
async fn serial_config_refresh_overlays_known_fields() {
    let transport = ScriptedTransport::with_replies([
        br#"{"status":5,"payload":{"host":"10.0.0.7","port":8890,"framerate":50}}"#.as_slice(),
    ]);
    let config = shared(CameraConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(
        Arc::clone(&transport),
        Arc::clone(&config),
        RecordStore::new(dir.path().join("camera_tx.json")),
        EventSender::sink(),
    );
    coordinator.set_port("/dev/ttyUSB0").await;

    let remote = coordinator.refresh_config_from_camera().await.unwrap();
    assert_eq!(remote.host.as_deref(), Some("10.0.0.7"));

    let config = config.lock().await;
    assert_eq!(config.rx_host, "10.0.0.7");
    assert_eq!(config.rx_port, 8890);
    assert_eq!(config.framerate, 50);
    // Fields the camera did not report stay put
    assert_eq!((config.width, config.height), (1280, 720));
}

#[tokio::test]
async fn apply_config_aborts_when_transmitter_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);

    let transport = ScriptedTransport::with_replies([]);
    let config = shared(CameraConfig::default());
    config.lock().await.tx_port = dead_port;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(
        Arc::clone(&transport),
        config,
        RecordStore::new(dir.path().join("camera_tx.json")),
        EventSender::sink(),
    );

    assert!(matches!(
        coordinator.apply_config().await.unwrap_err(),
        ProvisionError::TransmitterUnreachable
    ));
}

#[tokio::test]
async fn provisioning_without_discovered_port_is_refused() {
    let transport = ScriptedTransport::with_replies([]);
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(
        Arc::clone(&transport),
        shared(CameraConfig::default()),
        RecordStore::new(dir.path().join("camera_tx.json")),
        EventSender::sink(),
    );

    assert!(matches!(
        coordinator.scan_networks().await.unwrap_err(),
        ProvisionError::NoPort
    ));
    assert!(transport.requests().is_empty());
}

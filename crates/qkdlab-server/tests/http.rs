//! End-to-end tests: the real HTTP transport and session controller against
//! an engine bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use qkdlab_core::controller::{KEY_RATE_CHART, QBER_CHART};
use qkdlab_core::{
    CallError, ClientConfig, EveAttack, HttpTransport, NotificationBoard, QubitView, RunConfig,
    RunStatus, SessionController, SessionPhase, SimulationTransport, StartOutcome,
};
use tokio::net::TcpListener;
use tokio::time::sleep;

async fn spawn_engine(seed: u64) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(qkdlab_server::serve(listener, Some(seed)));
    addr
}

fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        poll_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    }
    .with_engine_url(&format!("http://{addr}"))
    .unwrap()
}

fn controller(addr: SocketAddr) -> (SessionController, Arc<NotificationBoard>) {
    let config = client_config(addr);
    let transport = Arc::new(HttpTransport::new(config.clone()).unwrap());
    let board = Arc::new(NotificationBoard::default());
    (
        SessionController::new(transport, board.clone(), config),
        board,
    )
}

async fn health(addr: SocketAddr) -> serde_json::Value {
    reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn index_lists_the_engine_contract() {
    let addr = spawn_engine(1).await;
    let index: serde_json::Value = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let endpoints = index["endpoints"].as_object().unwrap();
    for path in [
        "/api/start_continuous_simulation",
        "/api/stop_continuous_simulation",
        "/api/get_continuous_data",
        "/api/run_simulation",
    ] {
        assert!(endpoints.contains_key(path), "missing {path}");
    }
}

#[tokio::test]
async fn live_session_over_http() {
    let addr = spawn_engine(7).await;
    let (ctl, _) = controller(addr);

    let ack = match ctl.start(RunConfig::default()).await {
        StartOutcome::Started(ack) => ack,
        other => panic!("start failed: {other:?}"),
    };
    assert_eq!(ack.photon_rate, Some(1000.0));
    sleep(Duration::from_millis(600)).await;

    let view = ctl.view();
    assert!(view.is_running());
    assert_eq!(view.simulation_id, ack.simulation_id);
    assert!(view.snapshots_applied >= 3, "applied {}", view.snapshots_applied);
    assert!(!view.series(QBER_CHART).unwrap().is_empty());
    assert!(!view.series(KEY_RATE_CHART).unwrap().is_empty());
    assert!(matches!(view.qubits, Some(QubitView::Records(_))));
    assert_eq!(health(addr).await["running"], true);

    ctl.stop().await;
    assert_eq!(ctl.phase(), SessionPhase::Idle);
    assert_eq!(ctl.live_timers(), 0);
    assert_eq!(health(addr).await["running"], false);
}

#[tokio::test]
async fn engine_side_stop_ends_the_session() {
    let addr = spawn_engine(8).await;
    let (ctl, board) = controller(addr);
    ctl.start(RunConfig::default()).await;
    sleep(Duration::from_millis(200)).await;

    let other = HttpTransport::new(client_config(addr)).unwrap();
    let envelope = other.stop().await.unwrap();
    assert_eq!(envelope.status, RunStatus::Success);
    sleep(Duration::from_millis(300)).await;

    assert_eq!(ctl.phase(), SessionPhase::Idle);
    assert!(!ctl.view().polling);
    assert!(
        board
            .active()
            .iter()
            .any(|n| n.message.contains("Continuous simulation ended"))
    );
}

#[tokio::test]
async fn stop_without_a_run_is_informational() {
    let addr = spawn_engine(9).await;
    let transport = HttpTransport::new(client_config(addr)).unwrap();
    let envelope = transport.stop().await.unwrap();
    assert_eq!(envelope.status, RunStatus::Info);

    let snapshot = transport.poll().await.unwrap();
    assert_eq!(snapshot.status, RunStatus::Info);
    assert!(snapshot.metrics.is_none());
}

#[tokio::test]
async fn second_start_replaces_the_run() {
    let addr = spawn_engine(10).await;
    let transport = HttpTransport::new(client_config(addr)).unwrap();
    let first = transport.start(&RunConfig::default()).await.unwrap();
    let second = transport.start(&RunConfig::default()).await.unwrap();
    assert_ne!(first.simulation_id, second.simulation_id);
    assert_eq!(
        health(addr).await["simulation_id"].as_str(),
        second.simulation_id.as_deref()
    );
}

#[tokio::test]
async fn single_shot_over_http() {
    let addr = spawn_engine(11).await;
    let (ctl, _) = controller(addr);
    let report = ctl
        .run_once(&RunConfig {
            num_qubits: 24,
            eve_attack: EveAttack::InterceptResend,
            ..RunConfig::default()
        })
        .await
        .unwrap();
    assert_eq!(report.result.status, RunStatus::Success);
    assert!(report.result.qubits.transmission_data.is_some());
    assert!(report.result.qubits.alice_bits.is_some());
    match report.view {
        QubitView::Records(normalized) => assert_eq!(normalized.records.len(), 24),
        QubitView::Degraded(fields) => panic!("degraded: {fields:?}"),
    }
}

#[tokio::test]
async fn invalid_manual_input_is_an_application_error() {
    let addr = spawn_engine(12).await;
    let transport = HttpTransport::new(client_config(addr)).unwrap();
    let err = transport
        .run_once(&RunConfig {
            alice_bits: Some("0110".to_string()),
            alice_bases: Some("+x".to_string()),
            ..RunConfig::default()
        })
        .await
        .unwrap_err();
    match err {
        CallError::Application { status, message } => {
            assert_eq!(status, RunStatus::Error);
            assert!(!message.is_empty());
        }
        other => panic!("expected application error, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_run_is_rejected_and_engine_stays_up() {
    let addr = spawn_engine(13).await;
    let transport = HttpTransport::new(client_config(addr)).unwrap();
    let err = transport
        .run_once(&RunConfig {
            num_qubits: usize::MAX,
            ..RunConfig::default()
        })
        .await
        .unwrap_err();
    match err {
        CallError::Application { status, message } => {
            assert_eq!(status, RunStatus::Error);
            assert!(message.contains("num_qubits"), "{message}");
        }
        other => panic!("expected application error, got {other:?}"),
    }

    let result = transport
        .run_once(&RunConfig {
            num_qubits: 32,
            ..RunConfig::default()
        })
        .await
        .unwrap();
    assert_eq!(result.status, RunStatus::Success);
}

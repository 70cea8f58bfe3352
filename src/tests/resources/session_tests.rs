use crate::{
    VdiClient,
    cloning::application::request::clone_request::CloneConfig,
    core::{
        domain::{
            error::{ConnectError, VdiError},
            model::{connection_blob::ConnectionBlob, vm_handle::VmHandle},
        },
        infrastructure::poll::PollPolicy,
    },
    lifecycle::application::service::lifecycle_service::LifecycleService,
    session::application::{
        service::{
            session_connector::SessionConnector,
            session_pipeline::{SessionPipeline, Stage, VmSelection},
        },
        sink::MockConnectionSink,
    },
    tests::{
        NODE_ADDRESS, TICKET, api_error, create_cancellable_client, create_test_auth,
        create_test_client, create_test_credentials, data, fast_policy, login_response,
        mount_login,
    },
};
use std::{sync::Mutex, time::Duration};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path, path_regex},
};

const SPICE_PATH_4201: &str = "/api2/spiceconfig/nodes/pve1/qemu/4201/spiceproxy";

/// A connection file with CRLF and a non-UTF-8 byte, to catch any re-encoding.
fn spice_blob() -> Vec<u8> {
    let mut blob = b"[virt-viewer]\r\ntype=spice\r\nhost=pvespiceproxy:4EEC61E2:4201:pve1::abc\r\n\
proxy=http://127.0.0.1:3128\r\ntls-port=61000\r\npassword=one-time\r\n"
        .to_vec();
    blob.push(0xff);
    blob
}

fn not_running() -> ResponseTemplate {
    api_error(500, "VM 4201 not running")
}

fn create_connector(mock_server: &MockServer) -> SessionConnector {
    let client = create_test_client(mock_server);
    SessionConnector::new(
        client.clone(),
        LifecycleService::new(client, fast_policy(Duration::from_secs(2))),
    )
}

fn expect_blob(sink: &mut MockConnectionSink, expected: Vec<u8>) {
    sink.expect_deliver()
        .withf(move |blob: &ConnectionBlob| blob.as_bytes() == expected.as_slice())
        .times(1)
        .returning(|_| Ok(()));
}

fn resources() -> serde_json::Value {
    serde_json::json!([
        {"id": "qemu/4201", "type": "qemu", "node": "pve1", "name": "lab-win11", "status": "running"},
        {"id": "qemu/4202", "type": "qemu", "node": "pve2", "name": "lab-linux", "status": "stopped"},
        {"id": "qemu/4203", "type": "qemu", "node": "pve1", "name": "lab-ubuntu", "status": "stopped"},
        {"id": "qemu/9000", "type": "qemu", "node": "pve1", "name": "tmpl-win11", "status": "stopped", "template": 1},
        {"id": "node/pve1", "type": "node", "node": "pve1", "status": "online"},
    ])
}

async fn mount_resources(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .respond_with(data(resources()))
        .mount(mock_server)
        .await;
}

fn create_pipeline(mock_server: &MockServer) -> SessionPipeline {
    SessionPipeline::new(create_test_client(mock_server))
        .with_health_policy(fast_policy(Duration::from_secs(2)))
        .with_clone_policy(fast_policy(Duration::from_secs(2)))
}

#[tokio::test]
async fn test_connector_returns_body_verbatim() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SPICE_PATH_4201))
        .and(header("CSRFPreventionToken", "4EEC61E2:token"))
        .and(body_string_contains("proxy=127.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(spice_blob()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let blob = create_connector(&mock_server)
        .request_connection(&create_test_auth(), &VmHandle::new(4201, "pve1", "lab-win11"))
        .await
        .unwrap();

    assert_eq!(blob.as_bytes(), spice_blob().as_slice());
}

#[tokio::test]
async fn test_connector_auto_starts_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SPICE_PATH_4201))
        .respond_with(not_running())
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(SPICE_PATH_4201))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(spice_blob()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/4201/status/start"))
        .respond_with(data(serde_json::json!("UPID:pve1:1:2:3:qmstart:4201:testuser@pve:")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/4201/agent/ping"))
        .respond_with(data(serde_json::json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let blob = create_connector(&mock_server)
        .request_connection(&create_test_auth(), &VmHandle::new(4201, "pve1", "lab-win11"))
        .await
        .unwrap();
    assert_eq!(blob.into_bytes(), spice_blob());
}

#[tokio::test]
async fn test_connector_gives_up_after_second_not_running() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SPICE_PATH_4201))
        .respond_with(not_running())
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/4201/status/start"))
        .respond_with(data(serde_json::json!("UPID:pve1:1:2:3:qmstart:4201:testuser@pve:")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/4201/agent/ping"))
        .respond_with(data(serde_json::json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = create_connector(&mock_server)
        .request_connection(&create_test_auth(), &VmHandle::new(4201, "pve1", "lab-win11"))
        .await;

    match result {
        Err(ConnectError::StillNotRunning { vmid, message }) => {
            assert_eq!(vmid, 4201);
            assert!(message.contains("not running"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_connector_other_error_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(SPICE_PATH_4201))
        .respond_with(api_error(403, "Permission check failed (/vms/4201, VM.Console)"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = create_connector(&mock_server)
        .request_connection(&create_test_auth(), &VmHandle::new(4201, "pve1", "lab-win11"))
        .await;

    assert!(matches!(
        result,
        Err(ConnectError::Rejected { vmid: 4201, status: 403, .. })
    ));
}

#[tokio::test]
async fn test_pipeline_running_vm_on_login_node() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, TICKET).await;
    mount_resources(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(SPICE_PATH_4201))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(spice_blob()))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/status/start$"))
        .respond_with(data(serde_json::Value::Null))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut sink = MockConnectionSink::new();
    expect_blob(&mut sink, spice_blob());
    let stages = Mutex::new(Vec::new());
    let status = |stage: Stage| stages.lock().unwrap().push(stage);

    let outcome = create_pipeline(&mock_server)
        .run(
            &create_test_credentials(),
            VmSelection::Existing(4201),
            &status,
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(outcome.vm, VmHandle::new(4201, "pve1", "lab-win11"));
    assert!(outcome.clone_job.is_none());
    assert!(!outcome.started);
    assert_eq!(outcome.node_address.as_str(), NODE_ADDRESS);
    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            Stage::Authenticating,
            Stage::ListingVms,
            Stage::Connecting,
            Stage::HandingOff,
            Stage::Done,
        ]
    );
}

#[tokio::test]
async fn test_pipeline_stopped_vm_on_login_node() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, TICKET).await;
    mount_resources(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/4203/status/start"))
        .respond_with(data(serde_json::json!("UPID:pve1:1:2:3:qmstart:4203:testuser@pve:")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/4203/agent/ping"))
        .respond_with(data(serde_json::json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"/network$"))
        .respond_with(data(serde_json::json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/spiceconfig/nodes/pve1/qemu/4203/spiceproxy"))
        .and(body_string_contains("proxy=127.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(spice_blob()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut sink = MockConnectionSink::new();
    expect_blob(&mut sink, spice_blob());
    let stages = Mutex::new(Vec::new());
    let status = |stage: Stage| stages.lock().unwrap().push(stage);

    let outcome = create_pipeline(&mock_server)
        .run(
            &create_test_credentials(),
            VmSelection::Existing(4203),
            &status,
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(outcome.vm, VmHandle::new(4203, "pve1", "lab-ubuntu"));
    assert!(outcome.started);
    assert_eq!(outcome.node_address.as_str(), NODE_ADDRESS);
    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            Stage::Authenticating,
            Stage::ListingVms,
            Stage::Starting,
            Stage::WaitingForGuest,
            Stage::Connecting,
            Stage::HandingOff,
            Stage::Done,
        ]
    );
}

#[tokio::test]
async fn test_pipeline_stopped_vm_on_other_node() {
    const NODE_TICKET: &str = "PVE:testuser@pve:4EEC61E3::pve2sig";
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(login_response(TICKET))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    // One login scoped to pve2 for reading its interfaces, one on the resolved address.
    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(login_response(NODE_TICKET))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_resources(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve2/qemu/4202/status/start"))
        .respond_with(data(serde_json::json!("UPID:pve2:1:2:3:qmstart:4202:testuser@pve:")))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve2/qemu/4202/agent/ping"))
        .respond_with(data(serde_json::json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve1/network"))
        .respond_with(data(serde_json::json!([
            {"iface": "lo", "type": "loopback", "active": 1,
             "address": NODE_ADDRESS, "cidr": "127.0.0.1/8"},
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes/pve2/network"))
        .and(header("cookie", format!("PVEAuthCookie={}", NODE_TICKET).as_str()))
        .respond_with(data(serde_json::json!([
            {"iface": "vmbr0", "type": "bridge", "active": 1,
             "address": "192.168.20.12", "cidr": "192.168.20.12/24"},
            {"iface": "lo", "type": "loopback", "active": 1,
             "address": NODE_ADDRESS, "cidr": "127.0.0.1/8"},
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api2/spiceconfig/nodes/pve2/qemu/4202/spiceproxy"))
        .and(header("cookie", format!("PVEAuthCookie={}", NODE_TICKET).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(spice_blob()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut sink = MockConnectionSink::new();
    expect_blob(&mut sink, spice_blob());
    let stages = Mutex::new(Vec::new());
    let status = |stage: Stage| stages.lock().unwrap().push(stage);

    let outcome = create_pipeline(&mock_server)
        .run(
            &create_test_credentials(),
            VmSelection::Existing(4202),
            &status,
            &sink,
        )
        .await
        .unwrap();

    assert_eq!(outcome.vm.node, "pve2");
    assert!(outcome.started);
    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            Stage::Authenticating,
            Stage::ListingVms,
            Stage::Starting,
            Stage::WaitingForGuest,
            Stage::ResolvingNetwork,
            Stage::Reauthenticating,
            Stage::Connecting,
            Stage::HandingOff,
            Stage::Done,
        ]
    );
}

#[tokio::test]
async fn test_pipeline_clones_template() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, TICKET).await;
    mount_resources(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/api2/json/nodes/pve1/qemu/9000/clone"))
        .respond_with(data(serde_json::json!(
            "UPID:pve1:0000C0DE:01234567:65000000:qmclone:9000:testuser@pve:"
        )))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api2/json/nodes/pve1/tasks/UPID:[^/]+/status$"))
        .respond_with(data(serde_json::json!({"status": "stopped", "exitstatus": "OK"})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api2/json/nodes/pve1/qemu/\d+/status/start$"))
        .respond_with(data(serde_json::Value::Null))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api2/json/nodes/pve1/qemu/\d+/agent/ping$"))
        .respond_with(data(serde_json::json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api2/spiceconfig/nodes/pve1/qemu/\d+/spiceproxy$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(spice_blob()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut sink = MockConnectionSink::new();
    expect_blob(&mut sink, spice_blob());

    let outcome = create_pipeline(&mock_server)
        .with_clone_config(CloneConfig::new("fast-ssd", "students").unwrap())
        .run(
            &create_test_credentials(),
            VmSelection::CloneTemplate(9000),
            &|_: Stage| {},
            &sink,
        )
        .await
        .unwrap();

    let job = outcome.clone_job.unwrap();
    assert_eq!(job.target_numeric_id, outcome.vm.numeric_id);
    assert!(outcome.vm.numeric_id >= 100_000);
    assert_ne!(outcome.vm.numeric_id, 9000);
    assert!(outcome.started);
}

#[tokio::test]
async fn test_pipeline_clone_without_config() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, TICKET).await;
    mount_resources(&mock_server).await;

    let mut sink = MockConnectionSink::new();
    sink.expect_deliver().times(0);

    let result = create_pipeline(&mock_server)
        .run(
            &create_test_credentials(),
            VmSelection::CloneTemplate(9000),
            &|_: Stage| {},
            &sink,
        )
        .await;

    assert!(matches!(result, Err(VdiError::Validation(_))));
}

#[tokio::test]
async fn test_pipeline_unknown_vm() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, TICKET).await;
    mount_resources(&mock_server).await;

    let mut sink = MockConnectionSink::new();
    sink.expect_deliver().times(0);

    // 420 is a substring of 4201 and must not match it.
    let result = create_pipeline(&mock_server)
        .run(
            &create_test_credentials(),
            VmSelection::Existing(420),
            &|_: Stage| {},
            &sink,
        )
        .await;

    match result {
        Err(err @ VdiError::VmNotFound(420)) => assert_eq!(err.stage(), "inventory"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_pipeline_cancelled_run_sends_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(login_response(TICKET))
        .expect(0)
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut sink = MockConnectionSink::new();
    sink.expect_deliver().times(0);

    let result = SessionPipeline::new(create_cancellable_client(&mock_server, cancel))
        .run(
            &create_test_credentials(),
            VmSelection::Existing(4201),
            &|_: Stage| {},
            &sink,
        )
        .await;

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.stage(), "authentication");
}

#[tokio::test]
async fn test_pipeline_sink_failure_is_reported() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, TICKET).await;
    mount_resources(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(SPICE_PATH_4201))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(spice_blob()))
        .mount(&mock_server)
        .await;

    let mut sink = MockConnectionSink::new();
    sink.expect_deliver()
        .times(1)
        .returning(|_| Err(VdiError::Sink("disk full".to_string())));

    let result = create_pipeline(&mock_server)
        .run(
            &create_test_credentials(),
            VmSelection::Existing(4201),
            &|_: Stage| {},
            &sink,
        )
        .await;

    assert!(matches!(result, Err(VdiError::Sink(message)) if message == "disk full"));
}

#[test]
fn test_builder_rejects_unbounded_poll_policies() {
    let busy = PollPolicy {
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        ..fast_policy(Duration::from_secs(2))
    };
    let result = VdiClient::builder().health_policy(busy).build();
    assert!(matches!(result, Err(VdiError::Validation(_))));

    let exploding = PollPolicy {
        multiplier: f64::INFINITY,
        ..fast_policy(Duration::from_secs(2))
    };
    let result = VdiClient::builder().clone_policy(exploding).build();
    assert!(matches!(result, Err(VdiError::Validation(_))));

    assert!(VdiClient::builder()
        .health_policy(fast_policy(Duration::from_secs(2)))
        .build()
        .is_ok());
}

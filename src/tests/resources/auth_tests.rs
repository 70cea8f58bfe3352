use crate::{
    auth::application::service::login_service::LoginService,
    core::domain::error::{AuthError, TransportError},
    tests::{
        NODE_ADDRESS, TICKET, api_error, create_cancellable_client, create_test_client,
        create_test_credentials, data, login_response,
    },
};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header, method, path},
};

#[tokio::test]
async fn test_login_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=testuser%40pve"))
        .and(body_string_contains("password=testpass"))
        .respond_with(login_response(TICKET))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = LoginService::new(create_test_client(&mock_server));
    let auth = service
        .authenticate(&create_test_credentials())
        .await
        .unwrap();

    assert_eq!(auth.ticket().as_str(), TICKET);
    assert_eq!(auth.csrf_token().as_str(), "4EEC61E2:token");
    assert_eq!(auth.node_address().as_str(), NODE_ADDRESS);
}

#[tokio::test]
async fn test_login_invalid_credentials_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = LoginService::new(create_test_client(&mock_server));
    let result = service.authenticate(&create_test_credentials()).await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}

#[tokio::test]
async fn test_login_unexpected_status_keeps_server_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(api_error(500, "cluster not ready - no quorum?"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = LoginService::new(create_test_client(&mock_server));
    match service.authenticate(&create_test_credentials()).await {
        Err(AuthError::UnexpectedStatus { status, message }) => {
            assert_eq!(status, 500);
            assert!(message.contains("no quorum"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_login_without_ticket_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(data(serde_json::Value::Null))
        .mount(&mock_server)
        .await;

    let service = LoginService::new(create_test_client(&mock_server));
    let result = service.authenticate(&create_test_credentials()).await;
    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));

    mock_server.reset().await;
    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(data(serde_json::json!({
            "ticket": "",
            "CSRFPreventionToken": "4EEC61E2:token",
        })))
        .mount(&mock_server)
        .await;

    let result = service.authenticate(&create_test_credentials()).await;
    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_login_cancelled_before_sending() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api2/json/access/ticket"))
        .respond_with(login_response(TICKET))
        .expect(0)
        .mount(&mock_server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let service = LoginService::new(create_cancellable_client(&mock_server, cancel));
    let result = service.authenticate(&create_test_credentials()).await;

    assert!(matches!(
        result,
        Err(AuthError::Transport(TransportError::Cancelled))
    ));
}

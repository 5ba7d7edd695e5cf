use std::sync::Arc;

use bigdecimal::BigDecimal;
use mockito::{Matcher, Server};
use tokio::net::TcpListener;

use immopay_core::gateway::{
    CinetPayClient, CredentialStore, GatewayCredentials, GatewayError, GatewayPaymentStatus,
    InitializePaymentRequest,
};

fn test_credentials() -> Arc<CredentialStore> {
    CredentialStore::new(GatewayCredentials {
        api_key: "key-123".to_string(),
        site_id: "105899".to_string(),
        secret_key: "hush".to_string(),
    })
}

fn deposit_request() -> InitializePaymentRequest {
    InitializePaymentRequest {
        transaction_id: "txn_a3f2_17_9c1d4e8b".to_string(),
        amount: BigDecimal::from(5000),
        currency: "XOF".to_string(),
        description: "Depot agence".to_string(),
        customer_name: "Awa".to_string(),
        customer_surname: "Diop".to_string(),
        customer_email: "awa@example.com".to_string(),
        customer_phone_number: "+221770000000".to_string(),
        notify_url: "https://pay.example.com/payments/notify".to_string(),
        return_url: "https://pay.example.com/done".to_string(),
        channels: "ALL".to_string(),
    }
}

#[tokio::test]
async fn initialize_payment_returns_checkout_url() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/payment")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "apikey": "key-123",
            "site_id": "105899",
            "transaction_id": "txn_a3f2_17_9c1d4e8b",
            "amount": "5000",
            "currency": "XOF",
        })))
        .with_status(200)
        .with_body(
            r#"{
                "code": "201",
                "message": "CREATED",
                "data": {
                    "payment_token": "tok-1",
                    "payment_url": "https://checkout.cinetpay.com/payment/tok-1"
                },
                "api_response_id": "1612345678.1234"
            }"#,
        )
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let initiated = client
        .initialize_payment(&deposit_request())
        .await
        .expect("initialization should succeed");

    assert_eq!(initiated.payment_token, "tok-1");
    assert_eq!(
        initiated.payment_url,
        "https://checkout.cinetpay.com/payment/tok-1"
    );
    assert_eq!(initiated.api_response_id.as_deref(), Some("1612345678.1234"));
    mock.assert_async().await;
}

#[tokio::test]
async fn initialize_payment_surfaces_gateway_decline() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/v2/payment")
        .with_status(200)
        .with_body(r#"{"code":"608","message":"MINIMUM_REQUIRED_FIELDS"}"#)
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let err = client
        .initialize_payment(&deposit_request())
        .await
        .expect_err("a decline should not look like success");

    match err {
        GatewayError::Declined { code, message } => {
            assert_eq!(code, "608");
            assert_eq!(message, "MINIMUM_REQUIRED_FIELDS");
        }
        other => panic!("expected Declined, got {other:?}"),
    }
}

#[tokio::test]
async fn initialize_payment_without_checkout_data_is_invalid() {
    // "code": "201" claims success, so a missing data block is a contract
    // violation rather than a decline.
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/v2/payment")
        .with_status(200)
        .with_body(r#"{"code":"201","message":"CREATED","data":null}"#)
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let err = client
        .initialize_payment(&deposit_request())
        .await
        .expect_err("missing data should be rejected");

    assert!(matches!(err, GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn check_payment_maps_accepted_status() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v2/payment/check")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "apikey": "key-123",
            "site_id": "105899",
            "transaction_id": "txn_a3f2_17_9c1d4e8b",
        })))
        .with_status(200)
        .with_body(
            r#"{
                "code": "00",
                "message": "SUCCES",
                "data": {
                    "status": "ACCEPTED",
                    "operator_id": "OM-778899",
                    "payment_method": "OM"
                }
            }"#,
        )
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let check = client
        .check_payment("txn_a3f2_17_9c1d4e8b")
        .await
        .expect("check should succeed");

    assert_eq!(check.status, GatewayPaymentStatus::Accepted);
    assert_eq!(check.operator_id.as_deref(), Some("OM-778899"));
    assert_eq!(check.payment_method.as_deref(), Some("OM"));
    mock.assert_async().await;
}

#[tokio::test]
async fn check_payment_maps_refused_status() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/v2/payment/check")
        .with_status(200)
        .with_body(r#"{"code":"00","message":"OK","data":{"status":"PAYMENT_FAILED"}}"#)
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let check = client.check_payment("txn_a3f2_17_9c1d4e8b").await.unwrap();

    assert_eq!(check.status, GatewayPaymentStatus::Refused);
    assert_eq!(check.operator_id, None);
}

#[tokio::test]
async fn check_payment_treats_unsettled_wire_status_as_pending() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/v2/payment/check")
        .with_status(200)
        .with_body(r#"{"code":"00","message":"OK","data":{"status":"WAITING_FOR_CUSTOMER"}}"#)
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let check = client.check_payment("txn_a3f2_17_9c1d4e8b").await.unwrap();

    assert_eq!(check.status, GatewayPaymentStatus::Pending);
}

#[tokio::test]
async fn check_payment_without_data_is_a_decline() {
    let mut server = Server::new_async().await;
    let _m = server
        .mock("POST", "/v2/payment/check")
        .with_status(200)
        .with_body(r#"{"code":"604","message":"TRANSACTION_NOT_FOUND"}"#)
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let err = client
        .check_payment("txn_missing_1_00000000")
        .await
        .expect_err("an unknown transaction should not check out");

    match err {
        GatewayError::Declined { code, .. } => assert_eq!(code, "604"),
        other => panic!("expected Declined, got {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    // expect(1) proves the client did not hammer a failing gateway.
    let mock = server
        .mock("POST", "/v2/payment")
        .with_status(502)
        .with_body("bad gateway")
        .expect(1)
        .create();

    let client = CinetPayClient::new(server.url(), test_credentials());
    let err = client
        .initialize_payment(&deposit_request())
        .await
        .expect_err("a 502 should fail");

    assert!(matches!(err, GatewayError::InvalidResponse(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn connect_failures_trip_the_circuit_breaker() {
    // Bind then drop a listener so the port is free and connections are
    // refused immediately instead of hanging.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = CinetPayClient::with_circuit_breaker(
        format!("http://{addr}"),
        test_credentials(),
        3,
        60,
    );
    assert_eq!(client.circuit_state(), "closed");

    let err = client
        .initialize_payment(&deposit_request())
        .await
        .expect_err("nothing is listening");
    assert!(matches!(
        err,
        GatewayError::Request(_) | GatewayError::CircuitOpen
    ));

    // All retry attempts failed, which is past the threshold.
    assert_eq!(client.circuit_state(), "open");

    let rejected = client
        .check_payment("txn_a3f2_17_9c1d4e8b")
        .await
        .expect_err("open breaker should reject immediately");
    assert!(matches!(rejected, GatewayError::CircuitOpen));
}

use pacepulse::gateway::{CheckoutRequest, GatewayError, PaymentGateway, SslcommerzGateway};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        tran_id: "tx-1".into(),
        amount: 1500.0,
        currency: "BDT".into(),
        customer_name: "Asha Khan".into(),
        customer_email: "runner@x.com".into(),
        product_name: "Coastal Marathon".into(),
        success_url: "http://server.test/success/tx-1".into(),
        fail_url: "http://server.test/failed".into(),
        cancel_url: "http://server.test/failed".into(),
    }
}

#[tokio::test]
async fn session_success_yields_redirect_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .and(body_string_contains("tran_id=tx-1"))
        .and(body_string_contains("store_id=store-1"))
        .and(body_string_contains("total_amount=1500.00"))
        .and(body_string_contains("currency=BDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "SUCCESS",
            "GatewayPageURL": "https://pay.example/abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway =
        SslcommerzGateway::with_endpoint("store-1", "passwd-1", format!("{}/session", server.uri()));
    let session = gateway.create_session(&checkout_request()).await.unwrap();
    assert_eq!(session.redirect_url, "https://pay.example/abc");
}

#[tokio::test]
async fn declined_session_carries_the_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "FAILED",
            "failedreason": "store credential invalid"
        })))
        .mount(&server)
        .await;

    let gateway =
        SslcommerzGateway::with_endpoint("store-1", "passwd-1", format!("{}/session", server.uri()));
    let err = gateway.create_session(&checkout_request()).await.unwrap_err();
    match err {
        GatewayError::Declined(reason) => assert!(reason.contains("store credential invalid")),
        other => panic!("expected Declined, got {other:?}"),
    }
}

#[tokio::test]
async fn success_without_page_url_is_declined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status": "SUCCESS", "GatewayPageURL": "" })),
        )
        .mount(&server)
        .await;

    let gateway =
        SslcommerzGateway::with_endpoint("store-1", "passwd-1", format!("{}/session", server.uri()));
    assert!(matches!(
        gateway.create_session(&checkout_request()).await,
        Err(GatewayError::Declined(_))
    ));
}

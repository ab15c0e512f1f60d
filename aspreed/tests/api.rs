//! End-to-end tests over the real router with an in-memory database and
//! mock collaborators.

use std::sync::Arc;

use aspree_common::{env::DeployEnv, shutdown::ShutdownChannel};
use aspree_core::{
    auth::{AuthConfig, AuthService},
    cache::Cache,
    gateway::mock::MockGateway,
    lifecycle::InvoiceLifecycle,
    metrics::MetricsCollector,
    profile::ProfileService,
    queue::SideEffectQueue,
    store::Store,
    traits::mock::{FixedExtractor, RecordingBlobStore, RecordingNotifier},
};
use aspree_crypto::SecretVault;
use aspreed::{config::Config, serve::build_router, state::AppState};
use axum::{body::Body, Router};
use http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _upload_dir: TempDir,
}

async fn test_app() -> TestApp {
    aspreed::logger::init_for_testing();

    let upload_dir = TempDir::new().unwrap();
    let config = Config {
        port: 0,
        database_url: "sqlite::memory:".to_owned(),
        upload_dir: upload_dir.path().to_path_buf(),
        base_url: "http://localhost:3000".to_owned(),
        jwt_secret: "test-jwt-secret".to_owned(),
        master_key: "test-master-encryption-key".to_owned(),
        cors_origin: None,
        deploy_env: DeployEnv::Dev,
        gateway_base_url: None,
    };

    let store = Store::open_in_memory().await.unwrap();
    let vault = Arc::new(SecretVault::from_master_secret(
        config.master_key.as_bytes(),
    ));
    let auth = AuthService::new(
        store.clone(),
        config.jwt_secret.as_bytes(),
        AuthConfig::default(),
    );
    let lifecycle = InvoiceLifecycle::new(store.clone());
    let (queue, _queue_task) = SideEffectQueue::start(
        store.clone(),
        Arc::new(RecordingNotifier::default()),
        Arc::new(RecordingBlobStore::default()),
        ShutdownChannel::new(),
    );
    let profiles = ProfileService::new(store.clone(), queue.clone());

    let extractor_draft: aspree_api::models::InvoiceDraft =
        serde_json::from_value(json!({
            "customer": { "name": "Christy Wijaya", "email": "c@x.com" },
            "items": [{
                "productName": "Lollipop",
                "sku": "LOLLY",
                "quantity": 1,
                "unitPrice": 5000.0
            }]
        }))
        .unwrap();

    let state = Arc::new(AppState {
        config,
        store,
        auth,
        lifecycle,
        profiles,
        vault,
        gateway: Arc::new(MockGateway::accepting()),
        extractor: Arc::new(FixedExtractor(extractor_draft)),
        blobs: Arc::new(RecordingBlobStore::default()),
        queue,
        cache: Arc::new(Cache::new()),
        metrics: Arc::new(MetricsCollector::new()),
    });

    TestApp {
        router: build_router(state.clone()),
        state,
        _upload_dir: upload_dir,
    }
}

async fn send(
    app: &TestApp,
    request: Request<Body>,
) -> (StatusCode, Value) {
    use tower::util::ServiceExt;

    let response =
        app.router.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(request: &mut Request<Body>, token: &str) {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
}

fn post_json_authed(path: &str, token: &str, body: Value) -> Request<Body> {
    let mut request = post_json(path, body);
    authed(&mut request, token);
    request
}

fn put_json_authed(path: &str, token: &str, body: Value) -> Request<Body> {
    let mut request = Request::builder()
        .method("PUT")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    authed(&mut request, token);
    request
}

fn get_authed(path: &str, token: &str) -> Request<Body> {
    let mut request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    authed(&mut request, token);
    request
}

/// Register + login; returns the bearer token.
async fn register_and_login(
    app: &TestApp,
    email: &str,
    password: &str,
) -> String {
    let (status, _body) = send(
        app,
        post_json(
            "/api/auth/register",
            json!({
                "email": email,
                "password": password,
                "businessName": "Toko Maju",
                "fullName": "Budi Santoso",
                "agreeTerms": true
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        app,
        post_json(
            "/api/auth/login",
            json!({ "email": email, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    body["token"].as_str().unwrap().to_owned()
}

fn lolly_draft(grand_total: f64) -> Value {
    json!({
        "customer": { "name": "Christy Wijaya", "email": "c@x.com" },
        "items": [{
            "productName": "Lollipop",
            "sku": "LOLLY",
            "quantity": 1,
            "unitPrice": grand_total
        }],
        "invoiceDate": "2024-01-01",
        "dueDate": "2024-01-15"
    })
}

async fn create_invoice(app: &TestApp, token: &str, draft: Value) -> Value {
    let (status, body) =
        send(app, post_json_authed("/api/confirm-invoice", token, draft))
            .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["invoice"].clone()
}

fn multipart_upload(
    path: &str,
    file_bytes: &[u8],
    notes: Option<&str>,
) -> Request<Body> {
    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; \
             filename=\"proof.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file_bytes);
    if let Some(notes) = notes {
        body.extend_from_slice(
            format!(
                "\r\n--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"notes\"\r\n\r\n\
                 {notes}"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png_of_len(len: usize) -> Vec<u8> {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.resize(len, 0x41);
    bytes
}

// --- Scenarios --- //

#[tokio::test]
async fn envelope_shapes() {
    let app = test_app().await;

    // Error envelope: {success: false, error}.
    let (status, body) = send(
        &app,
        post_json("/api/auth/login", json!({ "email": "a@x.com", "password": "nope1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    // Unauthenticated access to a protected route.
    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/api/invoices")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn two_merchant_isolation() {
    let app = test_app().await;
    let token_a = register_and_login(&app, "a@x.com", "password1A!").await;
    let token_b = register_and_login(&app, "b@x.com", "password1B!").await;

    // Merchant A creates a product and an invoice.
    let (status, _body) = send(
        &app,
        post_json_authed(
            "/api/products",
            &token_a,
            json!({ "sku": "LOLLY", "name": "Lollipop", "unitPrice": 5000.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let invoice = create_invoice(&app, &token_a, lolly_draft(5000.0)).await;
    let invoice_id = invoice["id"].as_str().unwrap();

    // Merchant B sees an empty catalog.
    let (status, body) =
        send(&app, get_authed("/api/products", &token_b)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["products"].as_array().unwrap().len(), 0);

    // Merchant B cannot read A's invoice: ownership failure, not 404.
    let (status, body) = send(
        &app,
        get_authed(&format!("/api/invoices/{invoice_id}"), &token_b),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    assert_eq!(body["success"], false);

    // A can, of course.
    let (status, body) = send(
        &app,
        get_authed(&format!("/api/invoices/{invoice_id}"), &token_a),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invoice"]["grandTotal"], 5000.0);
}

#[tokio::test]
async fn down_payment_cycle() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    let mut draft = lolly_draft(100000.0);
    draft["paymentSchedule"] = json!({
        "scheduleType": "down_payment",
        "downPayment": { "amount": 20000.0, "percentage": 20.0 },
        "remainingBalance": { "amount": 80000.0, "dueDate": "2024-02-01" }
    });
    let invoice = create_invoice(&app, &token, draft).await;
    let invoice_id = invoice["id"].as_str().unwrap().to_owned();
    let invoice_number = invoice["invoiceNumber"].as_str().unwrap().to_owned();
    let customer_token = invoice["customerToken"].as_str().unwrap().to_owned();
    assert_eq!(invoice["paymentStage"], "down_payment");

    // Mark sent.
    let (status, _body) = send(
        &app,
        put_json_authed(
            &format!("/api/invoices/{invoice_id}/status"),
            &token,
            json!({ "status": "sent" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Customer uploads a ~200 KiB png proof via the portal token.
    let (status, body) = send(
        &app,
        multipart_upload(
            &format!(
                "/api/invoices/{invoice_id}/payment-confirmation?token={customer_token}"
            ),
            &png_of_len(200 * 1024),
            Some("transferred via BCA"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["paymentStatus"], "confirmation_pending");

    // Merchant approves the down payment.
    let (status, body) = send(
        &app,
        put_json_authed(
            &format!("/api/invoices/{invoice_id}/payment-confirmations/approve"),
            &token,
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let dp_paid = &body["invoice"];
    assert_eq!(dp_paid["status"], "dp_paid");
    assert_eq!(dp_paid["paymentStage"], "final_payment");
    assert_eq!(dp_paid["dueDate"], "2024-02-01");
    assert_eq!(dp_paid["originalDueDate"], "2024-01-15");
    assert_eq!(dp_paid["paymentSchedule"]["downPayment"]["status"], "paid");
    let final_token =
        dp_paid["finalPaymentToken"].as_str().unwrap().to_owned();

    // The final-payment summary is addressable by the minted token.
    let (status, body) = send(
        &app,
        Request::builder()
            .uri(format!("/api/final-payment/{final_token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amountDue"], 80000.0);

    // Customer uploads the final proof via the final-payment token.
    let (status, body) = send(
        &app,
        multipart_upload(
            &format!("/api/final-payment/{final_token}/payment-confirmation"),
            &png_of_len(200 * 1024),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["paymentStatus"], "confirmation_pending");

    // Merchant approves the final payment: paid + auto-order.
    let (status, body) = send(
        &app,
        put_json_authed(
            &format!("/api/invoices/{invoice_id}/payment-confirmations/approve"),
            &token,
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["status"], "paid");
    assert_eq!(body["invoice"]["paymentStage"], "completed");
    assert_eq!(body["orderCreated"], true);

    // The derived order carries the full total and the source number.
    let (status, body) = send(&app, get_authed("/api/orders", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let orders = body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["totalAmount"], 100000.0);
    assert_eq!(orders[0]["sourceInvoiceNumber"], invoice_number);
    assert_eq!(orders[0]["paymentStatus"], "paid");
}

#[tokio::test]
async fn upload_boundaries() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;
    let invoice = create_invoice(&app, &token, lolly_draft(5000.0)).await;
    let invoice_id = invoice["id"].as_str().unwrap().to_owned();
    let customer_token =
        invoice["customerToken"].as_str().unwrap().to_owned();

    send(
        &app,
        put_json_authed(
            &format!("/api/invoices/{invoice_id}/status"),
            &token,
            json!({ "status": "sent" }),
        ),
    )
    .await;

    let upload_path = format!(
        "/api/invoices/{invoice_id}/payment-confirmation?token={customer_token}"
    );

    // 1023 bytes: too small.
    let (status, _body) =
        send(&app, multipart_upload(&upload_path, &png_of_len(1023), None))
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong type: rejected regardless of size.
    let (status, _body) = send(
        &app,
        multipart_upload(&upload_path, &vec![0x4D; 2048], None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 1024 bytes: accepted.
    let (status, body) =
        send(&app, multipart_upload(&upload_path, &png_of_len(1024), None))
            .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // A wrong token is rejected and logged.
    let (status, _body) = send(
        &app,
        multipart_upload(
            &format!(
                "/api/invoices/{invoice_id}/payment-confirmation?token=inv_wrongwrong0"
            ),
            &png_of_len(2048),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gateway_secret_encryption() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    let (status, body) = send(
        &app,
        post_json_authed(
            "/api/payment-methods",
            &token,
            json!({
                "methodType": "gateway",
                "enabled": true,
                "config": {
                    "secretKey": "sk_test_ABC",
                    "webhookToken": "whtok_123",
                    "environment": "production"
                }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // The raw storage row is encrypted and does not contain the secret.
    let merchant = app
        .state
        .store
        .get_merchant_by_email("m@x.com")
        .await
        .unwrap()
        .unwrap();
    let raw = app
        .state
        .store
        .get_payment_method(
            &merchant.id,
            aspree_api::types::status::MethodType::Gateway,
        )
        .await
        .unwrap()
        .unwrap();
    let stored_secret = raw.config["secretKey"].as_str().unwrap();
    assert!(SecretVault::is_encrypted(stored_secret));
    assert!(!stored_secret.contains("sk_test_ABC"));
    assert!(SecretVault::is_encrypted(
        raw.config["webhookToken"].as_str().unwrap()
    ));
    // Non-sensitive config fields stay readable at rest.
    assert_eq!(raw.config["environment"], "production");

    // The authenticated read returns the decrypted value.
    let (status, body) =
        send(&app, get_authed("/api/payment-methods", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let methods = body["paymentMethods"].as_array().unwrap();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0]["config"]["secretKey"], "sk_test_ABC");
}

#[tokio::test]
async fn webhook_signature_and_replay() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    // Gateway config with the webhook shared secret.
    send(
        &app,
        post_json_authed(
            "/api/payment-methods",
            &token,
            json!({
                "methodType": "gateway",
                "enabled": true,
                "config": { "webhookToken": "whtok_123" }
            }),
        ),
    )
    .await;

    let invoice = create_invoice(&app, &token, lolly_draft(100000.0)).await;
    let invoice_id = invoice["id"].as_str().unwrap().to_owned();
    let number = invoice["invoiceNumber"].as_str().unwrap().to_owned();
    send(
        &app,
        put_json_authed(
            &format!("/api/invoices/{invoice_id}/status"),
            &token,
            json!({ "status": "sent" }),
        ),
    )
    .await;

    let webhook_body = json!({
        "external_id": format!("{number}-1700000000000"),
        "status": "PAID"
    });

    // Wrong shared secret: 401, no state change.
    let request = Request::builder()
        .method("POST")
        .uri("/api/xendit/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-callback-token", "wrong-token")
        .body(Body::from(webhook_body.to_string()))
        .unwrap();
    let (status, _body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct secret: the invoice becomes paid and an order is created.
    let request = Request::builder()
        .method("POST")
        .uri("/api/xendit/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-callback-token", "whtok_123")
        .body(Body::from(webhook_body.to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["status"], "paid");
    assert_eq!(body["orderCreated"], true);
    let order_number = body["orderNumber"].as_str().unwrap().to_owned();

    // Replay: same order, not a second one.
    let request = Request::builder()
        .method("POST")
        .uri("/api/xendit/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-callback-token", "whtok_123")
        .body(Body::from(webhook_body.to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderCreated"], false);
    assert_eq!(body["orderNumber"], order_number);

    let (_status, body) = send(&app, get_authed("/api/orders", &token)).await;
    assert_eq!(body["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn preview_delegates_to_extractor() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    let (status, body) = send(
        &app,
        post_json_authed(
            "/api/preview-invoice",
            &token,
            json!({ "text": "1 lollipop for Christy, 5000" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["draft"]["customer"]["name"], "Christy Wijaya");
    assert_eq!(body["draft"]["items"][0]["productName"], "Lollipop");

    // Nothing was persisted by the preview.
    let (_status, body) = send(&app, get_authed("/api/invoices", &token)).await;
    assert_eq!(body["invoices"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn customer_portal_and_access_log() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;
    let invoice = create_invoice(&app, &token, lolly_draft(5000.0)).await;
    let customer_token =
        invoice["customerToken"].as_str().unwrap().to_owned();

    // Token view works without authentication and is enriched.
    let (status, body) = send(
        &app,
        Request::builder()
            .uri(format!("/api/customer/invoice/{customer_token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invoice"]["grandTotal"], 5000.0);
    assert_eq!(body["invoice"]["business"]["businessName"], "Toko Maju");

    // A bogus token 404s; both lookups are in the access log.
    let (status, _body) = send(
        &app,
        Request::builder()
            .uri("/api/customer/invoice/inv_nope000000")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let logs = app.state.store.recent_access_logs(10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(!logs[0].success);
    assert!(logs[1].success);
}

#[tokio::test]
async fn business_settings_and_code() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    let (status, body) = send(
        &app,
        post_json_authed(
            "/api/business/settings",
            &token,
            // Legacy snake_case field names are accepted on the way in.
            json!({ "tax_enabled": true, "taxRate": 11.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["settings"]["taxEnabled"], true);
    assert_eq!(body["settings"]["businessCode"], "TM");

    // Tax now applies to newly created invoices.
    let invoice = create_invoice(&app, &token, lolly_draft(100000.0)).await;
    assert_eq!(invoice["taxAmount"], 11000.0);
    assert_eq!(invoice["grandTotal"], 111000.0);
}

#[tokio::test]
async fn catalog_cache_serves_and_invalidates() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    send(
        &app,
        post_json_authed(
            "/api/products",
            &token,
            json!({ "sku": "A1", "name": "One", "unitPrice": 1000.0 }),
        ),
    )
    .await;

    // First read misses, second hits.
    let (_s, body) = send(&app, get_authed("/api/products", &token)).await;
    assert_eq!(body["products"].as_array().unwrap().len(), 1);
    let hits_before = app.state.cache.hits();
    let (_s, body) = send(&app, get_authed("/api/products", &token)).await;
    assert_eq!(body["products"].as_array().unwrap().len(), 1);
    assert!(app.state.cache.hits() > hits_before);

    // A write invalidates the merchant's cached catalog.
    send(
        &app,
        post_json_authed(
            "/api/products",
            &token,
            json!({ "sku": "A2", "name": "Two", "unitPrice": 2000.0 }),
        ),
    )
    .await;
    let (_s, body) = send(&app, get_authed("/api/products", &token)).await;
    assert_eq!(body["products"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn marking_sent_creates_hosted_checkout() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    send(
        &app,
        post_json_authed(
            "/api/payment-methods",
            &token,
            json!({
                "methodType": "gateway",
                "enabled": true,
                "config": {
                    "secretKey": "sk_test_ABC",
                    "webhookToken": "whtok_123"
                }
            }),
        ),
    )
    .await;

    let invoice = create_invoice(&app, &token, lolly_draft(5000.0)).await;
    let invoice_id = invoice["id"].as_str().unwrap();
    let number = invoice["invoiceNumber"].as_str().unwrap();

    let (status, body) = send(
        &app,
        put_json_authed(
            &format!("/api/invoices/{invoice_id}/status"),
            &token,
            json!({ "status": "sent" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    // The mock gateway echoes the external id into the checkout url, and
    // the external id begins with the invoice number.
    let checkout_url = body["checkoutUrl"].as_str().unwrap();
    assert!(checkout_url.contains(number), "{checkout_url}");
}

#[tokio::test]
async fn metrics_endpoint_reports_traffic() {
    let app = test_app().await;
    let token = register_and_login(&app, "m@x.com", "password1A!").await;

    let (status, body) = send(&app, get_authed("/api/metrics", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    // Register + login already went through the metrics middleware.
    assert!(body["totalRequests"].as_u64().unwrap() >= 2);
}

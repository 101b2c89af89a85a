//! 実際のGatewayを起動してクライアントを通しで動かすテスト。

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use apiseal_core::{Encryptable, EncryptableField, SelectiveFieldCrypto};
use apiseal_crypto::{AesGcmFieldCipher, RsaSuite};
use apiseal_gateway::RoutePolicies;
use apiseal_types::{keys, Charset, Envelope, SignType};

use crate::test_helpers::*;
use crate::{ClientError, EnvelopeClient, RequestFormat};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Order {
    id: String,
    name: String,
    amount: u32,
}

#[derive(Debug, Serialize)]
struct NewOrder {
    name: String,
    amount: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Customer {
    name: String,
    phone: String,
    emails: Vec<String>,
}

impl Encryptable for Customer {
    fn encryptable_fields(&mut self) -> Vec<EncryptableField<'_>> {
        vec![
            EncryptableField::Leaf(&mut self.phone),
            EncryptableField::strings(&mut self.emails),
        ]
    }
}

fn new_order() -> NewOrder {
    NewOrder {
        name: "allen".to_string(),
        amount: 3,
    }
}

// ---------------------------------------------------------------------------
// テスト用Gateway
// ---------------------------------------------------------------------------

async fn create_order(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!({ "id": "o-1", "name": body["name"], "amount": body["amount"] }))
}

async fn get_order(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Order> {
    Json(Order {
        id,
        name: params.get("name").cloned().unwrap_or_default(),
        amount: params
            .get("amount")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
    })
}

async fn update_order(Path(id): Path<String>, Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!({ "id": id, "name": body["name"], "amount": body["amount"] }))
}

async fn greet(Json(body): Json<serde_json::Value>) -> Json<String> {
    Json(format!("hello {}", body["bizContent"].as_str().unwrap_or_default()))
}

async fn form_echo(Form(fields): Form<HashMap<String, String>>) -> Json<HashMap<String, String>> {
    Json(fields)
}

fn router() -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route(
            "/orders/{id}",
            get(get_order)
                .put(update_order)
                .delete(|| async { StatusCode::NO_CONTENT }),
        )
        .route("/greet", post(greet))
        .route("/echo", post(|Json(body): Json<serde_json::Value>| async move { Json(body) }))
        .route("/form", post(form_echo))
        .route("/admin", post(|| async { Json(json!({ "secret": true })) }))
        .route(
            "/reserve",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(Order {
                        id: "o-7".to_string(),
                        name: "held".to_string(),
                        amount: 0,
                    }),
                )
            }),
        )
}

fn routes() -> RoutePolicies {
    RoutePolicies::new()
        .require(Method::POST, "/orders")
        .require(Method::GET, "/orders/{id}")
        .require(Method::PUT, "/orders/{id}")
        .require(Method::DELETE, "/orders/{id}")
        .require(Method::POST, "/greet")
        .require(Method::POST, "/echo")
        .require(Method::POST, "/form")
        .require(Method::POST, "/admin")
        .require(Method::POST, "/reserve")
}

async fn start() -> u16 {
    start_gateway(
        router(),
        routes(),
        &[
            (Method::POST, "/orders"),
            (Method::GET, "/orders/o-9"),
            (Method::PUT, "/orders/o-9"),
            (Method::DELETE, "/orders/o-9"),
            (Method::POST, "/greet"),
            (Method::POST, "/echo"),
            (Method::POST, "/form"),
            (Method::POST, "/reserve"),
        ],
    )
    .await
}

// ---------------------------------------------------------------------------
// 正常系
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_post_json_roundtrip() {
    let port = start().await;
    let client = signed_client(client_config(port));

    let order: Order = client.post("/orders", &new_order()).await.unwrap();
    assert_eq!(
        order,
        Order {
            id: "o-1".to_string(),
            name: "allen".to_string(),
            amount: 3
        }
    );
}

#[tokio::test]
async fn test_get_sends_envelope_as_query() {
    let port = start().await;
    let client = signed_client(client_config(port));

    let order: Order = client.get("/orders/o-9", &new_order()).await.unwrap();
    assert_eq!(order.id, "o-9");
    assert_eq!(order.name, "allen");
    assert_eq!(order.amount, 3);
}

#[tokio::test]
async fn test_put_and_delete() {
    let port = start().await;
    let client = signed_client(client_config(port));

    let order: Order = client.put("/orders/o-9", &new_order()).await.unwrap();
    assert_eq!(order.id, "o-9");

    // 空のレスポンスはnullとして包まれ、デフォルト値になる
    let deleted: Option<Order> = client.delete("/orders/o-9", &json!({})).await.unwrap();
    assert_eq!(deleted, None);
}

#[tokio::test]
async fn test_scalar_biz_content_and_primitive_result() {
    let port = start().await;
    let client = signed_client(client_config(port));

    let greeting: String = client.post("/greet", "allen").await.unwrap();
    assert_eq!(greeting, "hello allen");
}

#[tokio::test]
async fn test_form_request_format() {
    let port = start().await;
    let mut config = client_config(port);
    config.request_format = RequestFormat::Form;
    let client = signed_client(config);

    let fields: HashMap<String, String> = client.post("/form", &new_order()).await.unwrap();
    assert_eq!(fields.get("name").map(String::as_str), Some("allen"));
    assert_eq!(fields.get("amount").map(String::as_str), Some("3"));
}

#[tokio::test]
async fn test_alternate_sign_type_and_charset() {
    let port = start().await;
    let mut config = client_config(port);
    config.sign_type = Some(SignType::Rs384);
    config.charset = Charset::Latin1;
    let client = signed_client(config);

    let order: Order = client
        .post(
            "/orders",
            &NewOrder {
                name: "Café".to_string(),
                amount: 1,
            },
        )
        .await
        .unwrap();
    assert_eq!(order.name, "Café");
}

#[tokio::test]
async fn test_selective_field_encryption_around_call() {
    let port = start().await;
    let client = signed_client(client_config(port));
    let crypto = SelectiveFieldCrypto::new(Arc::new(AesGcmFieldCipher::new([5u8; 32])), Charset::Utf8);

    let original = Customer {
        name: "allen".to_string(),
        phone: "13800000000".to_string(),
        emails: vec!["a@example.com".to_string()],
    };
    let mut outgoing = original.clone();
    crypto.encrypt(&mut outgoing).unwrap();

    let mut echoed: Customer = client.post("/echo", &outgoing).await.unwrap();
    // サーバーは暗号文のまま受け取って返す
    assert_eq!(echoed.name, "allen");
    assert_ne!(echoed.phone, original.phone);

    crypto.decrypt(&mut echoed).unwrap();
    assert_eq!(echoed, original);
}

#[tokio::test]
async fn test_handler_status_does_not_hide_result() {
    let port = start().await;
    let client = signed_client(client_config(port));

    // ハンドラが409を返しても、包まれたレスポンスは200で結果を運ぶ
    let order: Order = client.post("/reserve", &new_order()).await.unwrap();
    assert_eq!(order.id, "o-7");
    assert_eq!(order.name, "held");
}

// ---------------------------------------------------------------------------
// 異常系
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_remote_authorization_error() {
    let port = start().await;
    let client = signed_client(client_config(port));

    let err = client
        .post::<serde_json::Value, _>("/admin", &json!({}))
        .await
        .unwrap_err();
    match err {
        ClientError::Remote { status, code, .. } => {
            assert_eq!(status, 403);
            assert_eq!(code, "AUTHORIZATION_DENIED");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_stale_timestamp_via_extra_keys() {
    let port = start().await;
    let client = signed_client(client_config(port));

    let mut extra = Envelope::new();
    extra.insert(keys::TIMESTAMP, 1u64);
    let err = client
        .execute::<Order, _>(Method::POST, "/orders", &new_order(), extra)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, ClientError::Remote { status: 400, code, .. } if code == "INVALID_TIMESTAMP"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_unsigned_client_gets_missing_signature() {
    let port = start().await;
    let client = EnvelopeClient::new(client_config(port)).unwrap();

    let err = client.post::<Order, _>("/orders", &new_order()).await.unwrap_err();
    assert!(
        matches!(&err, ClientError::Remote { status: 400, code, .. } if code == "MISSING_SIGNATURE"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_wrong_platform_key_rejects_response() {
    let port = start().await;
    // プラットフォーム公開鍵の代わりに自分の公開鍵を設定
    let client = EnvelopeClient::new(client_config(port))
        .unwrap()
        .with_keys(&RsaSuite, &partner_keys().1, &partner_keys().0)
        .unwrap();

    let err = client.post::<Order, _>("/orders", &new_order()).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidSignature(_)), "unexpected error: {err:?}");
    assert!(!err.is_remote());
}

#[tokio::test]
async fn test_transport_error_is_local() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = signed_client(client_config(port));
    let err = client.post::<Order, _>("/orders", &new_order()).await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "unexpected error: {err:?}");
}

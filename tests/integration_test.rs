//! Integration tests for registered routes, authentication and rate limiting.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceExt;
use utoipa::ToSchema;

use restwire::api::{RequestContext, RouteConfig};
use restwire::app::{Config, Server};
use restwire::domain::{ApiError, Claims, Empty, MessageResponse};

const SECRET: &str = "integration-secret";

#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
struct Product {
    id: i64,
    name: String,
    price: i64,
}

async fn hello(_ctx: RequestContext, _req: Empty) -> Result<MessageResponse, ApiError> {
    Ok(MessageResponse::new("Hello, World!"))
}

async fn create_product(_ctx: RequestContext, req: Product) -> Result<MessageResponse, ApiError> {
    Ok(MessageResponse::new(format!(
        "New product created: {}",
        req.id
    )))
}

async fn restricted(ctx: RequestContext, _req: Empty) -> Result<MessageResponse, ApiError> {
    let principal = ctx.principal()?;
    Ok(MessageResponse::new(format!("UserID: {}", principal.user_id)))
}

fn config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([("RESTWIRE_JWT_SECRET", SECRET)]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

fn token(sub: &str, super_admin: bool) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        sid: "session-1".to_string(),
        adm: super_admin,
        exp: None,
        iat: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn create_test_router() -> Router {
    let mut server = Server::new(config()).unwrap();
    server
        .add(Method::GET, "/hello", hello, RouteConfig::new())
        .unwrap()
        .add(Method::POST, "/product", create_product, RouteConfig::new())
        .unwrap()
        .add(
            Method::GET,
            "/restricted",
            restricted,
            RouteConfig::new().authenticated(),
        )
        .unwrap()
        .add(
            Method::GET,
            "/admin",
            restricted,
            RouteConfig::new().super_admin(),
        )
        .unwrap()
        .add(
            Method::GET,
            "/limited",
            hello,
            RouteConfig::new().rate_limit(2, Duration::from_millis(300)),
        )
        .unwrap();
    server.router()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body_bytes).unwrap()
}

#[tokio::test]
async fn test_hello() {
    let response = create_test_router().oneshot(get("/hello")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"message": "Hello, World!"}));
}

#[tokio::test]
async fn test_json_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/product")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({"id": 73, "name": "Product 73", "price": 35}).to_string(),
        ))
        .unwrap();

    let response = create_test_router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({"message": "New product created: 73"})
    );
}

#[tokio::test]
async fn test_malformed_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/product")
        .header("Content-Type", "application/json")
        .body(Body::from(r#"{"id": 73, "name": "#))
        .unwrap();

    let response = create_test_router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(read_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_not_found() {
    let response = create_test_router()
        .oneshot(get("/not-found"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await, json!({"error": "Not Found"}));
}

#[tokio::test]
async fn test_restricted_without_token() {
    let response = create_test_router()
        .oneshot(get("/restricted"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        read_json(response).await,
        json!({"error": "No access token provided"})
    );
}

#[tokio::test]
async fn test_restricted_with_invalid_token() {
    let response = create_test_router()
        .oneshot(get_with_token("/restricted", "not.a.jwt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await, json!({"error": "Unauthenticated"}));
}

#[tokio::test]
async fn test_restricted_with_token() {
    let response = create_test_router()
        .oneshot(get_with_token("/restricted", &token("john", false)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"message": "UserID: john"}));
}

#[tokio::test]
async fn test_super_admin() {
    let router = create_test_router();

    let response = router
        .clone()
        .oneshot(get_with_token("/admin", &token("john", false)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await, json!({"error": "Permission denied"}));

    let response = router
        .oneshot(get_with_token("/admin", &token("root", true)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"message": "UserID: root"}));
}

#[tokio::test]
async fn test_rate_limit_denies_then_readmits() {
    let router = create_test_router();

    for _ in 0..2 {
        let response = router.clone().oneshot(get("/limited")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("X-RateLimit-Limit").unwrap(), "2");
    }

    let response = router.clone().oneshot(get("/limited")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(read_json(response).await, json!({"error": "Too many requests"}));

    tokio::time::sleep(Duration::from_millis(350)).await;

    let response = router.oneshot(get("/limited")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_is_per_client() {
    let router = create_test_router();

    let from = |ip: &str| {
        Request::builder()
            .uri("/limited")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        router.clone().oneshot(from("203.0.113.1")).await.unwrap();
    }
    let response = router.clone().oneshot(from("203.0.113.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = router.oneshot(from("203.0.113.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_forwarded_for_shares_bucket_when_untrusted() {
    let config = Config {
        trust_proxy_headers: false,
        ..config()
    };
    let mut server = Server::new(config).unwrap();
    server
        .add(
            Method::GET,
            "/limited",
            hello,
            RouteConfig::new().rate_limit(2, Duration::from_secs(10)),
        )
        .unwrap();
    let router = server.router();

    let from = |ip: &str| {
        Request::builder()
            .uri("/limited")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    for ip in ["203.0.113.1", "203.0.113.2"] {
        let response = router.clone().oneshot(from(ip)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = router.oneshot(from("203.0.113.3")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

//! Demo server: a rate-limited greeting and a JSON body route.

use std::time::Duration;

use anyhow::Result;
use axum::http::Method;
use dotenvy::dotenv;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

use restwire::api::{RequestContext, RouteConfig};
use restwire::app::{Config, Server};
use restwire::domain::{ApiError, Empty, MessageResponse};
use restwire::infra::observability::init_tracing;

#[derive(Debug, Deserialize, ToSchema)]
struct Product {
    id: i64,
    name: String,
    price: i64,
}

async fn say_hello(_ctx: RequestContext, _req: Empty) -> Result<MessageResponse, ApiError> {
    Ok(MessageResponse::new("Hello, World!"))
}

async fn create_product(_ctx: RequestContext, req: Product) -> Result<MessageResponse, ApiError> {
    info!(id = req.id, name = %req.name, price = req.price, "Product created");
    Ok(MessageResponse::new(format!(
        "New product created: {}",
        req.id
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let json_logs = std::env::var("RESTWIRE_LOG_JSON").is_ok_and(|v| v == "true" || v == "1");
    init_tracing("info,tower_http=info", json_logs);

    let config = Config::from_env()?;
    let mut server = Server::new(config)?;

    server
        .add(
            Method::GET,
            "/hello",
            say_hello,
            RouteConfig::new()
                .summary("Say hello")
                .description("Say hello to the world")
                .tag("Greeting")
                .rate_limit(3, Duration::from_secs(10)),
        )?
        .add(
            Method::POST,
            "/product",
            create_product,
            RouteConfig::new().summary("Create product").tag("Product"),
        )?;

    server.start().await?;
    Ok(())
}

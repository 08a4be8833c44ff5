//! Built-in endpoints and the centralized error response.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde_json::Value;
use tracing::error;

use crate::domain::{ApiError, ErrorBody, StatusResponse};

/// Rendered documentation served by `/docs` and `/openapi.json`.
pub struct DocsState {
    pub html: String,
    pub openapi: Value,
}

impl DocsState {
    pub fn new(title: &str, openapi: Value) -> Self {
        Self {
            html: swagger_page(title),
            openapi,
        }
    }
}

/// Liveness probe.
pub async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

/// Swagger UI page.
pub async fn docs_handler(State(docs): State<Arc<DocsState>>) -> Html<String> {
    Html(docs.html.clone())
}

/// The generated OpenAPI document.
pub async fn openapi_handler(State(docs): State<Arc<DocsState>>) -> Json<Value> {
    Json(docs.openapi.clone())
}

/// Fallback for unknown paths.
pub async fn not_found_handler() -> ApiError {
    ApiError::not_found()
}

/// Fallback for a known path hit with an unregistered method.
pub async fn method_not_allowed_handler() -> ApiError {
    ApiError::MethodNotAllowed("Method Not Allowed".to_string())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = ErrorBody {
            error: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

fn swagger_page(title: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <meta name="description" content="SwaggerUI" />
    <title>{title}</title>
    <link
      rel="stylesheet"
      href="https://unpkg.com/swagger-ui-dist@5.11.0/swagger-ui.css"
    />
  </head>
  <body>
    <div id="swagger-ui"></div>
    <script
      src="https://unpkg.com/swagger-ui-dist@5.11.0/swagger-ui-bundle.js"
      crossorigin
    ></script>
    <script>
      window.onload = () => {{
        window.ui = SwaggerUIBundle({{
          url: "./openapi.json",
          dom_id: "#swagger-ui",
        }});
      }};
    </script>
  </body>
</html>"##,
        title = escape_html(title)
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

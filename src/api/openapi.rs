//! Incremental OpenAPI document built from registered routes.

use std::collections::BTreeMap;

use axum::http::Method;
use serde_json::Value;
use utoipa::openapi::{
    Components, ContentBuilder, InfoBuilder, OpenApi, OpenApiBuilder, Ref, RefOr, Required, Schema,
    Server,
    path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn, PathItem},
    request_body::RequestBodyBuilder,
    response::{Response, ResponseBuilder},
    schema::{ObjectBuilder, Type},
    security::{HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme},
};
use utoipa::{PartialSchema, ToSchema};

use super::registrar::RouteConfig;
use crate::app::ApiInfo;
use crate::domain::ErrorBody;

/// Security scheme name required by authenticated operations.
pub const BEARER_SCHEME: &str = "Bearer token";

/// Rewrites `:name` placeholders as `{name}`; `{name}` is kept as is.
pub fn format_openapi_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Placeholder names of a normalized path, in order.
pub fn path_params(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
                .map(|name| name.trim_start_matches('*').to_string())
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Strips module paths from a schema name, so `app::model::Product` and
/// `Page<app::model::Product>` become `Product` and `Page_Product`.
pub fn schema_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut ident = String::new();

    for c in raw.chars() {
        match c {
            ':' => ident.clear(),
            '<' | '>' | ',' | ' ' => {
                out.push_str(&ident);
                ident.clear();
                if c != '>' && !out.ends_with('_') {
                    out.push('_');
                }
            }
            _ => ident.push(c),
        }
    }
    out.push_str(&ident);
    out.trim_end_matches('_').to_string()
}

fn http_method(method: &Method) -> Option<HttpMethod> {
    match *method {
        Method::GET => Some(HttpMethod::Get),
        Method::POST => Some(HttpMethod::Post),
        Method::PUT => Some(HttpMethod::Put),
        Method::DELETE => Some(HttpMethod::Delete),
        Method::PATCH => Some(HttpMethod::Patch),
        Method::HEAD => Some(HttpMethod::Head),
        Method::OPTIONS => Some(HttpMethod::Options),
        Method::TRACE => Some(HttpMethod::Trace),
        _ => None,
    }
}

fn uses_query(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
}

fn operation_id(method: &Method, path: &str) -> String {
    let mut id = method.as_str().to_lowercase();
    for part in path.split('/').filter(|s| !s.is_empty()) {
        id.push('_');
        id.extend(
            part.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_'),
        );
    }
    id
}

fn error_response(description: &str) -> Response {
    ResponseBuilder::new()
        .description(description)
        .content(
            "application/json",
            ContentBuilder::new()
                .schema(Some(Ref::from_schema_name("ErrorBody")))
                .build(),
        )
        .build()
}

/// Accumulates one operation per registered route.
pub struct DocumentBuilder {
    doc: OpenApi,
}

impl DocumentBuilder {
    pub fn new(info: &ApiInfo, server_url: &str) -> Self {
        let mut components = Components::new();
        components.add_security_scheme(
            BEARER_SCHEME,
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components
            .schemas
            .insert("ErrorBody".to_string(), ErrorBody::schema());

        let info = InfoBuilder::new()
            .title(info.title.clone())
            .description(Some(info.description.clone()))
            .version(info.version.clone())
            .build();

        let doc = OpenApiBuilder::new()
            .info(info)
            .servers(Some(vec![Server::new(server_url)]))
            .components(Some(components))
            .build();

        Self { doc }
    }

    /// Records the operation for `method path`, deriving parameters, body
    /// and response from `I` and `O`. `path` must already be normalized.
    pub fn add_operation<I: ToSchema, O: ToSchema>(
        &mut self,
        method: &Method,
        path: &str,
        config: &RouteConfig,
    ) {
        let Some(http_method) = http_method(method) else {
            return;
        };

        self.register_referenced::<I>();
        let output_name = self.register::<O>();
        let (properties, required) = object_fields(&I::schema());

        let placeholders = path_params(path);
        let mut parameters = Vec::new();
        for name in &placeholders {
            let schema = properties
                .get(name)
                .cloned()
                .unwrap_or_else(|| {
                    RefOr::T(Schema::Object(
                        ObjectBuilder::new().schema_type(Type::String).build(),
                    ))
                });
            parameters.push(
                ParameterBuilder::new()
                    .name(name.clone())
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .schema(Some(schema))
                    .build(),
            );
        }

        let remaining: Vec<_> = properties
            .iter()
            .filter(|(name, _)| !placeholders.contains(*name))
            .collect();

        let mut operation = OperationBuilder::new()
            .operation_id(Some(operation_id(method, path)))
            .summary(config.summary.clone())
            .description(config.description.clone())
            .tags((!config.tags.is_empty()).then(|| config.tags.clone()));

        if uses_query(method) {
            for (name, schema) in &remaining {
                let required = if required.contains(*name) {
                    Required::True
                } else {
                    Required::False
                };
                parameters.push(
                    ParameterBuilder::new()
                        .name((*name).clone())
                        .parameter_in(ParameterIn::Query)
                        .required(required)
                        .schema(Some((*schema).clone()))
                        .build(),
                );
            }
        } else if !remaining.is_empty() || (properties.is_empty() && !is_empty_object(&I::schema()))
        {
            let input_name = self.register::<I>();
            operation = operation.request_body(Some(
                RequestBodyBuilder::new()
                    .content(
                        "application/json",
                        ContentBuilder::new()
                            .schema(Some(Ref::from_schema_name(input_name)))
                            .build(),
                    )
                    .required(Some(Required::True))
                    .build(),
            ));
        }

        if !parameters.is_empty() {
            operation = operation.parameters(Some(parameters));
        }

        operation = operation.response(
            "200",
            ResponseBuilder::new()
                .description("OK")
                .content(
                    "application/json",
                    ContentBuilder::new()
                        .schema(Some(Ref::from_schema_name(output_name)))
                        .build(),
                )
                .build(),
        );

        if !properties.is_empty() || !placeholders.is_empty() {
            operation = operation.response("400", error_response("Bad Request"));
        }
        if config.access.requires_token() {
            operation = operation
                .response("401", error_response("Unauthenticated"))
                .security(SecurityRequirement::new(BEARER_SCHEME, Vec::<String>::new()));
        }
        if config.access.requires_super_admin() {
            operation = operation.response("403", error_response("Permission denied"));
        }
        if config.rate_limit.is_some() {
            operation = operation.response("429", error_response("Too many requests"));
        }
        operation = operation.response("500", error_response("Internal Server Error"));

        let item = PathItem::new(http_method, operation.build());
        match self.doc.paths.paths.get_mut(path) {
            Some(existing) => existing.merge_operations(item),
            None => {
                self.doc.paths.paths.insert(path.to_string(), item);
            }
        }
    }

    /// Adds `T` and every schema it references; returns the bare name.
    fn register<T: ToSchema>(&mut self) -> String {
        self.register_referenced::<T>();
        let name = schema_name(&T::name());
        self.insert_schemas(vec![(name.clone(), T::schema())]);
        name
    }

    /// Adds only the schemas `T` references, for inputs spread into
    /// parameters.
    fn register_referenced<T: ToSchema>(&mut self) {
        let mut collected = Vec::new();
        T::schemas(&mut collected);
        self.insert_schemas(collected);
    }

    fn insert_schemas(&mut self, collected: Vec<(String, RefOr<Schema>)>) {
        let schemas = &mut self
            .doc
            .components
            .get_or_insert_with(Components::new)
            .schemas;
        for (raw, schema) in collected {
            schemas.entry(schema_name(&raw)).or_insert(schema);
        }
    }

    pub fn document(&self) -> &OpenApi {
        &self.doc
    }

    /// Serialized form served at `/openapi.json`.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.doc)
    }
}

fn object_fields(schema: &RefOr<Schema>) -> (BTreeMap<String, RefOr<Schema>>, Vec<String>) {
    match schema {
        RefOr::T(Schema::Object(object)) => (
            object
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            object.required.clone(),
        ),
        _ => (BTreeMap::new(), Vec::new()),
    }
}

fn is_empty_object(schema: &RefOr<Schema>) -> bool {
    matches!(schema, RefOr::T(Schema::Object(object)) if object.properties.is_empty())
}

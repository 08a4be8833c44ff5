//! Binds path params, query params and the JSON body into one input value.
//!
//! Sources are merged into a single JSON object in order: path params, then
//! query params (GET, HEAD and DELETE only), then the body. Later sources
//! override earlier ones. Path and query values arrive as strings and are
//! coerced when the target field is a number or a bool.

use axum::extract::Query;
use axum::http::{HeaderMap, Method, Uri, header};
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::{Map, Value};

use crate::domain::ApiError;

/// Raw request parts the binder reads from.
pub struct BindSource<'a> {
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    pub path_params: Vec<(String, String)>,
    pub uri: &'a Uri,
    pub body: &'a [u8],
}

/// Decodes `T` from the request.
///
/// # Errors
/// `ApiError::UnsupportedMediaType` for a non-JSON body,
/// `ApiError::BadRequest` for malformed input.
pub fn bind<T: DeserializeOwned>(source: BindSource<'_>) -> Result<T, ApiError> {
    let mut fields = Map::new();

    for (name, value) in source.path_params {
        fields.insert(name, Value::String(value));
    }

    if binds_query(source.method) && source.uri.query().is_some() {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(source.uri)
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        for (name, value) in pairs {
            fields.insert(name, Value::String(value));
        }
    }

    if !source.body.is_empty() {
        if !is_json(source.headers) {
            return Err(ApiError::UnsupportedMediaType(
                "Unsupported Media Type".to_string(),
            ));
        }

        match serde_json::from_slice::<Value>(source.body)? {
            Value::Object(body) => fields.extend(body),
            other if fields.is_empty() => return Ok(serde_json::from_value(other)?),
            _ => {
                return Err(ApiError::BadRequest(
                    "Request body must be a JSON object".to_string(),
                ));
            }
        }
    }

    let deserializer = de::value::MapDeserializer::<_, serde_json::Error>::new(
        fields.into_iter().map(|(k, v)| (k, Lenient(v))),
    );
    T::deserialize(deserializer).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn binds_query(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::DELETE)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/json")
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

/// A JSON value that also accepts numbers and bools spelled as strings.
struct Lenient(Value);

impl<'de> IntoDeserializer<'de, serde_json::Error> for Lenient {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! coerce_from_str {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                match self.0 {
                    Value::String(s) => match s.trim().parse::<$ty>() {
                        Ok(parsed) => visitor.$visit(parsed),
                        Err(_) => Err(<Self::Error as de::Error>::invalid_value(
                            de::Unexpected::Str(&s),
                            &visitor,
                        )),
                    },
                    other => other.$method(visitor),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Lenient {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_any(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.0 {
            Value::Null => visitor.visit_none(),
            other => visitor.visit_some(Lenient(other)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_str(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_string(visitor)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.0.deserialize_map(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_struct(name, fields, visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.0.deserialize_enum(name, variants, visitor)
    }

    coerce_from_str! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    forward_to_deserialize_any! {
        char bytes byte_buf unit unit_struct tuple tuple_struct identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Product {
        id: u32,
        name: String,
        #[serde(default)]
        price: Option<i64>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Lookup {
        id: String,
        verbose: bool,
        #[serde(default)]
        page: Option<u32>,
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers
    }

    #[test]
    fn test_binds_json_body() {
        let headers = json_headers();
        let product: Product = bind(BindSource {
            method: &Method::POST,
            headers: &headers,
            path_params: vec![],
            uri: &Uri::from_static("/"),
            body: br#"{"id": 73, "name": "Product 73", "price": 35}"#,
        })
        .unwrap();

        assert_eq!(
            product,
            Product {
                id: 73,
                name: "Product 73".to_string(),
                price: Some(35),
            }
        );
    }

    #[test]
    fn test_coerces_path_and_query_strings() {
        let headers = HeaderMap::new();
        let lookup: Lookup = bind(BindSource {
            method: &Method::GET,
            headers: &headers,
            path_params: vec![("id".to_string(), "42".to_string())],
            uri: &Uri::from_static("/lookup?verbose=true&page=3"),
            body: b"",
        })
        .unwrap();

        assert_eq!(
            lookup,
            Lookup {
                id: "42".to_string(),
                verbose: true,
                page: Some(3),
            }
        );
    }

    #[test]
    fn test_body_overrides_path_param() {
        let headers = json_headers();
        let product: Product = bind(BindSource {
            method: &Method::PUT,
            headers: &headers,
            path_params: vec![("id".to_string(), "1".to_string())],
            uri: &Uri::from_static("/"),
            body: br#"{"id": 2, "name": "Two"}"#,
        })
        .unwrap();

        assert_eq!(product.id, 2);
    }

    #[test]
    fn test_query_ignored_for_post() {
        let headers = json_headers();
        let product: Product = bind(BindSource {
            method: &Method::POST,
            headers: &headers,
            path_params: vec![],
            uri: &Uri::from_static("/products?price=99"),
            body: br#"{"id": 1, "name": "One"}"#,
        })
        .unwrap();

        assert_eq!(product.price, None);
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let headers = json_headers();
        let result: Result<Product, _> = bind(BindSource {
            method: &Method::POST,
            headers: &headers,
            path_params: vec![],
            uri: &Uri::from_static("/"),
            body: br#"{"id": 73,"#,
        });

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_wrong_field_type_is_bad_request() {
        let headers = json_headers();
        let result: Result<Product, _> = bind(BindSource {
            method: &Method::POST,
            headers: &headers,
            path_params: vec![],
            uri: &Uri::from_static("/"),
            body: br#"{"id": "seventy", "name": "x"}"#,
        });

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_non_json_body_is_unsupported() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        let result: Result<Product, _> = bind(BindSource {
            method: &Method::POST,
            headers: &headers,
            path_params: vec![],
            uri: &Uri::from_static("/"),
            body: b"id=1",
        });

        assert!(matches!(result, Err(ApiError::UnsupportedMediaType(_))));
    }

    #[test]
    fn test_query_values_are_decoded() {
        #[derive(Debug, Deserialize)]
        struct Search {
            q: String,
            x: String,
        }

        let headers = HeaderMap::new();
        let search: Search = bind(BindSource {
            method: &Method::GET,
            headers: &headers,
            path_params: vec![],
            uri: &Uri::from_static("/search?q=hello%20world&x=a+b"),
            body: b"",
        })
        .unwrap();

        assert_eq!(search.q, "hello world");
        assert_eq!(search.x, "a b");
    }

    #[test]
    fn test_repeated_query_key_keeps_last() {
        let headers = HeaderMap::new();
        let lookup: Lookup = bind(BindSource {
            method: &Method::DELETE,
            headers: &headers,
            path_params: vec![("id".to_string(), "9".to_string())],
            uri: &Uri::from_static("/lookup/9?verbose=false&verbose=true"),
            body: b"",
        })
        .unwrap();

        assert!(lookup.verbose);
    }
}

//! Incoming HTTP request type.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, FieldError};

/// An incoming HTTP request with its body fully read.
pub struct Request {
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(uri: &http::Uri, body: Bytes, params: HashMap<String, String>) -> Self {
        Self {
            path: uri.path().to_owned(),
            query: uri.query().map(str::to_owned),
            body,
            params,
        }
    }

    pub fn path(&self) -> &str { &self.path }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Returns a named path parameter, percent-decoded.
    ///
    /// For a route `/dbusers/{id}`, `req.param("id")` on `/dbusers/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses a path parameter into `T`.
    ///
    /// A value that does not parse is a validation failure (`422`), the same
    /// as a malformed body.
    pub fn param_as<T: FromStr>(&self, key: &str) -> Result<T, ApiError> {
        let raw = self.param(key).unwrap_or_default();
        raw.parse().map_err(|_| {
            ApiError::InvalidInput(vec![FieldError::new(
                ["path", key],
                format!("invalid value `{raw}` for path parameter `{key}`"),
                "parsing",
            )])
        })
    }

    /// Returns the first value of a query-string parameter, decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Deserializes the body as JSON into `T`.
    ///
    /// This is the validation layer: a syntax error, a missing field or a
    /// wrongly typed field is rejected with `422` before any handler logic
    /// runs.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            use serde_json::error::Category;

            // serde_json reports a missing field only through its message
            // text. Should that wording change, the field is still rejected,
            // just reported as `value_error`.
            let kind = match e.classify() {
                Category::Data if is_missing_field(&e) => "missing",
                Category::Data => "value_error",
                Category::Syntax | Category::Eof | Category::Io => "json_invalid",
            };
            ApiError::InvalidInput(vec![FieldError::new(["body"], e.to_string(), kind)])
        })
    }
}

fn is_missing_field(e: &serde_json::Error) -> bool {
    e.to_string().starts_with("missing field")
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    fn request(uri: &str, body: &str) -> Request {
        let uri: http::Uri = uri.parse().unwrap();
        let params = HashMap::from([("id".to_owned(), "7".to_owned())]);
        Request::new(&uri, Bytes::from(body.to_owned()), params)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
        price: f64,
    }

    #[test]
    fn query_parameters_are_decoded() {
        let req = request("/greet?name=Ada%20Lovelace&x=1", "");
        assert_eq!(req.query("name").as_deref(), Some("Ada Lovelace"));
        assert_eq!(req.query("missing"), None);
        assert_eq!(req.path(), "/greet");
    }

    #[test]
    fn json_body_is_validated() {
        let req = request("/items/", r#"{"name":"Foo","price":50.0}"#);
        assert_eq!(req.json::<Item>().unwrap(), Item { name: "Foo".into(), price: 50.0 });

        let req = request("/items/", r#"{"name":"Foo"}"#);
        match req.json::<Item>() {
            Err(ApiError::InvalidInput(errors)) => assert_eq!(errors[0].kind, "missing"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let req = request("/items/", r#"{"name":"Foo","price":"cheap"}"#);
        match req.json::<Item>() {
            Err(ApiError::InvalidInput(errors)) => assert_eq!(errors[0].kind, "value_error"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let req = request("/items/", "{not json");
        match req.json::<Item>() {
            Err(ApiError::InvalidInput(errors)) => assert_eq!(errors[0].kind, "json_invalid"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn typed_path_parameters() {
        let req = request("/items/7", "");
        assert_eq!(req.param_as::<i64>("id").unwrap(), 7);
        assert!(matches!(req.param_as::<i64>("nope"), Err(ApiError::InvalidInput(_))));
    }
}

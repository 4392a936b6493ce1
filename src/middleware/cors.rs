//! Cross-origin resource sharing against a fixed allow-list.
//!
//! Credentials are allowed, so an allowed origin is echoed back instead of
//! `*`. Requests from other origins are served without CORS headers, which
//! the browser then refuses to expose.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use http::{HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

const MAX_AGE: Duration = Duration::from_secs(600);

/// Builds the CORS layer for exactly the given origins (scheme, host and
/// port, no trailing slash).
pub fn cors_layer<I>(origins: I) -> Result<CorsLayer>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut allowed = Vec::new();
    for origin in origins {
        let origin = origin.as_ref();
        if origin == "*" {
            bail!("wildcard origin cannot be combined with credentials");
        }
        allowed.push(HeaderValue::from_str(origin).with_context(|| format!("invalid origin `{origin}`"))?);
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([
            Method::DELETE,
            Method::GET,
            Method::HEAD,
            Method::OPTIONS,
            Method::PATCH,
            Method::POST,
            Method::PUT,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .max_age(MAX_AGE))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use http::header::{ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN};
    use http_body_util::Full;
    use tower::{ServiceBuilder, ServiceExt};

    use super::*;

    async fn send(req: http::Request<Full<Bytes>>) -> http::Response<Full<Bytes>> {
        let layer = cors_layer(["http://localhost:3000", "https://malcmind.com"]).unwrap();
        ServiceBuilder::new()
            .layer(layer)
            .service_fn(|_req: http::Request<Full<Bytes>>| async {
                Ok::<_, Infallible>(http::Response::new(Full::new(Bytes::from_static(b"hi"))))
            })
            .oneshot(req)
            .await
            .unwrap()
    }

    fn preflight(origin: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method("OPTIONS")
            .uri("/api/update-blog-content/1")
            .header(ORIGIN, origin)
            .header(ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
            .header(ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Full::default())
            .unwrap()
    }

    fn get(origin: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .uri("/")
            .header(ORIGIN, origin)
            .body(Full::default())
            .unwrap()
    }

    fn header<'a>(res: &'a http::Response<Full<Bytes>>, name: &str) -> Option<&'a str> {
        res.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn preflight_from_allowed_origin() {
        let res = send(preflight("https://malcmind.com")).await;
        assert_eq!(res.status(), http::StatusCode::OK);
        assert_eq!(header(&res, "access-control-allow-origin"), Some("https://malcmind.com"));
        assert_eq!(header(&res, "access-control-allow-credentials"), Some("true"));
        assert_eq!(header(&res, "access-control-allow-headers"), Some("content-type"));
        assert_eq!(header(&res, "access-control-max-age"), Some("600"));
        assert!(header(&res, "access-control-allow-methods").is_some_and(|m| m.contains("PATCH")));
    }

    #[tokio::test]
    async fn preflight_from_unknown_origin_gets_no_grant() {
        let res = send(preflight("https://evil.example")).await;
        assert_eq!(header(&res, "access-control-allow-origin"), None);
    }

    #[tokio::test]
    async fn simple_responses_are_decorated_only_for_allowed_origins() {
        let res = send(get("http://localhost:3000")).await;
        assert_eq!(header(&res, "access-control-allow-origin"), Some("http://localhost:3000"));
        assert!(res.headers().get_all("vary").iter().any(|v| v.to_str().is_ok_and(|v| v.contains("origin"))));

        let res = send(get("http://localhost:3001")).await;
        assert_eq!(header(&res, "access-control-allow-origin"), None);
    }

    #[test]
    fn wildcard_and_malformed_origins_are_rejected() {
        assert!(cors_layer(["*"]).is_err());
        assert!(cors_layer(["http://bad\norigin"]).is_err());
        assert!(cors_layer(Vec::<String>::new()).is_ok());
    }
}

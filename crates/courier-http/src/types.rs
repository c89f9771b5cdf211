use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;

/// Response headers keyed by lowercase name. A header sent more than once
/// keeps every value in arrival order.
pub type Headers = BTreeMap<String, Vec<String>>;

/// An outgoing HTTP request.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
    /// Per-request timeout; overrides the client default when set.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A received HTTP response, whatever its status.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
    pub elapsed: Duration,
    /// Final URL after redirects.
    pub url: String,
}

impl Response {
    /// First value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        first_value(&self.headers, name)
    }

    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Lossy UTF-8 view of the body.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub(crate) fn first_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|values| values.first())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_fields() {
        let request = Request::post("http://example.test/items")
            .header("content-type", "application/json")
            .body(r#"{"id":1}"#)
            .timeout(Duration::from_secs(3));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "http://example.test/items");
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(request.body.as_deref(), Some(br#"{"id":1}"#.as_slice()));
        assert_eq!(request.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn response_body_text_is_lossy() {
        let response = Response {
            status: 200,
            headers: Headers::new(),
            body: Bytes::from_static(b"ok \xff"),
            elapsed: Duration::ZERO,
            url: "http://example.test".to_string(),
        };
        assert_eq!(response.body_text(), "ok \u{fffd}");
        assert_eq!(&response.body[..], b"ok \xff");
        assert!(response.is_success());
    }

    #[test]
    fn repeated_header_keeps_every_value() {
        let response = Response {
            status: 200,
            headers: Headers::from([(
                "set-cookie".to_string(),
                vec!["a=1".to_string(), "b=2".to_string()],
            )]),
            body: Bytes::new(),
            elapsed: Duration::ZERO,
            url: "http://example.test".to_string(),
        };
        assert_eq!(response.header("set-cookie"), Some("a=1"));
        assert_eq!(response.header_values("set-cookie"), ["a=1", "b=2"]);
        assert!(response.header_values("etag").is_empty());
        assert_eq!(response.header("etag"), None);
    }
}

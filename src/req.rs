use std::time::Duration;

use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    StatusCode,
};

use crate::error::{AcmeError, Result};

pub(crate) const CONTENT_TYPE_JOSE: &str = "application/jose+json";
pub(crate) const CONTENT_TYPE_PROBLEM: &str = "application/problem+json";

/// Cap on response bodies; directory documents and problem responses are
/// tiny, certificates a few KiB.
const RESPONSE_LIMIT: usize = 1024 * 1024;

/// A fully read HTTP response.
///
/// The transport materializes status, headers and the (size-capped) body
/// before any pipeline post-processing runs, so callbacks never hold a
/// live connection.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Content type without parameters (`application/json; charset=utf-8`
    /// reads as `application/json`).
    pub fn content_type(&self) -> Option<&str> {
        let value = self.header(CONTENT_TYPE.as_str())?;
        Some(value.split(';').next().unwrap_or(value).trim())
    }
}

/// Parse the response body as JSON, distinguishing "no JSON here" from a
/// malformed body.
///
/// `Ok(None)` means the response carries no JSON (empty body, or a content
/// type that isn't a JSON flavor) and the caller may fall through to raw
/// handling. A parse failure under a JSON content type is an error.
pub(crate) fn json_body(res: &HttpResponse) -> Result<Option<serde_json::Value>> {
    if res.body.is_empty() {
        return Ok(None);
    }

    match res.content_type() {
        Some(essence) if essence == "application/json" || essence.ends_with("+json") => {
            Ok(Some(serde_json::from_slice(&res.body)?))
        }
        _ => Ok(None),
    }
}

/// HTTP client bound to a user agent and optional proxy.
#[derive(Debug)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(user_agent: &str, proxy_url: Option<&str>) -> Result<HttpClient> {
        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30));

        if let Some(proxy_url) = proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(HttpClient {
            client: builder.build()?,
        })
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(self.client.get(url)).await
    }

    pub async fn head(&self, url: &str) -> Result<HttpResponse> {
        self.send(self.client.head(url)).await
    }

    pub async fn post(&self, url: &str, content_type: &str, body: String) -> Result<HttpResponse> {
        self.send(
            self.client
                .post(url)
                .header(CONTENT_TYPE, content_type)
                .body(body),
        )
        .await
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let mut res = req.send().await?;

        let status = res.status();
        let headers = std::mem::take(res.headers_mut());

        let mut body = Vec::new();
        while let Some(chunk) = res.chunk().await? {
            if body.len() + chunk.len() > RESPONSE_LIMIT {
                return Err(AcmeError::protocol(format!(
                    "response body larger than {RESPONSE_LIMIT} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: Option<&str>, body: &str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, ct.parse().unwrap());
        }
        HttpResponse {
            status: StatusCode::OK,
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn json_body_parses_json_content_types() {
        let res = response(Some("application/json"), r#"{"a":1}"#);
        assert_eq!(json_body(&res).unwrap().unwrap()["a"], 1);

        let res = response(Some("application/problem+json; charset=utf-8"), r#"{}"#);
        assert!(json_body(&res).unwrap().is_some());
    }

    #[test]
    fn json_body_distinguishes_absent_json() {
        // no body at all
        let res = response(Some("application/json"), "");
        assert!(json_body(&res).unwrap().is_none());

        // not a JSON content type
        let res = response(Some("application/octet-stream"), "abc");
        assert!(json_body(&res).unwrap().is_none());

        // no content type
        let res = response(None, "abc");
        assert!(json_body(&res).unwrap().is_none());
    }

    #[test]
    fn json_body_rejects_malformed_json() {
        let res = response(Some("application/json"), "{nope");
        let err = json_body(&res).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Invalid);
    }
}

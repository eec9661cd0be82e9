//! HTTP transport abstraction for testability

use std::fmt;

use async_trait::async_trait;

use crate::config::AuthConfig;
use crate::parameter::{raw_query, Parameter};

/// HTTP verbs used by the Alpaca device API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parameters travel in the query string for GET and in a form body otherwise
    pub fn uses_query(self) -> bool {
        self == HttpMethod::Get
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-built request handed to the transport
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// URL without a query string
    pub url: String,
    pub params: Vec<Parameter>,
    /// Extra request headers, e.g. the image transfer accept headers
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// URL as sent on the wire; GET parameters are appended verbatim
    pub fn full_url(&self) -> String {
        if self.method.uses_query() && !self.params.is_empty() {
            format!("{}?{}", self.url, raw_query(&self.params))
        } else {
            self.url.clone()
        }
    }
}

/// HTTP response from a request
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Response headers with lower-cased names
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpTransport: Send + Sync {
    /// Send one request and return the raw response
    async fn send(&self, request: &HttpRequest) -> crate::Result<HttpResponse>;
}

/// Production HTTP transport using reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
    auth: Option<AuthConfig>,
}

impl ReqwestTransport {
    /// Per-request deadlines belong to the executor, so the client sets none
    pub fn new(decompress: bool, auth: Option<AuthConfig>) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(decompress)
            .build()
            .map_err(|e| crate::ConformError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self { client, auth })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> crate::Result<HttpResponse> {
        let url = request.full_url();
        tracing::debug!("{} {}", request.method, url);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        if !request.method.uses_query() {
            let form: Vec<(&str, &str)> = request.params.iter().map(Parameter::as_pair).collect();
            builder = builder.form(&form);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = builder.send().await.map_err(|e| {
            crate::ConformError::Http(format!("{} {} failed: {}", request.method, url, e))
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let content_type = headers
            .iter()
            .find(|(name, _)| name == "content-type")
            .map(|(_, v)| v.clone());
        let body = response
            .bytes()
            .await
            .map_err(|e| crate::ConformError::Http(format!("Reading response body: {}", e)))?
            .to_vec();

        tracing::debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            url,
            status,
            body.len()
        );
        Ok(HttpResponse {
            status,
            content_type,
            headers,
            body,
        })
    }
}

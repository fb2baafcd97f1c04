//! The HTTP transport: a reqwest client plus the credentials it signs with.
//!
//! A [`Transport`] is immutable once built. Reconnecting means building a new
//! one from the old one's auth, which drops the old connection pool.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, trace};

use chirp_core::{
    AppAuth, BearerToken, ClientConfig, ConfigError, Credentials, Error, HttpError, HttpReply,
    Result, TransportError,
};

use crate::error::classify;
use crate::oauth::OAuthSigner;

/// One API request, described independently of any transport so it can be
/// reissued after a reconnect.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    form: Vec<(String, String)>,
    json: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            json: None,
        }
    }

    /// Add a query parameter.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a query parameter if `value` is present.
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Add a form-encoded body parameter.
    pub fn form(mut self, key: &str, value: impl ToString) -> Self {
        self.form.push((key.to_string(), value.to_string()));
        self
    }

    /// Set a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// The URL without query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The value of a query parameter, if set.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace a query parameter, dropping earlier values for the same key.
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.retain(|(k, _)| k != key);
        self.query(key, value)
    }

    fn signed_params(&self) -> Vec<(String, String)> {
        self.query.iter().chain(&self.form).cloned().collect()
    }
}

/// How a transport authenticates.
#[derive(Debug, Clone)]
enum Auth {
    /// Persistent `Authorization: Bearer` default header.
    Bearer,
    /// A fresh OAuth 1.0a signature per request.
    OAuth1(OAuthSigner),
}

/// A live HTTP session.
#[derive(Debug)]
pub(crate) struct Transport {
    rest: reqwest::Client,
    stream: reqwest::Client,
    headers: HeaderMap,
    auth: Auth,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

const USER_AGENT: &str = concat!("chirp/", env!("CARGO_PKG_VERSION"));

impl Transport {
    /// Build a transport for `credentials`.
    ///
    /// App-context consumer pairs are exchanged for a bearer token here. The
    /// token is kept in the default headers, so [`Transport::rebuild`] never
    /// repeats the exchange.
    #[instrument(skip(credentials, config), fields(mode = %credentials.mode()))]
    pub(crate) async fn connect(credentials: &Credentials, config: &ClientConfig) -> Result<Self> {
        match credentials {
            Credentials::UserContext {
                consumer_key,
                consumer_secret,
                access_token,
                access_token_secret,
            } => {
                let signer = OAuthSigner::new(
                    consumer_key,
                    consumer_secret,
                    access_token,
                    access_token_secret,
                );
                Self::build(config, HeaderMap::new(), Auth::OAuth1(signer))
            }
            Credentials::AppContext(AppAuth::Bearer(token)) => {
                Self::build(config, bearer_headers(token)?, Auth::Bearer)
            }
            Credentials::AppContext(AppAuth::ConsumerPair {
                consumer_key,
                consumer_secret,
            }) => {
                let token = exchange_bearer_token(config, consumer_key, consumer_secret).await?;
                Self::build(config, bearer_headers(&token)?, Auth::Bearer)
            }
        }
    }

    /// Fresh connection pools with the same authentication. No network I/O.
    pub(crate) fn rebuild(&self, config: &ClientConfig) -> Result<Self> {
        Self::build(config, self.headers.clone(), self.auth.clone())
    }

    fn build(config: &ClientConfig, headers: HeaderMap, auth: Auth) -> Result<Self> {
        let rest = http_client(config, headers.clone(), config.timeouts.read())?;
        let stream = http_client(config, headers.clone(), config.timeouts.stream_read())?;
        debug!("Transport ready");
        Ok(Self {
            rest,
            stream,
            headers,
            auth,
        })
    }

    /// Issue a request and read the whole body.
    pub(crate) async fn execute(
        &self,
        request: &ApiRequest,
        timestamp: i64,
    ) -> std::result::Result<Reply, TransportError> {
        let response = self.send(&self.rest, request, timestamp).await?;
        Reply::read(response).await
    }

    /// Issue a request and hand back the unread response for streaming.
    pub(crate) async fn open_stream(
        &self,
        request: &ApiRequest,
        timestamp: i64,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        self.send(&self.stream, request, timestamp).await
    }

    async fn send(
        &self,
        http: &reqwest::Client,
        request: &ApiRequest,
        timestamp: i64,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        trace!(method = %request.method, url = %request.url, "Sending request");
        let mut builder = http
            .request(request.method.clone(), &request.url)
            .query(&request.query);

        if let Auth::OAuth1(signer) = &self.auth {
            let header = signer
                .authorization(
                    request.method.as_str(),
                    &request.url,
                    &request.signed_params(),
                    timestamp,
                )
                .map_err(|e| TransportError::Other {
                    message: e.to_string(),
                })?;
            builder = builder.header(AUTHORIZATION, header);
        }

        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        } else if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        builder.send().await.map_err(classify)
    }
}

fn http_client(
    config: &ClientConfig,
    headers: HeaderMap,
    read_timeout: Duration,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(config.timeouts.connect())
        .read_timeout(read_timeout)
        .build()
        .map_err(|e| {
            ConfigError::HttpClient {
                message: e.to_string(),
            }
            .into()
        })
}

fn bearer_headers(token: &BearerToken) -> Result<HeaderMap> {
    let mut value = HeaderValue::from_str(&token.header_value()).map_err(|_| {
        Error::Config(ConfigError::HttpClient {
            message: "bearer token contains invalid header characters".to_string(),
        })
    })?;
    value.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Exchange a consumer key and secret for an app-context bearer token.
async fn exchange_bearer_token(
    config: &ClientConfig,
    consumer_key: &str,
    consumer_secret: &str,
) -> Result<BearerToken> {
    let url = config.api_url.endpoint("oauth2/token");
    info!(%url, "Exchanging consumer credentials for a bearer token");

    let http = http_client(config, HeaderMap::new(), config.timeouts.read())?;
    let response = http
        .post(&url)
        .basic_auth(consumer_key, Some(consumer_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(classify)?;
    let reply = Reply::read(response).await?;

    if !(200..300).contains(&reply.status()) {
        return Err(Error::Http(reply.into_http_error().await));
    }

    let token: TokenResponse = serde_json::from_slice(&reply.body)?;
    if !token.token_type.eq_ignore_ascii_case("bearer") {
        return Err(ConfigError::HttpClient {
            message: format!("unexpected token type '{}'", token.token_type),
        }
        .into());
    }
    Ok(BearerToken::new(token.access_token))
}

/// A fully read response.
#[derive(Debug)]
pub struct Reply {
    status: u16,
    url: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    /// Read the whole body. Failures while reading are transport errors so
    /// that truncated or badly encoded bodies are retried.
    pub(crate) async fn read(response: reqwest::Response) -> std::result::Result<Self, TransportError> {
        let status = response.status().as_u16();
        let url = strip_query(response.url().as_str());
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?.to_vec();
        Ok(Self {
            status,
            url,
            headers,
            body,
        })
    }

    /// Decode the body as JSON.
    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[async_trait]
impl HttpReply for Reply {
    fn status(&self) -> u16 {
        self.status
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    async fn into_http_error(self) -> HttpError {
        let reset = self.rate_limit_reset();
        http_error(self.status, self.url, &self.body).with_reset(reset)
    }
}

/// Build an [`HttpError`] from an error body.
///
/// v2 errors carry `title` and `detail`; v1.1 errors carry
/// `errors[0].message`.
pub(crate) fn http_error(status: u16, url: String, body: &[u8]) -> HttpError {
    let error = HttpError::new(status, url);
    let Ok(body) = serde_json::from_slice::<Value>(body) else {
        return error;
    };
    let text = |v: &Value| v.as_str().map(str::to_string);

    let first_error = body.get("errors").and_then(|e| e.get(0));
    let title = body
        .get("title")
        .and_then(text)
        .or_else(|| first_error.and_then(|e| e.get("title")).and_then(text));
    let detail = body
        .get("detail")
        .and_then(text)
        .or_else(|| first_error.and_then(|e| e.get("message")).and_then(text))
        .or_else(|| body.get("error").and_then(text));

    error.with_body(title, detail)
}

fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_error_body_is_parsed() {
        let body = br#"{"title": "Invalid Request", "detail": "One or more parameters are invalid.", "type": "about:blank"}"#;
        let err = http_error(400, "https://api.twitter.com/2/tweets".into(), body);
        assert_eq!(err.title.as_deref(), Some("Invalid Request"));
        assert_eq!(err.detail.as_deref(), Some("One or more parameters are invalid."));
    }

    #[test]
    fn v1_error_body_is_parsed() {
        let body = br#"{"errors": [{"code": 34, "message": "Sorry, that page does not exist."}]}"#;
        let err = http_error(404, "u".into(), body);
        assert_eq!(err.detail.as_deref(), Some("Sorry, that page does not exist."));
    }

    #[test]
    fn non_json_body_is_tolerated() {
        let err = http_error(503, "u".into(), b"<html>Over capacity</html>");
        assert_eq!(err, HttpError::new(503, "u"));
    }

    #[test]
    fn request_query_replacement() {
        let request = ApiRequest::get("https://api.twitter.com/1.1/search/tweets.json")
            .query("q", "rust")
            .query("max_id", 10)
            .with_query("max_id", 5);
        assert_eq!(request.query_value("max_id"), Some("5"));
        assert_eq!(request.query_value("q"), Some("rust"));
        assert_eq!(request.query_value("since_id"), None);
    }

    #[test]
    fn query_is_stripped_from_reply_urls() {
        assert_eq!(
            strip_query("https://api.twitter.com/2/tweets?ids=1,2"),
            "https://api.twitter.com/2/tweets"
        );
    }
}

//! Authenticated JSON transport shared by the unit registry and member clients.

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use shared::error::ApiError;
use tracing::debug;

use crate::{
    config::Settings,
    error::{ClientError, ClientResult},
};

#[derive(Clone)]
pub struct ApiTransport {
    http: Client,
    base_url: String,
    access_token: Option<String>,
}

impl ApiTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut transport = Self::new(settings.api_base_url.clone());
        transport.access_token = settings.access_token.clone();
        transport
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `path` must start with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "api request");
        let builder = self.http.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<Q>(&self, path: &str, query: &Q) -> ClientResult<Value>
    where
        Q: Serialize + ?Sized,
    {
        let response = self.request(Method::GET, path).query(query).send().await?;
        read_json(response).await
    }

    pub async fn send_json<B>(&self, method: Method, path: &str, body: &B) -> ClientResult<Value>
    where
        B: Serialize + ?Sized,
    {
        let response = self.request(method, path).json(body).send().await?;
        read_json(response).await
    }

    /// Issues a request whose response body is not needed.
    pub async fn send_discarding<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<()>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        ensure_success(builder.send().await?).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let fallback = status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        error: ApiError::from_response(status.as_u16(), &body, &fallback),
    })
}

async fn read_json(response: Response) -> ClientResult<Value> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|err| {
        ClientError::Decode(shared::protocol::DecodeError::Body(err.to_string()))
    })
}

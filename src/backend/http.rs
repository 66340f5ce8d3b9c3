#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use crate::backend::{ArcBackend, Backend, ByteStream};
use crate::config::{ServerConfig, user_agent};
use crate::models::{
    BranchListing, ChatError, EditedMessage, Message, RegeneratedMessage, StreamRequest,
};
use async_trait::async_trait;
use eyre::{Context, Result};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time;

/// reqwest client for the chat REST/SSE API.
pub struct HttpBackend {
    endpoint: String,
    api_token: Option<String>,
    timeout: Option<time::Duration>,
    client: reqwest::Client,
}

#[async_trait]
impl Backend for HttpBackend {
    async fn open_stream(&self, request: StreamRequest) -> Result<ByteStream> {
        log::trace!("Sending stream request: {:?}", request);

        // The timeout bounds opening the stream only, reads are unbounded.
        let send = self
            .request(reqwest::Method::POST, "/chat/stream")
            .header("Accept", "text/event-stream")
            .json(&request)
            .send();
        let res = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, send)
                .await
                .map_err(|_| ChatError::Transport {
                    status: 0,
                    message: "timed out opening stream".to_string(),
                })?,
            None => send.await,
        }
        .map_err(|err| ChatError::Transport {
            status: err.status().map(|s| s.as_u16()).unwrap_or_default(),
            message: err.to_string(),
        })?;

        let res = check_status(res).await?;
        let stream = res
            .bytes_stream()
            .map_err(|e| eyre::eyre!("reading stream: {}", e));
        Ok(Box::pin(stream))
    }

    async fn cancel(&self, message_id: String) -> Result<()> {
        let res = self
            .request(
                reqwest::Method::POST,
                &format!("/chat/cancel/{}", message_id),
            )
            .timeout_opt(self.timeout)
            .send()
            .await
            .wrap_err("sending cancel request")?;
        check_status(res).await?;
        Ok(())
    }

    async fn get_messages(
        &self,
        conversation_id: String,
        branch_id: String,
    ) -> Result<Vec<Message>> {
        let res = self
            .request(
                reqwest::Method::GET,
                &format!("/chat/{}/messages", conversation_id),
            )
            .query(&[("branch_id", branch_id.as_str())])
            .timeout_opt(self.timeout)
            .send()
            .await
            .wrap_err("fetching messages")?;
        let res = check_status(res).await?;
        let body = res
            .json::<MessageListResponse>()
            .await
            .wrap_err("parsing message list response")?;
        Ok(body.messages)
    }

    async fn edit_message(
        &self,
        message_id: String,
        content: String,
        regenerate: bool,
    ) -> Result<EditedMessage> {
        let res = self
            .request(
                reqwest::Method::PUT,
                &format!("/chat/messages/{}", message_id),
            )
            .json(&EditMessageRequest {
                content,
                regenerate,
            })
            .timeout_opt(self.timeout)
            .send()
            .await
            .wrap_err("editing message")?;
        let res = check_status(res).await?;
        res.json::<EditedMessage>()
            .await
            .wrap_err("parsing edit response")
    }

    async fn regenerate_message(&self, message_id: String) -> Result<RegeneratedMessage> {
        let res = self
            .request(
                reqwest::Method::POST,
                &format!("/chat/regenerate/{}", message_id),
            )
            .timeout_opt(self.timeout)
            .send()
            .await
            .wrap_err("regenerating message")?;
        let res = check_status(res).await?;
        res.json::<RegeneratedMessage>()
            .await
            .wrap_err("parsing regenerate response")
    }

    async fn list_branches(&self, conversation_id: String) -> Result<BranchListing> {
        let path = format!("/conversations/{}/branches", conversation_id);
        let req = self.request(reqwest::Method::GET, &path);
        self.branch_call(req).await.wrap_err("listing branches")
    }

    async fn create_branch(
        &self,
        conversation_id: String,
        from_message_id: String,
        name: String,
    ) -> Result<BranchListing> {
        let path = format!("/conversations/{}/branches", conversation_id);
        let req = self
            .request(reqwest::Method::POST, &path)
            .json(&CreateBranchRequest {
                message_id: from_message_id,
                name,
            });
        self.branch_call(req).await.wrap_err("creating branch")
    }

    async fn switch_branch(
        &self,
        conversation_id: String,
        branch_id: String,
    ) -> Result<BranchListing> {
        let path = format!(
            "/conversations/{}/branches/{}/switch",
            conversation_id, branch_id
        );
        let req = self.request(reqwest::Method::POST, &path);
        self.branch_call(req).await.wrap_err("switching branch")
    }

    async fn rename_branch(
        &self,
        conversation_id: String,
        branch_id: String,
        name: String,
    ) -> Result<BranchListing> {
        let path = format!("/conversations/{}/branches/{}", conversation_id, branch_id);
        let req = self
            .request(reqwest::Method::PUT, &path)
            .json(&RenameBranchRequest { name });
        self.branch_call(req).await.wrap_err("renaming branch")
    }

    async fn delete_branch(
        &self,
        conversation_id: String,
        branch_id: String,
    ) -> Result<BranchListing> {
        let path = format!("/conversations/{}/branches/{}", conversation_id, branch_id);
        let req = self.request(reqwest::Method::DELETE, &path);
        self.branch_call(req).await.wrap_err("deleting branch")
    }
}

impl From<HttpBackend> for ArcBackend {
    fn from(value: HttpBackend) -> Self {
        Arc::new(value)
    }
}

impl From<&ServerConfig> for HttpBackend {
    fn from(value: &ServerConfig) -> Self {
        let mut backend = HttpBackend::default().with_endpoint(&value.endpoint);
        if let Some(token) = value.api_token.as_deref() {
            backend = backend.with_api_token(token);
        }
        backend.timeout = value.timeout();
        backend
    }
}

impl HttpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_token(mut self, api_token: &str) -> Self {
        self.api_token = Some(api_token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn timeout(&self) -> Option<time::Duration> {
        self.timeout
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.endpoint, path))
            .header("User-Agent", user_agent());
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn branch_call(&self, req: reqwest::RequestBuilder) -> Result<BranchListing> {
        let res = req.timeout_opt(self.timeout).send().await?;
        let res = check_status(res).await?;
        let listing = res
            .json::<BranchListing>()
            .await
            .wrap_err("parsing branch response")?;
        Ok(listing)
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self {
            endpoint: crate::config::constants::DEFAULT_ENDPOINT.to_string(),
            api_token: None,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }
}

trait RequestBuilderExt {
    fn timeout_opt(self, timeout: Option<time::Duration>) -> Self;
}

impl RequestBuilderExt for reqwest::RequestBuilder {
    fn timeout_opt(self, timeout: Option<time::Duration>) -> Self {
        match timeout {
            Some(timeout) => self.timeout(timeout),
            None => self,
        }
    }
}

/// Turns a non-success response into `ChatError::Transport`, preferring the
/// `error` field of a JSON body over the bare status.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }

    let http_code = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    log::error!("Error response ({}): {}", http_code, body);
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error.or(e.message))
        .unwrap_or_else(|| format!("HTTP {}", http_code));
    Err(ChatError::Transport {
        status: http_code,
        message,
    }
    .into())
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CreateBranchRequest {
    message_id: String,
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EditMessageRequest {
    content: String,
    regenerate: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct RenameBranchRequest {
    name: String,
}

//! Slack Web API client.
//!
//! Messages and conversation records are kept as raw JSON so the export
//! preserves every field Slack sends, including the `name`/`old_name` pair
//! of rename events. Users and the auth check go through slack-morphism's
//! typed models.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{COOKIE, RETRY_AFTER};
use serde_json::Value;
use slack_morphism::prelude::*;
use tokio::time::sleep;
use url::Url;

use crate::api::{ConversationsApi, HistoryPage, PageOutcome};
use crate::error::{AppError, Result};
use crate::model::{Conversation, ConversationKind, Message};

const SLACK_API_BASE: &str = "https://slack.com/api/";
const SLACK_FILES_BASE: &str = "https://files.slack.com/";
const SLACK_FILES_HOST: &str = "files.slack.com";
const LIST_PAGE_SIZE: u32 = 200;
/// Used when a 429 arrives without a usable Retry-After header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);
const DEFAULT_RETRY_PADDING: Duration = Duration::from_secs(1);

enum CallOutcome {
    Ok(Value),
    Throttled(Duration),
}

pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: Url,
    files_url: Url,
    token: String,
    cookie: Option<String>,
    retry_padding: Duration,
}

fn parse_base(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| AppError::SlackApi(e.to_string()))
}

impl SlackWebClient {
    pub fn new(token: &str, cookie: Option<&str>) -> Result<Self> {
        Self::with_base_urls(token, cookie, SLACK_API_BASE, SLACK_FILES_BASE)
    }

    /// Client talking to `api_base` for Web API methods and fetching
    /// `files.slack.com` links from `files_base`. Both must end in `/`.
    pub fn with_base_urls(
        token: &str,
        cookie: Option<&str>,
        api_base: &str,
        files_base: &str,
    ) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: parse_base(api_base)?,
            files_url: parse_base(files_base)?,
            token: token.to_string(),
            cookie: cookie.map(str::to_string),
            retry_padding: DEFAULT_RETRY_PADDING,
        })
    }

    /// Extra wait on top of Retry-After for the listing calls.
    pub fn with_retry_padding(mut self, retry_padding: Duration) -> Self {
        self.retry_padding = retry_padding;
        self
    }

    fn method_url(&self, method: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(method)
            .map_err(|e| AppError::SlackApi(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(&self.token);
        match &self.cookie {
            Some(cookie) => request.header(COOKIE, cookie.as_str()),
            None => request,
        }
    }

    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<CallOutcome> {
        let url = self.method_url(method, params)?;
        let response = self.authorized(self.http.get(url)).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Ok(CallOutcome::Throttled(retry_after));
        }

        let body: Value = response.error_for_status()?.json().await?;
        if body.get("ok").and_then(|ok| ok.as_bool()) != Some(true) {
            let reason = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown error");
            return Err(AppError::SlackApi(format!("{}: {}", method, reason)));
        }
        Ok(CallOutcome::Ok(body))
    }

    /// `call` for the bootstrap listings, which simply wait out throttling.
    async fn call_waiting(&self, method: &str, params: &[(&str, String)]) -> Result<Value> {
        loop {
            match self.call(method, params).await? {
                CallOutcome::Ok(body) => return Ok(body),
                CallOutcome::Throttled(retry_after) => {
                    tracing::warn!(method, retry_after_secs = retry_after.as_secs(), "rate limited");
                    sleep(retry_after + self.retry_padding).await;
                }
            }
        }
    }

    async fn history_page(&self, method: &str, params: &[(&str, String)]) -> Result<PageOutcome> {
        match self.call(method, params).await? {
            CallOutcome::Throttled(retry_after) => Ok(PageOutcome::Throttled { retry_after }),
            CallOutcome::Ok(body) => Ok(PageOutcome::Page(parse_history_page(body)?)),
        }
    }

    /// Validate the token; the response names the token owner.
    pub async fn auth_test(&self) -> Result<SlackApiAuthTestResponse> {
        let body = self.call_waiting("auth.test", &[]).await?;
        serde_json::from_value(body).map_err(|e| AppError::JsonParse(e.to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<SlackUser>> {
        let mut users = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![("limit", LIST_PAGE_SIZE.to_string())];
            if let Some(c) = &cursor {
                params.push(("cursor", c.clone()));
            }
            let body = self.call_waiting("users.list", &params).await?;
            let response: SlackApiUsersListResponse =
                serde_json::from_value(body).map_err(|e| AppError::JsonParse(e.to_string()))?;

            users.extend(response.members);

            match response.response_metadata.and_then(|meta| meta.next_cursor) {
                Some(next) if !next.0.is_empty() => cursor = Some(next.0),
                _ => break,
            }
        }

        Ok(users)
    }

    /// Every conversation of `kind`, with member lists for channels and groups.
    pub async fn list_conversations(
        &self,
        kind: ConversationKind,
        exclude_archived: bool,
        page_delay: Duration,
    ) -> Result<Vec<Conversation>> {
        let with_members = kind != ConversationKind::DirectMessage;
        let mut conversations = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut params = vec![
                ("limit", LIST_PAGE_SIZE.to_string()),
                ("types", kind.list_types().to_string()),
                ("exclude_archived", exclude_archived.to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let body = self.call_waiting("conversations.list", &params).await?;
            cursor = next_cursor(&body);

            let listed = body
                .get("channels")
                .and_then(|c| c.as_array())
                .cloned()
                .unwrap_or_default();
            for raw in listed {
                let mut conversation = Conversation::new(raw);
                if with_members {
                    let members = self.conversation_members(conversation.id()).await?;
                    conversation.set_field("members", Value::from(members));
                    println!("Retrieved members of {}", conversation.name());
                }
                conversations.push(conversation);
            }

            sleep(page_delay).await;
            if cursor.is_empty() {
                break;
            }
        }

        Ok(conversations)
    }

    async fn conversation_members(&self, channel: &str) -> Result<Vec<String>> {
        let mut members = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut params = vec![
                ("channel", channel.to_string()),
                ("limit", LIST_PAGE_SIZE.to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let body = self.call_waiting("conversations.members", &params).await?;
            cursor = next_cursor(&body);

            if let Some(ids) = body.get("members").and_then(|m| m.as_array()) {
                members.extend(ids.iter().filter_map(|id| id.as_str().map(str::to_string)));
            }

            if cursor.is_empty() {
                break;
            }
        }

        Ok(members)
    }

    /// Where a `files.slack.com` link is fetched from; other links are used as is.
    fn file_url(&self, link: &str) -> Result<Url> {
        let url = Url::parse(link).map_err(|e| AppError::SlackApi(e.to_string()))?;
        if url.host_str() != Some(SLACK_FILES_HOST) {
            return Ok(url);
        }
        let mut target = self
            .files_url
            .join(url.path().trim_start_matches('/'))
            .map_err(|e| AppError::SlackApi(e.to_string()))?;
        target.set_query(url.query());
        Ok(target)
    }

    /// Fetch a private file URL with the same credentials as the API calls.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .authorized(self.http.get(self.file_url(url)?))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ConversationsApi for SlackWebClient {
    async fn history(
        &self,
        channel: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<PageOutcome> {
        let mut params = vec![("channel", channel.to_string()), ("limit", limit.to_string())];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }
        self.history_page("conversations.history", &params).await
    }

    async fn replies(
        &self,
        channel: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<PageOutcome> {
        let mut params = vec![
            ("channel", channel.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }
        self.history_page("conversations.replies", &params).await
    }
}

/// `response_metadata.next_cursor`, or `""` when Slack leaves it out.
fn next_cursor(body: &Value) -> String {
    body.get("response_metadata")
        .and_then(|meta| meta.get("next_cursor"))
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_history_page(body: Value) -> Result<HistoryPage> {
    let next_cursor = next_cursor(&body);
    let messages = match body.get("messages") {
        Some(Value::Array(items)) => items.iter().cloned().map(Message::new).collect(),
        Some(_) => {
            return Err(AppError::JsonParse(
                "`messages` is not an array".to_string(),
            ));
        }
        None => Vec::new(),
    };
    Ok(HistoryPage {
        messages,
        next_cursor,
    })
}

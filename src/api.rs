//! The boundary between the export pipeline and the remote history endpoints.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Message;

/// One page of `conversations.history` or `conversations.replies`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    /// Empty when there are no more pages.
    pub next_cursor: String,
}

/// Result of a single page request that did not hard-fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Page(HistoryPage),
    /// The service asked us to back off for `retry_after` before asking again.
    Throttled { retry_after: Duration },
}

/// Which endpoint a paginated walk is reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRequest<'a> {
    History { channel: &'a str },
    Replies { channel: &'a str, thread_ts: &'a str },
}

#[async_trait]
pub trait ConversationsApi: Send + Sync {
    async fn history(
        &self,
        channel: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<PageOutcome>;

    async fn replies(
        &self,
        channel: &str,
        thread_ts: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<PageOutcome>;
}

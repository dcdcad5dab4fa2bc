//! Single-page requests with throttle handling and fixed pacing.

use std::io::Write;

use tokio::time::sleep;

use crate::api::{ConversationsApi, HistoryPage, HistoryRequest, PageOutcome};
use crate::error::Result;
use crate::settings::Pacing;

pub struct PageFetcher<'a, A: ConversationsApi + ?Sized> {
    api: &'a A,
    pacing: Pacing,
    progress: bool,
}

impl<'a, A: ConversationsApi + ?Sized> PageFetcher<'a, A> {
    pub fn new(api: &'a A, pacing: Pacing) -> Self {
        Self {
            api,
            pacing,
            progress: true,
        }
    }

    /// Turn the per-page progress dots on stdout on or off.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Fetch one page, waiting out every throttle response.
    ///
    /// A throttled request is retried with the same cursor after the
    /// server-specified wait plus the retry padding, with no upper bound on
    /// attempts. Any other failure is returned as-is.
    pub async fn fetch_page(
        &self,
        request: HistoryRequest<'_>,
        cursor: Option<&str>,
    ) -> Result<HistoryPage> {
        let mut throttled = 0u32;

        loop {
            let outcome = match request {
                HistoryRequest::History { channel } => {
                    self.api
                        .history(channel, cursor, self.pacing.page_size)
                        .await?
                }
                HistoryRequest::Replies { channel, thread_ts } => {
                    self.api
                        .replies(channel, thread_ts, cursor, self.pacing.page_size)
                        .await?
                }
            };

            match outcome {
                PageOutcome::Page(page) => {
                    if throttled > 0 {
                        tracing::debug!(attempts = throttled + 1, "page fetched after rate limiting");
                    }
                    tracing::debug!(
                        request = ?request,
                        messages = page.messages.len(),
                        has_more = !page.next_cursor.is_empty(),
                        "fetched page"
                    );
                    return Ok(page);
                }
                PageOutcome::Throttled { retry_after } => {
                    throttled += 1;
                    let secs = retry_after.as_secs();
                    tracing::warn!(
                        request = ?request,
                        retry_after_secs = secs,
                        attempt = throttled,
                        "rate limited"
                    );
                    println!(
                        "Rate limit hit. Retrying in {} second{}.",
                        secs,
                        if secs > 1 { "s" } else { "" }
                    );
                    sleep(retry_after + self.pacing.retry_padding).await;
                }
            }
        }
    }

    /// Progress marker plus the fixed pause that follows every page.
    pub async fn finish_page(&self) {
        if self.progress {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, ".");
            let _ = stdout.flush();
        }
        sleep(self.pacing.page_delay).await;
    }

    /// Short pause before starting a thread-replies walk.
    pub async fn pause_before_thread(&self) {
        sleep(self.pacing.thread_delay).await;
    }
}

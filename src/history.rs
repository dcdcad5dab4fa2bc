//! Full history of one conversation: top-level pages, thread replies, ordering.

use crate::api::{ConversationsApi, HistoryRequest};
use crate::error::{AppError, Result};
use crate::fetcher::PageFetcher;
use crate::model::Message;

pub struct HistoryAssembler<'a, A: ConversationsApi + ?Sized> {
    fetcher: PageFetcher<'a, A>,
}

impl<'a, A: ConversationsApi + ?Sized> HistoryAssembler<'a, A> {
    pub fn new(fetcher: PageFetcher<'a, A>) -> Self {
        Self { fetcher }
    }

    /// Every message of the conversation, thread replies included, oldest first.
    pub async fn assemble(&self, channel: &str) -> Result<Vec<Message>> {
        let messages = self.fetch_top_level(channel).await?;
        tracing::debug!(channel, messages = messages.len(), "assembled history");
        Ok(messages)
    }

    /// Walk `conversations.history`, expanding each page's threads before
    /// moving on to the next page.
    pub async fn fetch_top_level(&self, channel: &str) -> Result<Vec<Message>> {
        let request = HistoryRequest::History { channel };
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetcher.fetch_page(request, cursor.as_deref()).await?;

            let roots: Vec<String> = page
                .messages
                .iter()
                .filter_map(|m| m.thread_ts().map(str::to_string))
                .collect();
            messages.extend(page.messages);

            for thread_ts in roots {
                self.fetcher.pause_before_thread().await;
                let replies = self.fetch_thread_replies(channel, &thread_ts).await?;
                messages.extend(replies);
            }

            self.fetcher.finish_page().await;

            if page.next_cursor.is_empty() {
                break;
            }
            cursor = Some(page.next_cursor);
        }

        sort_chronologically(messages)
    }

    /// Walk `conversations.replies` for one thread and return the replies
    /// only, oldest first. The endpoint repeats the root message as the
    /// first entry; it is already part of the top-level history and is
    /// dropped here.
    pub async fn fetch_thread_replies(&self, channel: &str, thread_ts: &str) -> Result<Vec<Message>> {
        let request = HistoryRequest::Replies { channel, thread_ts };
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetcher.fetch_page(request, cursor.as_deref()).await?;
            messages.extend(page.messages);

            self.fetcher.finish_page().await;

            if page.next_cursor.is_empty() {
                break;
            }
            cursor = Some(page.next_cursor);
        }

        let sorted = sort_chronologically(messages)?;
        strip_thread_root(sorted, thread_ts)
    }
}

/// Stable sort by timestamp; messages sharing a timestamp keep arrival order.
pub fn sort_chronologically(messages: Vec<Message>) -> Result<Vec<Message>> {
    let mut keyed = messages
        .into_iter()
        .map(|m| Ok((m.timestamp()?, m)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(keyed.into_iter().map(|(_, m)| m).collect())
}

fn strip_thread_root(sorted: Vec<Message>, thread_ts: &str) -> Result<Vec<Message>> {
    let mut replies = sorted.into_iter();
    match replies.next() {
        Some(root) if root.ts() == Some(thread_ts) => Ok(replies.collect()),
        first => Err(AppError::ThreadRootMismatch {
            expected: thread_ts.to_string(),
            found: first.and_then(|m| m.ts().map(str::to_string)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::api::fake::{msg, page, thread_root, Endpoint, ScriptedApi, Step};
    use crate::settings::Pacing;

    const CHANNEL: &str = "C1";

    fn assembler(api: &ScriptedApi) -> HistoryAssembler<'_, ScriptedApi> {
        HistoryAssembler::new(PageFetcher::new(api, Pacing::default()).with_progress(false))
    }

    fn timestamps(messages: &[Message]) -> Vec<&str> {
        messages.iter().filter_map(|m| m.ts()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_stops_at_empty_cursor() {
        let api = ScriptedApi::new().on_history(
            CHANNEL,
            vec![
                page(vec![msg("1.000001")], "c1"),
                page(vec![msg("2.000001")], "c2"),
                page(vec![msg("3.000001")], ""),
            ],
        );

        let messages = assembler(&api).assemble(CHANNEL).await.unwrap();

        assert_eq!(timestamps(&messages), vec!["1.000001", "2.000001", "3.000001"]);
        let cursors: Vec<Option<String>> = api.calls().into_iter().map(|(_, c)| c).collect();
        assert_eq!(
            cursors,
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_is_sorted_across_pages() {
        // conversations.history pages newest first
        let api = ScriptedApi::new().on_history(
            CHANNEL,
            vec![
                page(vec![msg("30.000001"), msg("20.000001")], "next"),
                page(vec![msg("10.000002"), msg("10.000001")], ""),
            ],
        );

        let messages = assembler(&api).assemble(CHANNEL).await.unwrap();

        assert_eq!(
            timestamps(&messages),
            vec!["10.000001", "10.000002", "20.000001", "30.000001"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_thread_replies_drop_duplicated_root() {
        let api = ScriptedApi::new().on_replies(
            CHANNEL,
            "100.000001",
            vec![page(
                vec![thread_root("100.000001"), msg("101.000001"), msg("102.000001")],
                "",
            )],
        );

        let replies = assembler(&api)
            .fetch_thread_replies(CHANNEL, "100.000001")
            .await
            .unwrap();

        assert_eq!(timestamps(&replies), vec!["101.000001", "102.000001"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thread_root_mismatch_is_fatal() {
        let api = ScriptedApi::new().on_replies(
            CHANNEL,
            "100.000001",
            vec![page(vec![msg("99.000001"), msg("101.000001")], "")],
        );

        let err = assembler(&api)
            .fetch_thread_replies(CHANNEL, "100.000001")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::ThreadRootMismatch { expected, found }
                if expected == "100.000001" && found.as_deref() == Some("99.000001")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_thread_is_fatal() {
        let api = ScriptedApi::new().on_replies(CHANNEL, "100.000001", vec![page(vec![], "")]);

        let err = assembler(&api)
            .fetch_thread_replies(CHANNEL, "100.000001")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ThreadRootMismatch { found: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_threads_are_expanded_and_merged_in_order() {
        let api = ScriptedApi::new()
            .on_history(
                CHANNEL,
                vec![
                    page(vec![msg("300.000001"), thread_root("200.000001")], "c1"),
                    page(vec![thread_root("100.000001")], ""),
                ],
            )
            .on_replies(
                CHANNEL,
                "200.000001",
                vec![page(
                    vec![thread_root("200.000001"), msg("250.000001"), msg("350.000001")],
                    "",
                )],
            )
            .on_replies(
                CHANNEL,
                "100.000001",
                vec![
                    page(vec![thread_root("100.000001"), msg("110.000001")], "r1"),
                    page(vec![msg("120.000001")], ""),
                ],
            );

        let messages = assembler(&api).assemble(CHANNEL).await.unwrap();

        assert_eq!(
            timestamps(&messages),
            vec![
                "100.000001",
                "110.000001",
                "120.000001",
                "200.000001",
                "250.000001",
                "300.000001",
                "350.000001",
            ]
        );

        // each thread is expanded right after the page that revealed it
        let endpoints: Vec<Endpoint> = api.calls().into_iter().map(|(e, _)| e).collect();
        assert_eq!(
            endpoints,
            vec![
                Endpoint::History(CHANNEL.to_string()),
                Endpoint::Replies(CHANNEL.to_string(), "200.000001".to_string()),
                Endpoint::History(CHANNEL.to_string()),
                Endpoint::Replies(CHANNEL.to_string(), "100.000001".to_string()),
                Endpoint::Replies(CHANNEL.to_string(), "100.000001".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_fetched_message_appears_once() {
        let api = ScriptedApi::new()
            .on_history(
                CHANNEL,
                vec![page(vec![thread_root("5.000001"), msg("9.000001")], "")],
            )
            .on_replies(
                CHANNEL,
                "5.000001",
                vec![page(vec![thread_root("5.000001"), msg("6.000001"), msg("7.000001")], "")],
            );

        let messages = assembler(&api).assemble(CHANNEL).await.unwrap();

        // 2 top-level + 3 replies - 1 duplicated root
        assert_eq!(messages.len(), 4);
        let mut seen = timestamps(&messages);
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_pages_and_threads() {
        let api = ScriptedApi::new()
            .on_history(
                CHANNEL,
                vec![
                    page(vec![thread_root("1.000001")], "c1"),
                    page(vec![msg("2.000001")], ""),
                ],
            )
            .on_replies(
                CHANNEL,
                "1.000001",
                vec![page(vec![thread_root("1.000001")], "")],
            );

        let start = Instant::now();
        assembler(&api).assemble(CHANNEL).await.unwrap();

        // 2 history pages + 1 replies page at 1.3s each, plus one 0.5s thread pause
        assert_eq!(start.elapsed(), Duration::from_millis(3 * 1300 + 500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_inside_thread_aborts() {
        let api = ScriptedApi::new()
            .on_history(CHANNEL, vec![page(vec![thread_root("1.000001")], "")])
            .on_replies(CHANNEL, "1.000001", vec![Step::Fail("ratelimited?".to_string())]);

        let err = assembler(&api).assemble(CHANNEL).await.unwrap_err();

        assert!(matches!(err, AppError::SlackApi(_)));
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let first = Message::new(json!({"ts": "5.000001", "text": "first"}));
        let second = Message::new(json!({"ts": "5.000001", "text": "second"}));
        let earlier = Message::new(json!({"ts": "4.000001"}));

        let sorted =
            sort_chronologically(vec![first.clone(), second.clone(), earlier.clone()]).unwrap();

        assert_eq!(sorted, vec![earlier, first, second]);
    }

    #[test]
    fn test_sort_rejects_malformed_timestamp() {
        let bad = Message::new(json!({"ts": "yesterday"}));

        assert!(matches!(
            sort_chronologically(vec![msg("1.000001"), bad]),
            Err(AppError::MalformedTimestamp(_))
        ));
    }
}

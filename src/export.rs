//! Per-kind export of selected conversations, plus the run-wide context and
//! the manifest files the offline viewer expects next to them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::api::ConversationsApi;
use crate::error::Result;
use crate::fetcher::PageFetcher;
use crate::history::HistoryAssembler;
use crate::model::{Conversation, ConversationKind};
use crate::partition::{ensure_conversation_dir, partition};
use crate::settings::Pacing;
use crate::write_json;

/// Bidirectional user id / user name lookup.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    names_by_id: HashMap<String, String>,
    ids_by_name: HashMap<String, String>,
}

impl UserDirectory {
    /// Build from `users.list` records; entries without an id or name are skipped.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut directory = Self::default();
        for record in records {
            let id = record.get("id").and_then(|v| v.as_str());
            let name = record.get("name").and_then(|v| v.as_str());
            if let (Some(id), Some(name)) = (id, name) {
                directory.names_by_id.insert(id.to_string(), name.to_string());
                directory.ids_by_name.insert(name.to_string(), id.to_string());
            }
        }
        directory
    }

    pub fn display_name(&self, user_id: &str) -> String {
        self.names_by_id
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| format!("{} (name unknown)", user_id))
    }

    /// Map a user name to its id; anything else is assumed to already be an id.
    pub fn resolve<'a>(&'a self, name_or_id: &'a str) -> &'a str {
        self.ids_by_name
            .get(name_or_id)
            .map(String::as_str)
            .unwrap_or(name_or_id)
    }
}

/// Everything one export run shares across conversations.
pub struct ExportContext {
    pub root: PathBuf,
    pub token_owner_id: String,
    pub users: UserDirectory,
    pub pacing: Pacing,
    pub dry_run: bool,
    pub progress: bool,
}

impl ExportContext {
    /// Name shown to the operator for a conversation.
    pub fn display_name(&self, kind: ConversationKind, conversation: &Conversation) -> String {
        match kind {
            ConversationKind::DirectMessage => self.users.display_name(conversation.user()),
            _ => conversation.name().to_string(),
        }
    }
}

/// Conversations listed during bootstrap, by kind.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub channels: Vec<Conversation>,
    pub groups: Vec<Conversation>,
    pub dms: Vec<Conversation>,
}

/// Outcome of applying the command-line selection to one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Conversations(Vec<Conversation>),
    /// The operator asked to choose among these interactively.
    Prompt(Vec<Conversation>),
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Conversations(c) | Selection::Prompt(c) => c.is_empty(),
        }
    }
}

/// Apply a `--public-channels` / `--groups` / `--direct-messages` style
/// argument to the listed conversations.
///
/// Names narrow the selection. A flag given without names, or no flag for
/// any kind at all, means every conversation (or a prompt over them).
pub fn select_conversations<F>(
    all: Vec<Conversation>,
    requested: Option<&[String]>,
    any_requested: bool,
    exclude_archived: bool,
    prompt: bool,
    matches: F,
) -> Selection
where
    F: Fn(&Conversation, &[String]) -> bool,
{
    let candidates: Vec<Conversation> = if exclude_archived {
        all.into_iter().filter(|c| !c.is_archived()).collect()
    } else {
        all
    };

    match requested {
        Some(names) if !names.is_empty() => Selection::Conversations(
            candidates.into_iter().filter(|c| matches(c, names)).collect(),
        ),
        _ if requested.is_some() || !any_requested => {
            if prompt {
                Selection::Prompt(candidates)
            } else {
                Selection::Conversations(candidates)
            }
        }
        _ => Selection::Conversations(Vec::new()),
    }
}

pub fn matches_name(conversation: &Conversation, names: &[String]) -> bool {
    names.iter().any(|n| n == conversation.name())
}

pub fn dm_matches_user(users: &UserDirectory) -> impl Fn(&Conversation, &[String]) -> bool + '_ {
    move |conversation: &Conversation, names: &[String]| {
        names
            .iter()
            .any(|n| users.resolve(n) == conversation.user())
    }
}

/// Fetch and write the history of every conversation in `conversations`.
/// Returns the number of messages written.
pub async fn export_conversations<A: ConversationsApi + ?Sized>(
    api: &A,
    ctx: &ExportContext,
    kind: ConversationKind,
    conversations: &[Conversation],
) -> Result<usize> {
    println!("Fetching {} {}", conversations.len(), kind.label());

    if ctx.dry_run {
        println!("{} selected for export:", kind.label());
        for conversation in conversations {
            println!("{}", ctx.display_name(kind, conversation));
        }
        println!();
        return Ok(0);
    }

    let assembler =
        HistoryAssembler::new(PageFetcher::new(api, ctx.pacing).with_progress(ctx.progress));
    let mut total = 0;

    for conversation in conversations {
        let name = ctx.display_name(kind, conversation);
        let dir_name = match kind {
            ConversationKind::DirectMessage => conversation.id(),
            _ => conversation.name(),
        };

        println!("Fetching history for {}: {}", kind.label(), name);
        let dir = ensure_conversation_dir(&ctx.root, dir_name)?;

        let messages = assembler.assemble(conversation.id()).await?;
        let count = messages.len();
        let final_dir = partition(&ctx.root, &dir, messages, kind)?;
        println!();

        tracing::info!(
            conversation = conversation.id(),
            messages = count,
            dir = %final_dir.display(),
            "conversation exported"
        );
        total += count;
    }

    Ok(total)
}

/// Give every DM a `members` list of the other party plus the token owner;
/// the viewer expects one and `conversations.list` leaves it out.
pub fn with_dm_members(dms: &[Conversation], token_owner_id: &str) -> Vec<Conversation> {
    dms.iter()
        .map(|dm| {
            let mut dm = dm.clone();
            let members = vec![dm.user().to_string(), token_owner_id.to_string()];
            dm.set_field("members", Value::from(members));
            dm
        })
        .collect()
}

/// Write `users.json`, `channels.json`, `groups.json`, `mpims.json` and `dms.json`.
pub fn write_manifests<U: Serialize>(
    root: &Path,
    users: &[U],
    workspace: &Workspace,
    token_owner_id: &str,
) -> Result<()> {
    println!("Making users and channels files");

    write_json(&root.join("users.json"), users)?;

    let (mpims, private): (Vec<&Conversation>, Vec<&Conversation>) =
        workspace.groups.iter().partition(|g| g.is_mpim());

    write_json(&root.join("channels.json"), &workspace.channels)?;
    write_json(&root.join("groups.json"), &private)?;
    write_json(&root.join("mpims.json"), &mpims)?;
    write_json(
        &root.join("dms.json"),
        &with_dm_members(&workspace.dms, token_owner_id),
    )?;
    Ok(())
}

/// The viewer needs at least one public channel directory to show its root
/// page; when only groups are exported, create the first known channel's.
pub fn ensure_viewer_root(root: &Path, channels: &[Conversation]) -> Result<Option<PathBuf>> {
    match channels.first() {
        Some(channel) => Ok(Some(ensure_conversation_dir(root, channel.name())?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::api::fake::{msg, page, thread_root, ScriptedApi};

    fn channel(id: &str, name: &str, archived: bool) -> Conversation {
        Conversation::new(json!({
            "id": id,
            "name": name,
            "is_archived": archived,
            "is_member": true,
        }))
    }

    fn dm(id: &str, user: &str) -> Conversation {
        Conversation::new(json!({"id": id, "user": user, "is_im": true}))
    }

    fn users() -> UserDirectory {
        let records = [json!({"id": "U1", "name": "ada"}), json!({"id": "U2", "name": "grace"})];
        UserDirectory::from_records(records.iter())
    }

    fn context(root: &Path, dry_run: bool) -> ExportContext {
        ExportContext {
            root: root.to_path_buf(),
            token_owner_id: "U0".to_string(),
            users: users(),
            pacing: Pacing::default(),
            dry_run,
            progress: false,
        }
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        match selection {
            Selection::Conversations(c) | Selection::Prompt(c) => c.iter().map(|c| c.id()).collect(),
        }
    }

    #[test]
    fn test_user_directory_lookups() {
        let users = users();

        assert_eq!(users.display_name("U1"), "ada");
        assert_eq!(users.display_name("U9"), "U9 (name unknown)");
        assert_eq!(users.resolve("grace"), "U2");
        assert_eq!(users.resolve("U2"), "U2");
    }

    #[test]
    fn test_selection_by_name() {
        let all = vec![channel("C1", "general", false), channel("C2", "random", false)];
        let names = vec!["random".to_string()];

        let selection = select_conversations(all, Some(names.as_slice()), true, false, false, matches_name);

        assert_eq!(ids(&selection), vec!["C2"]);
    }

    #[test]
    fn test_selection_flag_without_names_takes_all() {
        let all = vec![channel("C1", "general", false), channel("C2", "random", true)];

        let selection = select_conversations(all, Some(&[][..]), true, false, false, matches_name);

        assert_eq!(ids(&selection), vec!["C1", "C2"]);
    }

    #[test]
    fn test_selection_excludes_archived() {
        let all = vec![channel("C1", "general", false), channel("C2", "random", true)];

        let selection = select_conversations(all, Some(&[][..]), true, true, false, matches_name);

        assert_eq!(ids(&selection), vec!["C1"]);
    }

    #[test]
    fn test_selection_other_kind_requested_takes_none() {
        let all = vec![channel("C1", "general", false)];

        let selection = select_conversations(all, None, true, false, false, matches_name);

        assert!(selection.is_empty());
    }

    #[test]
    fn test_selection_nothing_requested_takes_all() {
        let all = vec![channel("C1", "general", false)];

        let selection = select_conversations(all, None, false, false, false, matches_name);

        assert_eq!(ids(&selection), vec!["C1"]);
    }

    #[test]
    fn test_selection_prompt() {
        let all = vec![channel("C1", "general", false)];

        let selection = select_conversations(all, Some(&[][..]), true, false, true, matches_name);

        assert!(matches!(selection, Selection::Prompt(ref c) if c.len() == 1));
    }

    #[test]
    fn test_dm_selection_by_user_name_or_id() {
        let users = users();
        let all = vec![dm("D1", "U1"), dm("D2", "U2"), dm("D3", "U3")];
        let names = vec!["ada".to_string(), "U3".to_string()];

        let selection =
            select_conversations(all, Some(names.as_slice()), true, false, false, dm_matches_user(&users));

        assert_eq!(ids(&selection), vec!["D1", "D3"]);
    }

    #[test]
    fn test_dm_members_are_synthesized() {
        let dms = with_dm_members(&[dm("D1", "U1")], "U0");

        assert_eq!(
            serde_json::to_value(&dms).unwrap()[0]["members"],
            json!(["U1", "U0"])
        );
    }

    #[test]
    fn test_write_manifests_splits_groups() {
        let root = tempdir().unwrap();
        let workspace = Workspace {
            channels: vec![channel("C1", "general", false)],
            groups: vec![
                Conversation::new(json!({"id": "G1", "name": "ops", "is_mpim": false})),
                Conversation::new(json!({"id": "G2", "name": "mpdm-a--b-1", "is_mpim": true})),
            ],
            dms: vec![dm("D1", "U1")],
        };
        let users = vec![json!({"id": "U1", "name": "ada"})];

        write_manifests(root.path(), &users, &workspace, "U0").unwrap();

        let read = |name: &str| -> Value {
            serde_json::from_str(&fs::read_to_string(root.path().join(name)).unwrap()).unwrap()
        };
        assert_eq!(read("users.json"), json!([{"id": "U1", "name": "ada"}]));
        assert_eq!(read("channels.json")[0]["id"], "C1");
        assert_eq!(read("groups.json"), json!([{"id": "G1", "name": "ops", "is_mpim": false}]));
        assert_eq!(read("mpims.json")[0]["id"], "G2");
        assert_eq!(read("dms.json")[0]["members"], json!(["U1", "U0"]));
    }

    #[test]
    fn test_viewer_root_uses_first_channel() {
        let root = tempdir().unwrap();

        let dir = ensure_viewer_root(root.path(), &[channel("C1", "general", false)]).unwrap();

        assert_eq!(dir, Some(root.path().join("general")));
        assert!(root.path().join("general").is_dir());
        assert_eq!(ensure_viewer_root(root.path(), &[]).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_fetches_nothing() {
        let root = tempdir().unwrap();
        let api = ScriptedApi::new();
        let ctx = context(root.path(), true);

        let count = export_conversations(
            &api,
            &ctx,
            ConversationKind::PublicChannel,
            &[channel("C1", "general", false)],
        )
        .await
        .unwrap();

        assert_eq!(count, 0);
        assert!(api.calls().is_empty());
        assert!(!root.path().join("general").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_export_writes_day_files() {
        let root = tempdir().unwrap();
        // 2024-01-15 and 2024-01-16
        let api = ScriptedApi::new()
            .on_history(
                "C1",
                vec![page(vec![msg("1705399200.000001"), thread_root("1705312800.000001")], "")],
            )
            .on_replies(
                "C1",
                "1705312800.000001",
                vec![page(vec![thread_root("1705312800.000001"), msg("1705312900.000001")], "")],
            );
        let ctx = context(root.path(), false);

        let count = export_conversations(
            &api,
            &ctx,
            ConversationKind::PublicChannel,
            &[channel("C1", "general", false)],
        )
        .await
        .unwrap();

        assert_eq!(count, 3);
        let day1: Value = serde_json::from_str(
            &fs::read_to_string(root.path().join("general").join("2024-01-15.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(day1.as_array().unwrap().len(), 2);
        assert!(root.path().join("general").join("2024-01-16.json").is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dm_export_uses_conversation_id_dir() {
        let root = tempdir().unwrap();
        let api = ScriptedApi::new().on_history("D1", vec![page(vec![msg("1705312800.000001")], "")]);
        let ctx = context(root.path(), false);

        export_conversations(&api, &ctx, ConversationKind::DirectMessage, &[dm("D1", "U1")])
            .await
            .unwrap();

        assert!(root.path().join("D1").join("2024-01-15.json").is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserved_channel_name_uses_prefixed_dir() {
        let root = tempdir().unwrap();
        let api = ScriptedApi::new().on_history("C4", vec![page(vec![msg("1705312800.000001")], "")]);
        let ctx = context(root.path(), false);

        export_conversations(
            &api,
            &ctx,
            ConversationKind::PublicChannel,
            &[channel("C4", "com4", false)],
        )
        .await
        .unwrap();

        assert!(root.path().join("c-com4").join("2024-01-15.json").is_file());
    }
}

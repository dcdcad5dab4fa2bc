use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::Value;

use crate::archive::package_export;
use crate::attachments::download_files;
use crate::cli::ExportArgs;
use crate::error::{AppError, Result};
use crate::export::{
    dm_matches_user, ensure_viewer_root, export_conversations, matches_name,
    select_conversations, write_manifests, ExportContext, Selection, UserDirectory, Workspace,
};
use crate::load_token;
use crate::model::{Conversation, ConversationKind};
use crate::settings::Settings;
use crate::slack::SlackWebClient;

fn resolve_token(token: Option<String>) -> Result<String> {
    match token {
        Some(t) if !t.is_empty() => Ok(t),
        _ => load_token(),
    }
}

/// `<output-dir>/<YYYYmmdd-HHMMSS>-slack_export`
fn export_root(output_dir: &Path) -> PathBuf {
    output_dir.join(format!(
        "{}-slack_export",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

#[cfg(feature = "tui")]
fn prompt_for(
    kind: ConversationKind,
    candidates: Vec<Conversation>,
    users: &UserDirectory,
) -> Result<Vec<Conversation>> {
    let labels: Vec<String> = candidates
        .iter()
        .map(|c| match kind {
            ConversationKind::DirectMessage => users.display_name(c.user()),
            _ => c.name().to_string(),
        })
        .collect();
    let title = format!("Select the {} you want to export", kind.label());
    let picked = crate::picker::pick_many(&title, &labels)?;
    Ok(picked
        .into_iter()
        .filter_map(|i| candidates.get(i).cloned())
        .collect())
}

#[cfg(not(feature = "tui"))]
fn prompt_for(
    _kind: ConversationKind,
    _candidates: Vec<Conversation>,
    _users: &UserDirectory,
) -> Result<Vec<Conversation>> {
    Err(AppError::Prompt(
        "--prompt needs a build with the `tui` feature".to_string(),
    ))
}

fn resolve_selection(
    kind: ConversationKind,
    selection: Selection,
    users: &UserDirectory,
) -> Result<Vec<Conversation>> {
    match selection {
        Selection::Conversations(conversations) => Ok(conversations),
        Selection::Prompt(candidates) => prompt_for(kind, candidates, users),
    }
}

async fn list_if_requested(
    client: &SlackWebClient,
    kind: ConversationKind,
    requested: bool,
    args: &ExportArgs,
    settings: &Settings,
) -> Result<Vec<Conversation>> {
    if !requested {
        println!("Not fetching {}", kind.label());
        return Ok(Vec::new());
    }
    let conversations = client
        .list_conversations(kind, args.exclude_archived, settings.export.list_delay())
        .await?;
    println!("Found {} {}", conversations.len(), kind.label());
    Ok(conversations)
}

pub async fn run_export(args: ExportArgs) -> Result<()> {
    let settings = Settings::load(&args.config)?;
    let token = resolve_token(args.token.clone())?;
    let client = SlackWebClient::new(&token, args.cookie.as_deref())?
        .with_retry_padding(settings.export.pacing().retry_padding);

    let auth = client.auth_test().await?;
    let token_owner_id = auth.user_id.0.clone();
    println!("Successfully authenticated as {}", token_owner_id);

    let users = client.list_users().await?;
    println!("Found {} Users", users.len());
    let user_records: Vec<Value> = users
        .iter()
        .map(|u| serde_json::to_value(u).map_err(|e| AppError::JsonSerialize(e.to_string())))
        .collect::<Result<_>>()?;
    let directory = UserDirectory::from_records(user_records.iter());

    let any_requested = args.public_channels.is_some()
        || args.groups.is_some()
        || args.direct_messages.is_some();

    let workspace = Workspace {
        channels: list_if_requested(
            &client,
            ConversationKind::PublicChannel,
            args.public_channels.is_some() || !any_requested,
            &args,
            &settings,
        )
        .await?,
        groups: list_if_requested(
            &client,
            ConversationKind::PrivateGroup,
            args.groups.is_some() || !any_requested,
            &args,
            &settings,
        )
        .await?,
        dms: list_if_requested(
            &client,
            ConversationKind::DirectMessage,
            args.direct_messages.is_some() || !any_requested,
            &args,
            &settings,
        )
        .await?,
    };

    let root = export_root(Path::new(&settings.export.output_dir));
    fs::create_dir_all(&root).map_err(|e| AppError::WriteFile {
        path: root.display().to_string(),
        source: e,
    })?;

    if !args.dry_run {
        write_manifests(&root, &users, &workspace, &token_owner_id)?;
    }

    let mut channels = resolve_selection(
        ConversationKind::PublicChannel,
        select_conversations(
            workspace.channels.clone(),
            args.public_channels.as_deref(),
            any_requested,
            args.exclude_archived,
            args.prompt,
            matches_name,
        ),
        &directory,
    )?;
    if args.exclude_non_member {
        channels.retain(|c| c.is_member());
    }

    let groups = resolve_selection(
        ConversationKind::PrivateGroup,
        select_conversations(
            workspace.groups.clone(),
            args.groups.as_deref(),
            any_requested,
            args.exclude_archived,
            args.prompt,
            matches_name,
        ),
        &directory,
    )?;

    let dms = resolve_selection(
        ConversationKind::DirectMessage,
        select_conversations(
            workspace.dms.clone(),
            args.direct_messages.as_deref(),
            any_requested,
            args.exclude_archived,
            args.prompt,
            dm_matches_user(&directory),
        ),
        &directory,
    )?;

    let ctx = ExportContext {
        root: root.clone(),
        token_owner_id,
        users: directory,
        pacing: settings.export.pacing(),
        dry_run: args.dry_run,
        progress: true,
    };

    let mut total = 0;
    if !channels.is_empty() {
        total += export_conversations(&client, &ctx, ConversationKind::PublicChannel, &channels)
            .await?;
    }
    if !groups.is_empty() {
        if channels.is_empty() && !ctx.dry_run {
            ensure_viewer_root(&root, &workspace.channels)?;
        }
        total +=
            export_conversations(&client, &ctx, ConversationKind::PrivateGroup, &groups).await?;
    }
    if !dms.is_empty() {
        total +=
            export_conversations(&client, &ctx, ConversationKind::DirectMessage, &dms).await?;
    }

    if ctx.dry_run {
        return Ok(());
    }

    println!(
        "Export completed successfully! {} messages exported to {}",
        total,
        root.display()
    );

    if args.download_slack_files {
        let result = download_files(&client, &root).await?;
        println!(
            "Download completed! {} files downloaded, {} skipped, {} failed.",
            result.downloaded, result.skipped, result.failed
        );
    }

    if let Some(name) = &args.zip {
        let zip_path = package_export(&root, name)?;
        println!("Export packed into {}", zip_path.display());
    }

    Ok(())
}

pub async fn run_download_files(
    dir: &Path,
    token: Option<String>,
    cookie: Option<String>,
) -> Result<()> {
    let token = resolve_token(token)?;
    let client = SlackWebClient::new(&token, cookie.as_deref())?;

    let result = download_files(&client, dir).await?;

    println!(
        "Download completed! {} files downloaded, {} skipped, {} failed.",
        result.downloaded, result.skipped, result.failed
    );
    Ok(())
}

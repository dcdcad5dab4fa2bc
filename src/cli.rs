use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slack-history-export")]
#[command(about = "Export Slack conversation history for offline viewing")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export conversation history into a dated export directory
    Export(ExportArgs),

    /// Download files.slack.com attachments referenced by an existing export
    DownloadFiles {
        /// Export directory to scan for message files
        #[arg(value_name = "EXPORT_DIR")]
        dir: PathBuf,

        /// Slack API token (falls back to SLACK_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Cookie header to send along with an xoxc token
        #[arg(long)]
        cookie: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct ExportArgs {
    /// Slack API token (falls back to SLACK_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Cookie header to send along with an xoxc token
    #[arg(long)]
    pub cookie: Option<String>,

    /// Pack the export into NAME.zip and remove the directory
    #[arg(long, value_name = "NAME")]
    pub zip: Option<String>,

    /// List the conversations that would be exported without fetching history
    #[arg(long)]
    pub dry_run: bool,

    /// Export the given public channels (all of them when no name is given)
    #[arg(long, num_args = 0.., value_name = "CHANNEL_NAME")]
    pub public_channels: Option<Vec<String>>,

    /// Export the given private channels / group DMs (all when no name is given)
    #[arg(long, num_args = 0.., value_name = "GROUP_NAME")]
    pub groups: Option<Vec<String>>,

    /// Export 1:1 DMs with the given users, by name or id (all when none given)
    #[arg(long, num_args = 0.., value_name = "USER_NAME")]
    pub direct_messages: Option<Vec<String>>,

    /// Pick the conversations to export interactively
    #[arg(long)]
    pub prompt: bool,

    /// Download files.slack.com attachments after the export
    #[arg(long)]
    pub download_slack_files: bool,

    /// Skip archived conversations
    #[arg(long)]
    pub exclude_archived: bool,

    /// Only export public channels the token owner is a member of
    #[arg(long)]
    pub exclude_non_member: bool,

    /// Settings file
    #[arg(long, default_value = crate::settings::SETTINGS_FILE)]
    pub config: PathBuf,
}

use crate::config::{ClientConfig, DEFAULT_API_URL};
use crate::hosting::links::DEFAULT_FILES_URL;
use crate::hosting::progress::BatchProgressBar;
use crate::hosting::{SessionClient, WorkItem, delete_batch, download_batch, upload_batch};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use url::Url;

/// Manage files on catbox.
#[derive(Parser)]
#[command(version, about, long_about=None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API endpoint taking upload and delete requests
    #[arg(long, env = "BOIBOX_API_URL", default_value = DEFAULT_API_URL, global = true, hide = true)]
    api_url: Url,

    /// Base URL hosted files are served from
    #[arg(long, env = "BOIBOX_FILES_URL", default_value = DEFAULT_FILES_URL, global = true, hide = true)]
    files_url: Url,
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        let config = ClientConfig::new(self.api_url, self.files_url, self.command.userhash());
        let client = SessionClient::new(config)?;
        let outcome = self.command.execute(&client).await;
        client.close();
        outcome
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload file(s) or URL(s)
    #[command(visible_aliases = ["u", "up"])]
    Upload {
        /// File(s) or http(s) URL(s) to upload
        #[arg(required = true)]
        files: Vec<String>,

        /// userhash from https://catbox.moe/user/manage.php
        #[arg(short, long, env = "USERHASH", hide_env_values = true)]
        userhash: Option<String>,
    },
    /// Delete hosted file(s)
    #[command(visible_aliases = ["r", "remove"])]
    Delete {
        /// URL or name of file(s) to delete
        #[arg(required = true)]
        urls: Vec<String>,

        /// userhash from https://catbox.moe/user/manage.php
        #[arg(short, long, env = "USERHASH", hide_env_values = true)]
        userhash: String,
    },
    /// Download hosted file(s)
    #[command(visible_aliases = ["d", "down"])]
    Download {
        /// URL or name of file(s) to download
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = ".", value_name = "DIR", value_parser = valid_dir)]
        destination: PathBuf,

        /// Print the SHA256 of every downloaded file
        #[arg(short, long)]
        checksum: bool,
    },
}

impl Commands {
    fn userhash(&self) -> Option<String> {
        match self {
            Commands::Upload { userhash, .. } => userhash.clone(),
            Commands::Delete { userhash, .. } => Some(userhash.clone()),
            Commands::Download { .. } => None,
        }
    }

    async fn execute(self, client: &SessionClient) -> anyhow::Result<()> {
        match self {
            Commands::Upload { files, .. } => {
                let items = resolve_uploads(files)?;
                let bar = BatchProgressBar::new(items.len(), interrupt_flag()?);
                upload_batch(client, items, &bar).await
            }
            Commands::Delete { urls, userhash } => {
                let reply = delete_batch(client, &hosted_links(urls), &userhash).await?;
                println!("{reply}");
                Ok(())
            }
            Commands::Download {
                urls,
                destination,
                checksum,
            } => {
                let items = hosted_links(urls);
                let bar = BatchProgressBar::new(items.len(), interrupt_flag()?);
                download_batch(client, items, &destination, checksum, &bar).await
            }
        }
    }
}

fn interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::SeqCst);
    })
    .context("Could not set keyboard interrupt handler.")?;
    Ok(interrupted)
}

fn valid_dir(path: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("Invalid directory: {}", path.display()))
    }
}

fn is_remote(token: &str) -> bool {
    Url::parse(token).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Opens local files up front so unreadable paths fail before anything is sent.
fn resolve_uploads(tokens: Vec<String>) -> anyhow::Result<Vec<WorkItem>> {
    tokens
        .into_iter()
        .map(|token| -> anyhow::Result<WorkItem> {
            if is_remote(&token) {
                return Ok(WorkItem::RemoteUrl { url: token });
            }
            let path = PathBuf::from(token);
            let file = File::open(&path)
                .with_context(|| format!("Cannot read '{}'", path.display()))?;
            if !file.metadata()?.is_file() {
                bail!("'{}' is not a file", path.display());
            }
            Ok(WorkItem::LocalFile { path, file })
        })
        .collect()
}

fn hosted_links(urls: Vec<String>) -> Vec<WorkItem> {
    urls.into_iter()
        .map(|url| WorkItem::HostedLink { url })
        .collect()
}

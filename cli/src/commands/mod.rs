//! CLI command definitions and dispatch.

mod annotate;
mod create;
mod fetch;
mod inspect;
mod login;
mod logout;
mod ls;
mod push;
mod rm;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use a3s_manifest_core::config::{StorageLocation, ToolConfig};
use a3s_manifest_runtime::{ConfiguredCredentials, CredentialStore, ManifestLists};
use clap::{Parser, Subcommand};

/// A3S Manifest: build and push multi-platform manifest lists.
#[derive(Parser)]
#[command(name = "a3s-manifest", version, about)]
pub struct Cli {
    /// Path to the configuration file (default: ~/.a3s/manifest.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Create a local manifest list
    Create(create::CreateArgs),
    /// Set platform information on a member of a local manifest list
    Annotate(annotate::AnnotateArgs),
    /// Push a local manifest list to its registry
    Push(push::PushArgs),
    /// Display a local manifest list or a registry image
    Inspect(inspect::InspectArgs),
    /// Fetch an image or manifest list from its registry, refreshing the cache
    Fetch(fetch::FetchArgs),
    /// List local manifest lists
    Ls(ls::LsArgs),
    /// Delete one or more local manifest lists
    Rm(rm::RmArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
}

/// Return the A3S home directory (~/.a3s).
pub(crate) fn a3s_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".a3s"))
        .unwrap_or_else(|| PathBuf::from(".a3s"))
}

/// Load the configuration, anchoring a relative store path in ~/.
pub fn load_config(path: Option<&Path>) -> Result<ToolConfig, Box<dyn std::error::Error>> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| a3s_dir().join("manifest.yaml"));
    let mut config = ToolConfig::load(&path)?;
    config.storage = anchor_storage(&config.storage, dirs::home_dir().as_deref());
    Ok(config)
}

fn anchor_storage(storage: &StorageLocation, home: Option<&Path>) -> StorageLocation {
    match home {
        Some(home) if storage.root().is_relative() => StorageLocation::new(home.join(storage.root())),
        _ => storage.clone(),
    }
}

/// Open the credential store (~/.a3s/credentials.json).
pub(crate) fn credential_store() -> CredentialStore {
    CredentialStore::new(a3s_dir().join("credentials.json"))
}

/// Open the manifest list service.
pub(crate) fn open_lists(config: &ToolConfig) -> Result<ManifestLists, Box<dyn std::error::Error>> {
    tracing::debug!(storage = %config.storage.root().display(), "Opening manifest store");
    let credentials = ConfiguredCredentials::new(Some(credential_store()), &config.registry);
    Ok(ManifestLists::open(config, Arc::new(credentials))?)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Create(args) => create::execute(args, &config).await,
        Command::Annotate(args) => annotate::execute(args, &config).await,
        Command::Push(args) => push::execute(args, &config).await,
        Command::Inspect(args) => inspect::execute(args, &config).await,
        Command::Fetch(args) => fetch::execute(args, &config).await,
        Command::Ls(args) => ls::execute(args, &config).await,
        Command::Rm(args) => rm::execute(args, &config).await,
        Command::Login(args) => login::execute(args).await,
        Command::Logout(args) => logout::execute(args).await,
    }
}

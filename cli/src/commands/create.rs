//! `a3s-manifest create` command: start a local manifest list.

use a3s_manifest_core::config::ToolConfig;
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct CreateArgs {
    /// Manifest list reference (e.g., "ghcr.io/org/app:v1")
    pub target: String,

    /// Member images (same registry as the list)
    #[arg(required = true)]
    pub members: Vec<String>,

    /// Add members to an existing local list
    #[arg(short, long)]
    pub amend: bool,
}

pub async fn execute(args: CreateArgs, config: &ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lists = super::open_lists(config)?;
    let records = lists.create(&args.target, &args.members, args.amend).await?;

    println!("{}", output::records_table(&records));
    println!("Created manifest list {}", args.target);
    Ok(())
}

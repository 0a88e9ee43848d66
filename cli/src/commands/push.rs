//! `a3s-manifest push` command: push a local manifest list to its registry.

use a3s_manifest_core::config::ToolConfig;
use clap::Args;

#[derive(Args)]
pub struct PushArgs {
    /// Manifest list reference
    pub target: String,

    /// Delete the local list after a successful push
    #[arg(short, long)]
    pub purge: bool,

    /// Only print the pushed digest
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: PushArgs, config: &ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lists = super::open_lists(config)?;

    if !args.quiet {
        println!("Pushing {}...", args.target);
    }

    let outcome = lists.push(&args.target, args.purge).await?;

    if args.quiet {
        println!("{}", outcome.digest);
    } else {
        println!(
            "Pushed: {}@{} ({} members)",
            outcome.target, outcome.digest, outcome.members
        );
    }
    Ok(())
}

//! `a3s-manifest rm` command: delete local manifest lists.

use a3s_manifest_core::config::ToolConfig;
use clap::Args;

#[derive(Args)]
pub struct RmArgs {
    /// Manifest list references
    #[arg(required = true)]
    pub targets: Vec<String>,
}

pub async fn execute(args: RmArgs, config: &ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lists = super::open_lists(config)?;

    let mut failed = Vec::new();
    for target in &args.targets {
        match lists.remove(target) {
            Ok(()) => println!("{target}"),
            Err(e) => {
                eprintln!("Error: {e}");
                failed.push(target.as_str());
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("Failed to remove: {}", failed.join(", ")).into())
    }
}

//! `a3s-manifest fetch` command: fetch an image from its registry.

use a3s_manifest_core::config::ToolConfig;
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct FetchArgs {
    /// Image or manifest list reference
    pub reference: String,
}

pub async fn execute(args: FetchArgs, config: &ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lists = super::open_lists(config)?;
    let records = lists.fetch(&args.reference).await?;

    println!("{}", output::records_table(&records));
    Ok(())
}

//! `a3s-manifest ls` command.

use a3s_manifest_core::config::ToolConfig;
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct LsArgs {
    /// Only show list references (one per line)
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: LsArgs, config: &ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lists = super::open_lists(config)?;
    let transactions = lists.transactions()?;

    if args.quiet {
        for transaction in &transactions {
            println!("{}", transaction.target);
        }
        return Ok(());
    }

    let mut table = output::new_table(&["LIST", "MEMBERS", "PUSHED", "UPDATED"]);
    for transaction in &transactions {
        let pushed = transaction
            .pushed_digest
            .as_ref()
            .map(|d| output::short_digest(&d.to_string()))
            .unwrap_or_else(|| "-".to_string());
        table.add_row([
            transaction.target.clone(),
            transaction.members.to_string(),
            pushed,
            output::format_ago(&transaction.updated_at),
        ]);
    }
    println!("{table}");
    Ok(())
}

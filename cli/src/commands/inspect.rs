//! `a3s-manifest inspect` command: show a local list or a registry image.

use a3s_manifest_core::config::ToolConfig;
use a3s_manifest_runtime::{Inspection, ManifestRecord};
use clap::Args;

use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// Manifest list or image reference
    pub reference: String,

    /// Print the raw manifest JSON instead of a table
    #[arg(long)]
    pub raw: bool,
}

pub async fn execute(args: InspectArgs, config: &ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    let lists = super::open_lists(config)?;

    match lists.inspect(&args.reference).await? {
        Inspection::Transaction {
            target,
            records,
            pushed_digest,
        } => {
            if args.raw {
                let assembled = lists.assemble(&target.full_reference())?;
                println!("{}", String::from_utf8_lossy(&assembled.payload));
                return Ok(());
            }
            println!("Manifest list: {target}");
            if let Some(digest) = pushed_digest {
                println!("Pushed as:     {digest}");
            }
            println!("{}", output::records_table(&records));
        }
        Inspection::Image { reference, records } => {
            if args.raw {
                println!("{}", raw_records(&records)?);
                return Ok(());
            }
            println!("Image: {reference}");
            println!("{}", output::records_table(&records));
        }
    }
    Ok(())
}

/// One record prints verbatim; several print as a JSON array of manifests.
fn raw_records(records: &[ManifestRecord]) -> Result<String, Box<dyn std::error::Error>> {
    if let [record] = records {
        return Ok(String::from_utf8_lossy(record.canonical_bytes()).into_owned());
    }
    let manifests = records
        .iter()
        .map(|r| serde_json::from_slice::<serde_json::Value>(r.canonical_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::to_string_pretty(&manifests)?)
}

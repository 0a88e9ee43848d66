//! `a3s-manifest annotate` command: set platform fields of a list member.

use a3s_manifest_core::config::ToolConfig;
use a3s_manifest_runtime::PlatformAnnotation;
use clap::Args;

#[derive(Args)]
pub struct AnnotateArgs {
    /// Manifest list reference
    pub target: String,

    /// Member image to annotate
    pub member: String,

    /// Operating system (e.g., "linux")
    #[arg(long)]
    pub os: Option<String>,

    /// Architecture (e.g., "arm64")
    #[arg(long)]
    pub arch: Option<String>,

    /// Architecture variant (e.g., "v7"); an empty value clears it
    #[arg(long)]
    pub variant: Option<String>,

    /// CPU features to add (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub cpu_features: Vec<String>,

    /// OS features to add (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub os_features: Vec<String>,
}

impl AnnotateArgs {
    pub(crate) fn annotation(&self) -> PlatformAnnotation {
        PlatformAnnotation {
            os: self.os.clone(),
            architecture: self.arch.clone(),
            variant: self.variant.clone(),
            cpu_features: self.cpu_features.clone(),
            os_features: self.os_features.clone(),
        }
    }
}

pub async fn execute(args: AnnotateArgs, config: &ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    let annotation = args.annotation();
    if annotation.is_empty() {
        return Err("Nothing to annotate: pass at least one of --os, --arch, --variant, --cpu-features, --os-features".into());
    }

    let lists = super::open_lists(config)?;
    let record = lists.annotate(&args.target, &args.member, &annotation).await?;

    println!("{} {}", record.digest(), record.platform);
    Ok(())
}

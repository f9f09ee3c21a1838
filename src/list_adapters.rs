//! adapters command: list site adapters or show which one handles a URL

use crate::render::Html2TextRenderer;
use crate::session::ProcessPolicy;
use crate::sites::builtin_registry;
use crate::strategy::StrategyExecutor;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::sync::Arc;

#[derive(Args)]
pub struct AdaptersArgs {
    /// Show which adapter would handle this URL
    #[arg(long)]
    url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdapterInfo {
    pub name: &'static str,
    pub process: ProcessPolicy,
}

#[derive(Debug, Serialize)]
pub struct Resolution {
    pub url: String,
    pub adapter: &'static str,
    pub process: ProcessPolicy,
}

/// Run the adapters command
pub fn run_adapters(args: AdaptersArgs) -> Result<()> {
    let registry = builtin_registry(
        Arc::new(StrategyExecutor::default()),
        Arc::new(Html2TextRenderer::default()),
    );

    if let Some(url) = args.url {
        let adapter = registry.resolve(&url);
        let resolution = Resolution {
            adapter: adapter.name(),
            process: ProcessPolicy::from_preference(adapter.prefers_shared_process()),
            url,
        };
        println!("{}", serde_json::to_string(&resolution)?);
        return Ok(());
    }

    let adapters: Vec<AdapterInfo> = registry
        .iter()
        .map(|a| AdapterInfo {
            name: a.name(),
            process: ProcessPolicy::from_preference(a.prefers_shared_process()),
        })
        .collect();
    println!("{}", serde_json::to_string(&adapters)?);
    Ok(())
}

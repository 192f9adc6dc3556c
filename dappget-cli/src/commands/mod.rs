pub mod resolve;
pub mod update;

use anyhow::Result;
use clap::Args;
use dappget_core::progress::{ProgressEvent, ProgressObserver};
use dappget_core::registry::{MemoryRegistry, StaticInstalledState};
use dappget_core::{DappGet, DappGetConfig, Request, console};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Arguments shared by every command that runs a resolution.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Package to resolve, as `name` or `name@version`
    pub package: String,

    /// JSON registry document listing every release and its dependencies
    #[arg(long)]
    pub registry: PathBuf,

    /// JSON map of installed package versions
    #[arg(long)]
    pub installed: Option<PathBuf>,

    /// Maximum concurrent manifest fetches
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

pub struct Target {
    pub request: Request,
    pub service: DappGet,
    pub installed: Arc<StaticInstalledState>,
}

impl TargetArgs {
    pub fn build(&self, config: &DappGetConfig) -> Result<Target> {
        let mut config = config.clone();

        if let Some(concurrency) = self.concurrency.filter(|c| *c > 0) {
            config.fetch_concurrency = concurrency;
        }
        if let Some(secs) = self.timeout.filter(|s| *s > 0) {
            config.timeout = Duration::from_secs(secs);
        }

        let registry = Arc::new(MemoryRegistry::load(&self.registry)?);
        let installed = match &self.installed {
            Some(path) => Arc::new(StaticInstalledState::load(path)?),
            None => {
                if !self.json {
                    console::warn("no --installed file given, assuming nothing is installed");
                }
                Arc::new(StaticInstalledState::default())
            }
        };

        let mut service = DappGet::new(registry, installed.clone(), config);
        if !self.json {
            service = service.with_observer(console_observer());
        }

        Ok(Target {
            request: Request::parse(&self.package),
            service,
            installed,
        })
    }
}

fn console_observer() -> ProgressObserver {
    let fetched = AtomicUsize::new(0);

    Arc::new(move |event: &ProgressEvent| match event {
        ProgressEvent::Fetched { .. } => {
            let count = fetched.fetch_add(1, Ordering::Relaxed) + 1;
            console::step_with_count("Fetching manifests", count);
        }
        ProgressEvent::Aggregated { packages, versions } => {
            console::clear_line();
            console::step(&format!(
                "Found {} versions across {} packages\n",
                versions, packages
            ));
        }
        ProgressEvent::Resolving { name } => {
            console::step(&format!("Resolving {}\n", name));
        }
        ProgressEvent::Aggregating { .. } | ProgressEvent::Resolved { .. } => {}
    })
}

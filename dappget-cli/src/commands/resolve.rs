use super::TargetArgs;
use anyhow::Result;
use clap::Args;
use dappget_core::version::should_update;
use dappget_core::{DappGetConfig, console};

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, PartialEq, Eq)]
enum Change<'a> {
    Added,
    Unchanged,
    Upgraded { from: &'a str },
    Downgraded { from: &'a str },
}

fn classify<'a>(installed: Option<&'a str>, resolved: &str) -> Change<'a> {
    match installed {
        None => Change::Added,
        Some(current) if current == resolved => Change::Unchanged,
        Some(current) if should_update(current, resolved) => Change::Upgraded { from: current },
        Some(current) => Change::Downgraded { from: current },
    }
}

pub async fn run(args: ResolveArgs, config: &DappGetConfig) -> Result<()> {
    if !args.target.json {
        console::header("resolve", env!("CARGO_PKG_VERSION"));
    }

    let target = args.target.build(config)?;
    let resolution = target.service.resolve(&target.request).await?;

    if args.target.json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
        return Ok(());
    }

    for (name, version) in &resolution {
        let installed = target.installed.versions().get(name).map(String::as_str);
        match classify(installed, version) {
            Change::Added => console::added(name, version),
            Change::Unchanged => console::unchanged(name, version),
            Change::Upgraded { from } => console::upgraded(name, from, version),
            Change::Downgraded { from } => console::downgraded(name, from, version),
        }
    }

    Ok(())
}

use super::TargetArgs;
use anyhow::Result;
use clap::Args;
use dappget_core::{DappGetConfig, console};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn run(args: UpdateArgs, config: &DappGetConfig) -> Result<()> {
    if !args.target.json {
        console::header("update", env!("CARGO_PKG_VERSION"));
    }

    let target = args.target.build(config)?;
    let diff = target.service.update(&target.request).await?;

    if args.target.json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(());
    }

    if diff.is_empty() {
        console::info(&format!(
            "{} is already satisfied, nothing to do.",
            target.request
        ));
        return Ok(());
    }

    for (name, version) in &diff {
        match target.installed.versions().get(name) {
            Some(installed) => console::upgraded(name, installed, version),
            None => console::added(name, version),
        }
    }

    console::summary(diff.len());

    Ok(())
}

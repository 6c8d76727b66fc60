// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context};
use docpipe::backends::local::StageRegistry;
use docpipe::config::{load_and_validate_config, FsDescriptorResolver};
use docpipe::engine::{DeploymentSelector, Pipeline};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STDIN_ARG: &str = "-";

/// Documents named on the command line. `-` reads one document from stdin.
fn read_documents(paths: &[String]) -> anyhow::Result<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            if path == STDIN_ARG {
                let mut text = String::new();
                io::stdin()
                    .read_to_string(&mut text)
                    .context("failed to read document from stdin")?;
                Ok(text)
            } else {
                fs::read_to_string(path).with_context(|| format!("failed to read document '{}'", path))
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docpipe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <pipeline.yaml> <document> [document ...]", args[0]);
        eprintln!("       {} <pipeline.yaml> -   (read one document from stdin)", args[0]);
        bail!("missing arguments");
    }

    let config = load_and_validate_config(&args[1])
        .with_context(|| format!("failed to load pipeline config '{}'", args[1]))?;
    let documents = read_documents(&args[2..])?;

    let selector = DeploymentSelector::standard(Arc::new(StageRegistry::with_builtins()), &config);
    let resolver = Arc::new(FsDescriptorResolver::new(config.descriptor_root.clone()));
    let pipeline = Pipeline::build(&config, &selector, resolver)
        .await
        .context("failed to deploy pipeline")?;

    let outcome = pipeline.run(documents).await;
    pipeline.finish().await;

    let results = outcome.context("pipeline run failed")?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

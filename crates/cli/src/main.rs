//! `analysis-cli` -- compute an analysis job from a JSON description.
//!
//! Loads the job file given as the only argument, submits it to the
//! analysis service, waits for every job to settle and prints the
//! outcome as JSON. Exits with status 1 when any job failed.
//!
//! # Environment variables
//!
//! | Variable                   | Required | Default | Description                    |
//! |----------------------------|----------|---------|--------------------------------|
//! | `ANALYSIS_API_URL`         | yes      | --      | Base URL of the analysis API   |
//! | `ANALYSIS_API_TOKEN`       | no       | --      | Bearer token                   |
//! | `ANALYSIS_POLL_MAX_ATTEMPTS` | no     | `600`   | Result fetches before timing out |
//! | `ANALYSIS_DEFAULT_DOMAIN_ID` | no     | --      | Domain for analyses naming none |
//!
//! See [`ClientConfig::from_env`] for the full list.

use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analysis_cli::job_file;
use analysis_jobs::{ClientConfig, Filters, JobController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analysis_cli=info,analysis_jobs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: analysis-cli <job.json>")?;

    let file = job_file::load(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    let mut config = ClientConfig::from_env().context("loading configuration")?;
    if let Some(selection) = file.default_selection.clone() {
        config = config.with_default_filters(Filters::new(selection));
    }

    let job = file
        .to_job(config.default_domain_id.as_ref())
        .context("building job")?;
    let controller = JobController::from_config(&config).context("creating HTTP client")?;

    tracing::info!(api_url = %config.api_url, "Starting analysis computation");

    let interrupt = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling computation");
            interrupt.shutdown();
        }
    });

    let result = controller.compute(&job, None).await;

    let rendered = job_file::render(&job).await;
    println!("{}", serde_json::to_string_pretty(&rendered)?);

    if let Err(e) = result {
        tracing::error!(error = %e, "Analysis computation failed");
        std::process::exit(1);
    }
    Ok(())
}

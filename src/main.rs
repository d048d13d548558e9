use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use codeseek_core::bootstrap::{self, AppBuilder};
use codeseek_core::resolve_config_path;
use codeseek_index::{IndexJob, JobStatus, format_results};
use tokio_util::sync::CancellationToken;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "codeseek", version, about = "Index a repository and search it by meaning")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index a repository (incremental unless --force).
    Index {
        repo: PathBuf,
        /// Discard the hash cache and all stored chunks for the repository.
        #[arg(long)]
        force: bool,
        /// Run inline and print the finished job as JSON.
        #[arg(long)]
        wait: bool,
    },
    /// Show the index status of a repository.
    Status { repo: PathBuf },
    /// Search an indexed repository.
    Search {
        repo: PathBuf,
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Delete the hash cache of a repository.
    ClearCache { repo: PathBuf },
    /// Check that the embedding backend answers.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let app = AppBuilder::from_path(&config_path)?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        signal.cancel();
    });

    match cli.command {
        Command::Index { repo, force, wait } => {
            run_index(&app, &absolute(&repo)?, force, wait, &cancel).await
        }
        Command::Status { repo } => {
            let indexer = app.build_indexer(app.build_embedder()?, app.build_store()?)?;
            let status = indexer.get_repo_index(&absolute(&repo)?).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Search {
            repo,
            query,
            limit,
            json,
        } => {
            let searcher = app.build_searcher(app.build_embedder()?, app.build_store()?);
            let limit = limit.unwrap_or(searcher.config().max_results);
            let results = searcher
                .search_with_limit(&query.join(" "), &absolute(&repo)?, limit, &cancel)
                .await
                .context("search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print!("{}", format_results(&results));
            }
            Ok(())
        }
        Command::ClearCache { repo } => {
            let repo = absolute(&repo)?;
            let indexer = app.build_indexer(app.build_embedder()?, app.build_store()?)?;
            indexer.clear_cache(&repo)?;
            println!("cache cleared for {}", repo.display());
            Ok(())
        }
        Command::Health => {
            let embedder = app.build_embedder()?;
            bootstrap::health_check(&embedder).await?;
            let cfg = embedder.config();
            println!("embedding backend ok: {} ({})", cfg.base_url, cfg.model);
            Ok(())
        }
    }
}

async fn run_index(
    app: &AppBuilder,
    repo: &Path,
    force: bool,
    wait: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let indexer = app.build_indexer(app.build_embedder()?, app.build_store()?)?;

    let job = if wait {
        let job = indexer.index_and_wait(repo, force, cancel.clone()).await?;
        println!("{}", serde_json::to_string_pretty(&job)?);
        job
    } else {
        let started = indexer.index(repo, force, cancel.clone()).await?;
        println!("started {} for {}", started.id, repo.display());

        let reporter = {
            let indexer = indexer.clone();
            let id = started.id.clone();
            let stop = cancel.child_token();
            let guard = stop.clone();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = stop.cancelled() => break,
                        () = tokio::time::sleep(PROGRESS_INTERVAL) => {}
                    }
                    if let Ok(job) = indexer.get_job(&id).await {
                        tracing::info!(
                            job_id = %job.id,
                            files = job.files_processed,
                            total = job.total_files,
                            chunks = job.total_chunks,
                            "progress {:.0}%",
                            job.progress * 100.0
                        );
                    }
                }
            });
            (guard, handle)
        };

        let finished = indexer.wait_for_job(&started.id, cancel).await;
        reporter.0.cancel();
        let _ = reporter.1.await;
        let job = finished?;
        println!("{}", summary(&job));
        job
    };

    if job.status == JobStatus::Failed {
        bail!(job.error.unwrap_or_else(|| "indexing failed".into()));
    }
    Ok(())
}

fn summary(job: &IndexJob) -> String {
    let elapsed = job
        .end_time
        .map(|end| (end - job.start_time).num_milliseconds())
        .unwrap_or_default();
    format!(
        "{} {}: {}/{} files, {} chunks in {elapsed} ms",
        job.id,
        job.status.as_str(),
        job.files_processed,
        job.total_files,
        job.total_chunks,
    )
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("invalid path {}", path.display()))
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_joins_query_words() {
        let cli = Cli::parse_from(["codeseek", "search", "/repo", "validate", "token", "--limit", "3"]);
        match cli.command {
            Command::Search { repo, query, limit, json } => {
                assert_eq!(repo, PathBuf::from("/repo"));
                assert_eq!(query.join(" "), "validate token");
                assert_eq!(limit, Some(3));
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["codeseek", "index", "/repo", "--force", "--config", "x.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Command::Index { force: true, wait: false, .. }));
    }
}

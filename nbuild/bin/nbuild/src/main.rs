//! The `nbuild` process: loads one `NBUILD_CONFIG` document and runs
//! whichever of the graph, scheduler, and reciever components
//! `NBUILD_COMPONENTS` names, all under one HTTP listener bound at
//! `NBUILD_BIND` (spec section 6).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tokio::sync::watch;

use nbuild_capacity::{CapacityProvider, ClusterCapacityProvider, LocalCapacityProvider};
use nbuild_config::Config;
use nbuild_graph::Manager;
use nbuild_metahelper::{ExternalMetaHelper, ExternalNameNormalizer};
use nbuild_repodata::IndexService;
use nbuild_scheduler::{GraphClient, HttpGraphClient, InProcessGraphClient, Scheduler};
use nbuild_source::{GitCheckout, SourceCheckout};
use nbuild_storage::{FileStorage, Storage};

/// Package-build orchestrator: graph manager, dispatch scheduler, and
/// artifact receiver, selectable per process via `NBUILD_COMPONENTS`.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Overrides `NBUILD_CONFIG`; path to a JSON config document.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, default_value = "text")]
    log_format: String,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start tokio runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };
    nbuild_cliutil::handle_top_level_result(runtime.block_on(run(cli)))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    nbuild_cliutil::setup_logging(cli.log_format == "json")?;
    nbuild_cliutil::log_current_command_line();

    let cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::from_env()?,
    };
    let components: HashSet<String> = nbuild_config::requested_components()?.into_iter().collect();
    let bind = nbuild_config::bind_address()?;

    let mut router = Router::new();
    let mut manager: Option<Arc<Manager>> = None;
    let mut checkout: Option<Arc<dyn SourceCheckout>> = None;

    if components.contains("graph") || (components.contains("scheduler") && cfg.capacity_provider == "local") {
        let git = Arc::new(GitCheckout::new(cfg.source_path.clone(), cfg.source_url.clone()));
        checkout = Some(git);
    }

    if components.contains("graph") {
        let checkout = checkout.clone().expect("graph component always constructs a checkout");

        let index = Arc::new(IndexService::new());
        for (arch, repos) in &cfg.repo_data_urls {
            for (repo_name, url) in repos {
                index.load_index(arch, repo_name, url).await.with_context(|| {
                    format!("failed to load initial repodata for {arch}/{repo_name}")
                })?;
            }
        }

        let storage_root = PathBuf::from(&cfg.repo_path).join("storage");
        let storage = Arc::new(FileStorage::open(storage_root)?) as Arc<dyn Storage>;

        let mgr = Arc::new(Manager::new(
            cfg.specs.clone(),
            cfg.source_path.clone(),
            checkout,
            index,
            storage,
            Arc::new(ExternalMetaHelper::default()),
            Arc::new(ExternalNameNormalizer::default()),
        ));
        mgr.bootstrap().await.context("failed to bootstrap graph manager")?;
        mgr.clean().await.context("failed to clean graph manager on startup")?;

        router = router.nest("/api/graph", nbuild_http::graph_router(mgr.clone()));
        manager = Some(mgr);
    }

    if components.contains("scheduler") {
        let capacity: Arc<dyn CapacityProvider> = match cfg.capacity_provider.as_str() {
            "local" => {
                let checkout = checkout.clone().expect("local capacity provider always constructs a checkout");
                Arc::new(LocalCapacityProvider::new(checkout))
            }
            "cluster" => {
                let base_url = std::env::var("NBUILD_CLUSTER_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:4646".to_string());
                Arc::new(ClusterCapacityProvider::new(base_url))
            }
            other => anyhow::bail!("unknown capacity provider {other:?}"),
        };
        capacity.set_slots(cfg.build_slots.clone());

        let graph_client: Arc<dyn GraphClient> = match &manager {
            Some(mgr) => Arc::new(InProcessGraphClient::new(mgr.clone())),
            None => Arc::new(HttpGraphClient::new("http://localhost:8080")),
        };

        let scheduler = Arc::new(Scheduler::new(graph_client, capacity));
        router = router.nest("/api/scheduler", nbuild_http::scheduler_router(scheduler.clone()));
        tokio::spawn(scheduler.run());
    }

    if components.contains("reciever") {
        let receiver = Arc::new(nbuild_http::Receiver::new(cfg.repo_path.clone()));
        router = router.nest("/api/reciever", nbuild_http::receiver_router(receiver));
    }

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(%bind, ?components, "nbuild serving");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    std::thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(err) => {
                tracing::error!(%err, "failed to register signal handler");
                return;
            }
        };
        for _ in signals.forever() {
            let _ = shutdown_tx.send(true);
            break;
        }
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("shutting down");
        })
        .await
        .context("server error")?;

    tracing::info!("goodbye");
    Ok(())
}

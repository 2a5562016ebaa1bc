#![allow(dead_code)]
mod app_config;
mod db_core;
mod email;
mod error;
mod model;
mod observability;
mod pipeline;
mod prompt;
mod rate_limiters;
mod testing;
mod util;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use app_config::JanitorConfig;
use email::{auth::GmailTokenProvider, client::GmailClient, MailStore};
use mimalloc::MiMalloc;
use pipeline::{
    collector::Collector,
    coordinator::ClassificationCoordinator,
    labeler::{LabelNames, Labeler},
    recorder::RunRecorder,
    Pipeline,
};
use prompt::{ChatClassifier, ClassifierRole};
use rate_limiters::RateLimiters;
use tokio::{signal, sync::Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;
type RunLock = Arc<Mutex<()>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let config = match JanitorConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("{}", config);

    let conn = db_core::connect(&config.database.path).await?;
    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;

    let tokens = GmailTokenProvider::new(http_client.clone(), &config.gmail)?;
    let store: Arc<dyn MailStore> = Arc::new(GmailClient::new(
        http_client.clone(),
        tokens,
        config.collector.max_items,
    ));

    let rate_limiters = RateLimiters::from_limits(&config.model.prompt_limits);
    let classifier = |role| {
        Arc::new(ChatClassifier::new(
            http_client.clone(),
            rate_limiters.clone(),
            &config.model,
            role,
            config.consensus.scale,
        ))
    };

    let pipeline = Arc::new(Pipeline::new(
        Collector::new(
            store.clone(),
            &config.gmail.inbox_query,
            &config.gmail.processed_label,
        ),
        ClassificationCoordinator::new(
            classifier(ClassifierRole::Primary),
            classifier(ClassifierRole::Critic),
            config.consensus,
        ),
        Labeler::new(store, LabelNames::from_config(&config.gmail)),
        RunRecorder::new(conn),
    ));

    match pipeline.recorder().recent_runs(1).await {
        Ok(runs) => {
            if let Some(last) = runs.first() {
                tracing::info!(
                    "Last run {} started {} with status {} ({} collected)",
                    last.run_id,
                    last.started_at,
                    last.status,
                    last.emails_collected
                );
            }
        }
        Err(e) => tracing::warn!("Could not read run history: {}", e),
    }

    let cancel = CancellationToken::new();

    if config.settings.run_once {
        let token = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown requested, finishing current item");
            token.cancel();
        });

        let summary = pipeline.run_once(&cancel).await?;
        tracing::info!("Run {} finished with status {}", summary.run_id, summary.status);
        return Ok(());
    }

    let run_lock: RunLock = Arc::new(Mutex::new(()));
    let mut scheduler = JobScheduler::new().await?;

    {
        let pipeline = pipeline.clone();
        let lock = run_lock.clone();
        let token = cancel.clone();
        scheduler
            .add(Job::new_one_shot_async(
                Duration::from_secs(1),
                move |uuid, l| run_job(uuid, l, pipeline.clone(), lock.clone(), token.clone()),
            )?)
            .await?;
    }

    {
        let pipeline = pipeline.clone();
        let lock = run_lock.clone();
        let token = cancel.clone();
        // Every poll interval; overlapping ticks are skipped
        scheduler
            .add(Job::new_repeated_async(
                Duration::from_secs(config.settings.poll_interval_secs),
                move |uuid, l| run_job(uuid, l, pipeline.clone(), lock.clone(), token.clone()),
            )?)
            .await?;
    }

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    scheduler.start().await?;
    tracing::info!(
        "Email janitor running every {}s",
        config.settings.poll_interval_secs
    );

    shutdown_signal().await;
    tracing::info!("Shutdown requested, waiting for the current run to finish");
    cancel.cancel();
    scheduler.shutdown().await?;
    let _guard = run_lock.lock().await;
    tracing::info!("Cleanups done, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn run_job(
    uuid: Uuid,
    mut l: JobScheduler,
    pipeline: Arc<Pipeline>,
    lock: RunLock,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
    Box::pin(async move {
        let Ok(_guard) = lock.try_lock() else {
            tracing::info!("Job {}: previous run still in progress, skipping tick", uuid);
            return;
        };
        if cancel.is_cancelled() {
            return;
        }

        match pipeline.run_once(&cancel).await {
            Ok(summary) => {
                tracing::info!("Job {} finished run {} ({})", uuid, summary.run_id, summary.status);
            }
            Err(e) => {
                tracing::error!("Job {} failed: {:?}", uuid, e);
            }
        }

        let next_tick = l.next_tick_for_job(uuid).await;
        if let Ok(Some(ts)) = next_tick {
            tracing::debug!("Next run at {:?}", ts)
        }
    })
}

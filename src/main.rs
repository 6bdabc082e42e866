use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use cluster_sentinel::bot::handler::{sweep_sessions, BotHandler};
use cluster_sentinel::bot::sessions::SessionStore;
use cluster_sentinel::clients::registry::ClusterRegistry;
use cluster_sentinel::clients::{ApiClient, HealthSource};
use cluster_sentinel::config::Config;
use cluster_sentinel::monitor::dispatch::{Dispatcher, RetryPolicy};
use cluster_sentinel::monitor::report::{FileReportSink, ReportSink};
use cluster_sentinel::monitor::scheduler::{drain, PollLoop, ReportLoop};
use cluster_sentinel::monitor::store::SnapshotStore;
use cluster_sentinel::routes;
use cluster_sentinel::transport::log::LogTransport;
use cluster_sentinel::transport::telegram::TelegramTransport;
use cluster_sentinel::transport::Transport;
use cluster_sentinel::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cluster_sentinel=info".parse().unwrap()),
        )
        .init();

    let config_path = std::env::args()
        .skip(1)
        .zip(std::env::args().skip(2))
        .find_map(|(k, v)| {
            if k == "-config" || k == "--config" {
                Some(v)
            } else {
                None
            }
        })
        .or_else(|| std::env::args().nth(1).filter(|a| !a.starts_with('-')))
        .unwrap_or_else(|| "/etc/cluster-sentinel/config.yaml".to_string());

    let cfg = Config::load(&PathBuf::from(&config_path)).unwrap_or_else(|e| {
        eprintln!("error loading config: {}", e);
        std::process::exit(1);
    });

    let mut sources: Vec<(String, Arc<dyn HealthSource>)> = Vec::new();
    for c in &cfg.clusters {
        let token = c.resolve_token();
        if token.is_none() {
            warn!(cluster = %c.name, "no API token configured, requests will be anonymous");
        }
        let client = ApiClient::new(
            c.name.clone(),
            c.api_url.clone(),
            token,
            cfg.fetch_timeout(),
            c.insecure_skip_tls_verify,
        )
        .unwrap_or_else(|e| {
            eprintln!("cluster {}: {}", c.name, e);
            std::process::exit(1);
        });
        sources.push((c.name.clone(), Arc::new(client) as Arc<dyn HealthSource>));
    }

    let registry = Arc::new(ClusterRegistry::new(sources, cfg.fetch_timeout()));
    let store = Arc::new(SnapshotStore::with_limits(cfg.alerts));
    let cfg = Arc::new(cfg);

    let (transport, targets): (Arc<dyn Transport>, Vec<String>) = match &cfg.telegram {
        Some(tg) => {
            let token = tg.resolve_token().unwrap_or_else(|| {
                eprintln!("telegram: bot_token or bot_token_env is required");
                std::process::exit(1);
            });
            let telegram = TelegramTransport::new(
                &tg.api_base,
                &token,
                Duration::from_secs(tg.poll_timeout_secs),
            )
            .unwrap_or_else(|e| {
                eprintln!("telegram: {}", e);
                std::process::exit(1);
            });
            (Arc::new(telegram) as Arc<dyn Transport>, tg.chat_ids.clone())
        }
        None => {
            info!("no telegram section, notifications go to the log");
            (Arc::new(LogTransport) as Arc<dyn Transport>, vec!["log".to_string()])
        }
    };

    let policy = RetryPolicy::from_config(&cfg.notifications);
    let dispatcher = Arc::new(
        Dispatcher::new(
            transport.clone(),
            targets,
            policy,
            cfg.notifications.notify_resolved,
        )
        .with_changes(cfg.notifications.notify_changes),
    );
    let sink: Arc<dyn ReportSink> = Arc::new(FileReportSink::new(
        &cfg.reports.directory,
        cfg.reports.max_age_days,
    ));

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    let mut tasks = JoinSet::new();

    for c in &cfg.clusters {
        let poll = PollLoop::new(
            c.name.clone(),
            registry.clone(),
            store.clone(),
            dispatcher.clone(),
            cfg.failure_threshold,
        );
        tasks.spawn(poll.run(c.poll_interval(), shutdown_rx.clone()));

        let reports = ReportLoop::new(c.name.clone(), registry.clone(), sink.clone(), cfg.thresholds);
        tasks.spawn(reports.run(c.report_interval(), shutdown_rx.clone()));
        info!(
            cluster = %c.name,
            poll_secs = c.poll_interval_secs,
            report_secs = c.report_interval_secs,
            "monitoring cluster"
        );
    }

    if let Some(tg) = &cfg.telegram {
        let sessions = Arc::new(SessionStore::from_config(&cfg.sessions));
        let handler = Arc::new(BotHandler::new(
            registry.clone(),
            sink.clone(),
            sessions.clone(),
            transport.clone(),
            policy,
            cfg.thresholds,
            tg.authorized_users.clone(),
        ));
        tasks.spawn(handler.run(shutdown_rx.clone()));
        tasks.spawn(sweep_sessions(
            sessions,
            Duration::from_secs(cfg.sessions.sweep_interval_secs.max(1)),
            shutdown_rx.clone(),
        ));
    }

    let state = AppState {
        registry,
        store,
        config: cfg.clone(),
    };

    let router = routes::build_router(state);

    let listen_addr = cfg.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await.unwrap_or_else(|e| {
        eprintln!("failed to bind {}: {}", listen_addr, e);
        std::process::exit(1);
    });

    info!("cluster-sentinel listening on {}", listen_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(());
        })
        .await
        .unwrap_or_else(|e| {
            eprintln!("server error: {}", e);
            std::process::exit(1);
        });

    info!(tasks = tasks.len(), "waiting for background tasks");
    let aborted = drain(tasks, cfg.shutdown_grace()).await;
    info!(aborted, "cluster-sentinel stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {}", e);
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
                error!("failed to listen for SIGTERM: {}", e);
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

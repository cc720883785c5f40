//! relay-engine — the real-time rules engine process.
//!
//! Subscribes to device telemetry over ZeroMQ, runs matching rules
//! through the sandboxed Script Runtime, dispatches their results to
//! configured outputs, and drives the time-driven scheduler on the
//! side.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use re_core::config::Config;
use re_core::ports::{PubSub, RuleRepository, Ticker};
use re_notify::SmtpEmailer;
use re_rules::dispatch::OutputDispatcher;
use re_rules::ingress::throttle::ThrottleGuard;
use re_rules::ingress::IngressHandler;
use re_rules::repository::FileRuleRepository;
use re_rules::runtime::lua::LuaRuntime;
use re_rules::runtime::typed::NativeRuntime;
use re_rules::scheduler::{IntervalTicker, Scheduler, SchedulerDeps};
use re_rules::worker::WorkerManager;
use re_transport::{MetricsCollector, Transport, ZmqPubSub};

/// relay-engine — subscribe, evaluate, dispatch, schedule.
#[derive(Parser, Debug)]
#[command(name = "relay-engine", version, about)]
struct Cli {
    /// Named config profile (falls back to unprefixed env vars).
    #[arg(long, env = "RE_PROFILE", default_value = "")]
    profile: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    re_core::config::load_dotenv();
    let cli = Cli::parse();
    let config = Config::for_profile(&cli.profile);
    config.log_summary();

    let pubsub: Arc<dyn PubSub> = Arc::new(
        ZmqPubSub::connect(
            &Transport::from_endpoint(&config.broker.frontend),
            &Transport::from_endpoint(&config.broker.backend),
        )
        .await?,
    );

    let repository = Arc::new(FileRuleRepository::open(config.rules.dir.clone(), pubsub.clone())?);
    if config.rules.hot_reload {
        repository.watch()?;
    }

    let emailer = Arc::new(SmtpEmailer::from_config(&config.smtp)?);
    let dispatcher = Arc::new(OutputDispatcher::new(pubsub.clone(), emailer.clone()));

    let (run_info_tx, mut run_info_rx) = mpsc::channel::<re_core::message::RunInfo>(1024);
    tokio::spawn(async move {
        while let Some(info) = run_info_rx.recv().await {
            info!(level = ?info.level, text = %info.text, "rule run");
        }
    });

    let worker_deps = re_rules::worker::WorkerDeps {
        lua_runtime: Arc::new(LuaRuntime::new()),
        native_runtime: Arc::new(NativeRuntime::new()),
        dispatcher: dispatcher.clone(),
        emailer: emailer.clone(),
        pubsub: pubsub.clone(),
        repository: repository.clone() as Arc<dyn re_core::ports::RuleRepository>,
        run_info_tx: run_info_tx.clone(),
    };
    let manager = WorkerManager::start(worker_deps, config.ingress.worker_queue_capacity);

    let session = re_core::Session::new("re-relay-engine", String::new(), true);
    let existing = repository
        .list_rules(&session, re_core::ports::RuleFilter::default())
        .await?;
    for rule in existing.items {
        if rule.status == re_core::RuleStatus::Enabled {
            manager.add(rule).await;
        }
    }

    let throttle = ThrottleGuard::new(config.throttle.clone());
    throttle.spawn_janitor();
    let ingress = Arc::new(IngressHandler::new(
        repository.clone() as Arc<dyn re_core::ports::RuleRepository>,
        manager.clone(),
        throttle,
        config.ingress.max_payload_bytes,
    ));

    let metrics = MetricsCollector::new();
    let (metrics_shutdown_tx, metrics_shutdown_rx) = tokio::sync::watch::channel(false);
    re_transport::metrics::spawn_tick_task(metrics.clone(), metrics_shutdown_rx);

    let ingress_for_sub = ingress.clone();
    let metrics_for_sub = metrics.clone();
    pubsub
        .subscribe(
            "",
            Box::new(move |message| {
                let ingress = ingress_for_sub.clone();
                let metrics = metrics_for_sub.clone();
                Box::pin(async move {
                    metrics.record_message(&message.topic(), message.payload.len() as u64).await;
                    if let Err(e) = ingress.handle(message).await {
                        warn!(error = %e, "ingress handling failed");
                    }
                })
            }),
        )
        .await?;

    let scheduler_deps = SchedulerDeps {
        repository: repository.clone() as Arc<dyn re_core::ports::RuleRepository>,
        lua_runtime: Arc::new(LuaRuntime::new()),
        native_runtime: Arc::new(NativeRuntime::new()),
        dispatcher,
        emailer,
        pubsub: pubsub.clone(),
        run_info_tx,
    };
    let ticker: Arc<dyn Ticker> = Arc::new(IntervalTicker::new(config.scheduler.tick_interval));
    let scheduler = Arc::new(Scheduler::new(ticker, scheduler_deps, None));
    let scheduler_stop = scheduler.stop_handle();
    let scheduler_for_run = scheduler.clone();
    tokio::spawn(async move {
        let _ = scheduler_for_run.run().await;
    });

    info!("relay-engine started");
    tokio::signal::ctrl_c().await?;
    info!("relay-engine shutting down");

    scheduler_stop.notify_one();
    manager.stop_all().await;
    let _ = metrics_shutdown_tx.send(true);
    pubsub.close().await?;

    info!("relay-engine exited cleanly");
    Ok(())
}

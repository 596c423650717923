//! spool: run producers, workers and garbage collection against a SQLite queue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use spool_core::app::{
    ExecutionRecorder, GcLoop, Producer, QueueBuilder, QueueEngine, WorkerGroup, WorkerLoop,
};
use spool_core::impls::{ActionRegistry, SqliteStore};
use spool_core::ports::{ActionError, ActionHandler, SystemClock, TaskStatsStore};
use spool_core::SpoolConfig;

#[derive(Parser)]
#[command(name = "spool", version, about = "Lease-based task queue over SQLite")]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides `store.path`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue each configured task whose schedule is due now
    Tick,
    /// Claim and execute tasks until Ctrl-C
    Work {
        /// One claim per queue, then exit
        #[arg(long)]
        once: bool,
    },
    /// One garbage collection pass over every configured queue
    Gc,
    /// Lease-state counts per queue, as JSON
    Status,
    /// Delete every item of a queue
    Purge { queue: String },
}

/// Fires configured actions by logging them; real hooks plug in as more
/// `ActionHandler`s on the same registry.
struct LogAction;

#[async_trait]
impl ActionHandler for LogAction {
    async fn handle(&self, action: &str) -> Result<(), ActionError> {
        tracing::info!(action, "action fired");
        Ok(())
    }
}

struct Spool {
    config: SpoolConfig,
    store: Arc<SqliteStore>,
    engines: Vec<Arc<QueueEngine>>,
}

impl Spool {
    async fn open(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => SpoolConfig::load_from(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SpoolConfig::default(),
        };
        let db = cli.db.clone().unwrap_or_else(|| config.store.path.clone());
        let store = Arc::new(
            SqliteStore::open(&db).with_context(|| format!("opening {}", db.display()))?,
        );

        let mut engines = Vec::with_capacity(config.queues.len());
        for queue in &config.queues {
            let engine = QueueBuilder::from_config(queue)?
                .store(store.clone())
                .build()?;
            if let Some(task) = queue.task() {
                store
                    .register(&task.pid)
                    .await
                    .with_context(|| format!("registering task {}", task.pid))?;
            }
            engines.push(Arc::new(engine));
        }
        tracing::debug!(db = %db.display(), queues = engines.len(), "spool opened");

        Ok(Self {
            config,
            store,
            engines,
        })
    }

    fn producers(&self) -> Vec<Producer> {
        self.config
            .queues
            .iter()
            .zip(&self.engines)
            .filter_map(|(queue, engine)| {
                queue
                    .task()
                    .map(|task| Producer::new(Arc::clone(engine), task))
            })
            .collect()
    }

    fn recorder(&self) -> Arc<ExecutionRecorder> {
        let mut registry = ActionRegistry::new();
        let handler: Arc<dyn ActionHandler> = Arc::new(LogAction);
        for queue in &self.config.queues {
            if let Some(task) = queue.task() {
                if registry.handler_count(&task.action) == 0 {
                    registry.register(task.action, handler.clone());
                }
            }
        }
        Arc::new(ExecutionRecorder::new(
            Arc::new(registry),
            self.store.clone(),
            Arc::new(SystemClock),
        ))
    }

    fn workers(&self) -> Vec<Arc<WorkerLoop>> {
        let recorder = self.recorder();
        self.engines
            .iter()
            .map(|engine| {
                Arc::new(WorkerLoop::new(
                    Arc::clone(engine),
                    Arc::clone(&recorder),
                    self.config.worker.default_lease,
                    self.config.worker.poll_interval(),
                ))
            })
            .collect()
    }

    async fn tick(&self) -> Result<()> {
        for producer in self.producers() {
            let created = producer
                .tick()
                .await
                .with_context(|| format!("ticking task {}", producer.task().pid))?;
            if let Some(id) = created {
                println!("{}", json!({ "pid": producer.task().pid, "item": id }));
            }
        }
        Ok(())
    }

    async fn work_once(&self) -> Result<()> {
        let mut processed = 0;
        for worker in self.workers() {
            if worker.run_once().await {
                processed += 1;
            }
        }
        println!("{}", json!({ "processed": processed }));
        Ok(())
    }

    async fn work(&self) -> Result<()> {
        let mut group = WorkerGroup::new();
        for worker in self.workers() {
            group.spawn_workers(self.config.worker.workers, worker);
        }
        group.spawn_gc(Arc::new(GcLoop::new(
            self.engines.clone(),
            self.config.worker.gc_interval(),
        )));
        tracing::info!(tasks = group.len(), "workers started");

        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
        tracing::info!("shutting down");
        group.shutdown_and_join().await;
        Ok(())
    }

    async fn gc(&self) -> Result<()> {
        let mut reports = serde_json::Map::new();
        for engine in &self.engines {
            let report = engine.garbage_collection().await;
            reports.insert(engine.name().to_string(), serde_json::to_value(report)?);
        }
        println!("{}", serde_json::Value::Object(reports));
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let mut queues = serde_json::Map::new();
        for engine in &self.engines {
            let counts = engine.status().await;
            queues.insert(
                engine.name().to_string(),
                json!({ "counts": counts, "total": counts.total() }),
            );
        }
        println!("{}", serde_json::to_string_pretty(&serde_json::Value::Object(queues))?);
        Ok(())
    }

    /// Works for queues missing from the config too.
    async fn purge(&self, name: &str) -> Result<()> {
        let engine = match self.engines.iter().find(|e| e.name() == name) {
            Some(engine) => Arc::clone(engine),
            None => Arc::new(QueueEngine::builder(name).store(self.store.clone()).build()?),
        };
        let before = engine.number_of_items().await;
        engine.delete_queue().await;
        println!("{}", json!({ "queue": name, "deleted": before }));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "spool=debug,spool_core=debug"
    } else {
        "spool=info,spool_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let spool = Spool::open(&cli).await?;
    match cli.command {
        Command::Tick => spool.tick().await,
        Command::Work { once: true } => spool.work_once().await,
        Command::Work { once: false } => spool.work().await,
        Command::Gc => spool.gc().await,
        Command::Status => spool.status().await,
        Command::Purge { ref queue } => spool.purge(queue).await,
    }
}

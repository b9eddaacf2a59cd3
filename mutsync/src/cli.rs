use crate::action::TriggerOutcome;
use crate::config::Config;
use crate::connectivity::{ProbeMonitor, ReplayTrigger};
use crate::dispatcher::Dispatcher;
use crate::output::{emit_data, OutputFormat};
use crate::queue::{FileStore, OfflineQueue};
use crate::transport::{HttpTransport, Transport};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "mutsync",
    about = "Send idempotent mutations and replay the offline queue",
    disable_help_subcommand = true,
    after_help = r#"Examples:
  mutsync --base-url https://api.example.com send /bookings/confirm --data '{"id":"b_1"}'
  mutsync queue list --json
  mutsync watch --probe https://api.example.com/health --interval 10
  mutsync config set max_retries 5"#
)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// JSON output
    #[arg(long, global = true)]
    pub json: bool,
    /// Raw output
    #[arg(long, global = true)]
    pub raw: bool,
    /// Per-attempt timeout in milliseconds
    #[arg(long = "timeout-ms", global = true)]
    pub timeout_ms: Option<u64>,
    /// Max retries per mutation
    #[arg(long = "max-retries", global = true)]
    pub max_retries: Option<u32>,
    /// Base URL for relative endpoints
    #[arg(long = "base-url", global = true)]
    pub base_url: Option<String>,
    /// Offline queue file
    #[arg(long = "queue-path", global = true)]
    pub queue_path: Option<PathBuf>,
    /// Verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,
    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,
    /// Color control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ColorChoice {
    Always,
    Auto,
    Never,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one mutation with retries
    Send(SendCmd),
    Queue(QueueCmd),
    /// Replay the queue whenever the probe becomes reachable again
    Watch(WatchCmd),
    Config(ConfigCmd),
    Util(UtilCmd),
}

#[derive(Args, Debug)]
pub struct SendCmd {
    /// Absolute URL, or a path joined onto --base-url
    pub endpoint: String,
    /// JSON body
    #[arg(long, default_value = "{}")]
    pub data: String,
    /// Do not queue the mutation if retries are exhausted
    #[arg(long = "no-queue")]
    pub no_queue: bool,
}

#[derive(Args, Debug)]
pub struct QueueCmd {
    #[command(subcommand)]
    sub: QueueSub,
}
#[derive(Subcommand, Debug)]
pub enum QueueSub {
    List,
    /// Replay every queued mutation once
    Sync,
    Clear,
    Path,
}

#[derive(Args, Debug)]
pub struct WatchCmd {
    /// URL probed with HEAD to detect connectivity
    #[arg(long)]
    pub probe: String,
    /// Seconds between probes
    #[arg(long, default_value_t = 15)]
    pub interval: u64,
}

#[derive(Args, Debug)]
pub struct ConfigCmd {
    #[command(subcommand)]
    sub: ConfigSub,
}
#[derive(Subcommand, Debug)]
pub enum ConfigSub {
    Set { key: String, value: String },
    Get { key: String },
    Path,
}

#[derive(Args, Debug)]
pub struct UtilCmd {
    #[command(subcommand)]
    sub: UtilSub,
}
#[derive(Subcommand, Debug)]
pub enum UtilSub {
    Inspect,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut cfg = Config::load().context("load config")?;
    cfg.apply_env();
    cfg.apply_cli(&cli);

    match &cli.command {
        Commands::Send(cmd) => run_send(cmd, &cfg, &cli).await,
        Commands::Queue(cmd) => run_queue(cmd, &cfg, &cli).await,
        Commands::Watch(cmd) => run_watch(cmd, &cfg).await,
        Commands::Config(cmd) => run_config(cmd, &cfg),
        Commands::Util(cmd) => run_util(cmd, &cfg, &cli),
    }
}

fn fmt_from_cli(cli: &Cli) -> OutputFormat {
    if cli.raw {
        OutputFormat::Raw
    } else if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Yaml
    }
}

fn open_queue(cfg: &Config) -> Result<Arc<OfflineQueue>> {
    let path = cfg.queue_store_path()?;
    Ok(Arc::new(OfflineQueue::new(FileStore::new(path))))
}

async fn run_send(cmd: &SendCmd, cfg: &Config, cli: &Cli) -> Result<()> {
    let endpoint = cfg.resolve_endpoint(&cmd.endpoint)?;
    let variables: JsonValue = serde_json::from_str(&cmd.data).context("parse --data as JSON")?;
    let mut options = cfg.mutation_options();
    if cmd.no_queue {
        options.offline_queue_enabled = false;
    }
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    let dispatcher = Dispatcher::builder(endpoint, transport)
        .options(options)
        .queue(open_queue(cfg)?)
        .on_retry(|attempt, err| info!(attempt, error = %err, "retry scheduled"))
        .build();
    let action = cfg.sync_action(Arc::new(dispatcher));
    let data = match action.trigger(variables).await {
        TriggerOutcome::Completed(result) => result?,
        TriggerOutcome::Ignored => anyhow::bail!("mutation already in flight"),
    };
    emit_data(&fmt_from_cli(cli), &data)
}

async fn run_queue(cmd: &QueueCmd, cfg: &Config, cli: &Cli) -> Result<()> {
    let fmt = fmt_from_cli(cli);
    match &cmd.sub {
        QueueSub::List => {
            let queue = open_queue(cfg)?;
            emit_data(&fmt, &serde_json::to_value(queue.items())?)
        }
        QueueSub::Sync => {
            let queue = open_queue(cfg)?;
            let transport = HttpTransport::new()?;
            let report = queue.sync_queue(&transport, cfg.timeout()).await;
            emit_data(&fmt, &serde_json::to_value(report)?)
        }
        QueueSub::Clear => {
            let queue = open_queue(cfg)?;
            let removed = queue.clear();
            emit_data(&fmt, &serde_json::json!({"status": "ok", "removed": removed}))
        }
        QueueSub::Path => {
            let path = cfg.queue_store_path()?;
            emit_data(&OutputFormat::Raw, &JsonValue::String(path.display().to_string()))
        }
    }
}

async fn run_watch(cmd: &WatchCmd, cfg: &Config) -> Result<()> {
    let probe = cfg.resolve_endpoint(&cmd.probe)?;
    let probe = reqwest::Url::parse(&probe).context("parse probe url")?;
    let transport = HttpTransport::new()?;
    let monitor = ProbeMonitor::new(
        transport.client().clone(),
        probe,
        Duration::from_secs(cmd.interval.max(1)),
        cfg.timeout(),
    );
    let trigger = ReplayTrigger::new(open_queue(cfg)?, Arc::new(transport), cfg.timeout());

    // start offline so the first successful probe drains anything left over
    let (tx, rx) = watch::channel(false);
    info!(probe = %cmd.probe, "watching connectivity");
    tokio::select! {
        _ = monitor.run(tx) => {}
        _ = trigger.run(rx) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("listen for ctrl-c")?;
            info!("stopping watcher");
        }
    }
    Ok(())
}

fn run_config(cmd: &ConfigCmd, cfg: &Config) -> Result<()> {
    match &cmd.sub {
        ConfigSub::Set { key, value } => {
            // persist the file's values, not env/flag overrides
            let mut stored = Config::load().context("load config")?;
            stored.set(key, value)?;
            stored.save()?;
            emit_data(&OutputFormat::Yaml, &serde_json::json!({"status": "ok"}))
        }
        ConfigSub::Get { key } => {
            let v = cfg.get(key).with_context(|| format!("unknown key {key}"))?;
            emit_data(&OutputFormat::Raw, &JsonValue::String(v))
        }
        ConfigSub::Path => {
            let path = Config::config_path()?;
            emit_data(&OutputFormat::Raw, &JsonValue::String(path.display().to_string()))
        }
    }
}

fn run_util(cmd: &UtilCmd, cfg: &Config, cli: &Cli) -> Result<()> {
    match &cmd.sub {
        UtilSub::Inspect => {
            let queue_path = cfg.queue_store_path().ok().map(|p| p.display().to_string());
            let data = serde_json::json!({
                "base_url": cfg.base_url,
                "max_retries": cfg.max_retries,
                "initial_delay_ms": cfg.initial_delay_ms,
                "max_delay_ms": cfg.max_delay_ms,
                "timeout_ms": cfg.timeout_ms,
                "offline_queue_enabled": cfg.offline_queue_enabled,
                "display_duration_ms": cfg.display_duration_ms,
                "queue_path": queue_path,
            });
            emit_data(&fmt_from_cli(cli), &data)
        }
    }
}

mod telemetry;
mod workload;

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use metrics_influx_core::TimeUnit;
use metrics_influx_core::config::{ReporterConfig, parse_tags};
use metrics_influx_registry::MetricRegistry;
use metrics_influx_reporter::{JsonLinesSender, Reporter, ReporterBuilder, ScheduledReporter};
use tokio::sync::watch;
use tracing::info;

use crate::telemetry::init_cli_tracing;
use crate::workload::Workload;

const WORKLOAD_STEP: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "metrics-influx")]
#[command(about = "Report in-process metrics as InfluxDB points")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Read configuration from this file only")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Drive a synthetic workload and print each cycle as JSON lines")]
    Run {
        #[arg(long, help = "Report period (e.g. 10s, 500ms)")]
        period: Option<String>,
        #[arg(long, help = "Stop after this many cycles instead of waiting for Ctrl-C")]
        cycles: Option<u64>,
        #[arg(long)]
        skip_idle: bool,
        #[arg(long = "tag", help = "Common tag as key=value; repeatable")]
        tags: Vec<String>,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        rate_unit: Option<String>,
        #[arg(long)]
        duration_unit: Option<String>,
    },
    #[command(about = "Print the resolved configuration")]
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing();
    let mut cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            period,
            cycles,
            skip_idle,
            tags,
            include,
            exclude,
            rate_unit,
            duration_unit,
        } => {
            apply_run_args(
                &mut cfg,
                RunArgs {
                    period,
                    skip_idle,
                    tags,
                    include,
                    exclude,
                    rate_unit,
                    duration_unit,
                },
            )?;
            run(cfg, cycles).await
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&cfg).context("failed rendering config")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ReporterConfig> {
    let cfg = match path {
        Some(path) => ReporterConfig::from_file(path)?,
        None => ReporterConfig::load()?,
    };
    Ok(cfg)
}

struct RunArgs {
    period: Option<String>,
    skip_idle: bool,
    tags: Vec<String>,
    include: Vec<String>,
    exclude: Vec<String>,
    rate_unit: Option<String>,
    duration_unit: Option<String>,
}

fn apply_run_args(cfg: &mut ReporterConfig, args: RunArgs) -> anyhow::Result<()> {
    if let Some(v) = args.period {
        let period = humantime::parse_duration(&v).with_context(|| format!("bad --period {v}"))?;
        anyhow::ensure!(!period.is_zero(), "--period must be greater than zero");
        cfg.period = period;
    }
    if args.skip_idle {
        cfg.skip_idle_metrics = true;
    }
    for raw in &args.tags {
        cfg.tags.extend(parse_tags(raw).with_context(|| format!("bad --tag {raw}"))?);
    }
    if !args.include.is_empty() {
        cfg.include = args.include;
    }
    if !args.exclude.is_empty() {
        cfg.exclude = args.exclude;
    }
    if let Some(v) = args.rate_unit {
        cfg.rate_unit = v.parse::<TimeUnit>().with_context(|| format!("bad --rate-unit {v}"))?;
    }
    if let Some(v) = args.duration_unit {
        cfg.duration_unit = v.parse::<TimeUnit>().with_context(|| format!("bad --duration-unit {v}"))?;
    }
    Ok(())
}

async fn run(cfg: ReporterConfig, cycles: Option<u64>) -> anyhow::Result<()> {
    let registry = MetricRegistry::new();
    let workload = Workload::install(&registry)?;
    let reporter =
        ReporterBuilder::from_config(&cfg)?.build(JsonLinesSender::new(io::stdout()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workload_task = workload.spawn(WORKLOAD_STEP, shutdown_rx);
    info!(period = ?cfg.period, skip_idle = cfg.skip_idle_metrics, "reporting");

    let result = match cycles {
        Some(n) => run_cycles(reporter, &registry, cfg.period, n).await,
        None => run_until_interrupted(reporter, registry, cfg.period).await,
    };

    let _ = shutdown_tx.send(true);
    workload_task.await.context("workload task failed")?;
    result
}

async fn run_cycles(
    mut reporter: Reporter<JsonLinesSender<Stdout>>,
    registry: &MetricRegistry,
    period: Duration,
    cycles: u64,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    for _ in 0..cycles {
        ticker.tick().await;
        let outcome = reporter.report_registry(registry, Utc::now());
        info!(outcome = ?outcome, "cycle");
    }
    Ok(())
}

async fn run_until_interrupted(
    reporter: Reporter<JsonLinesSender<Stdout>>,
    registry: MetricRegistry,
    period: Duration,
) -> anyhow::Result<()> {
    let scheduled = ScheduledReporter::start(reporter, registry, period)?;
    tokio::signal::ctrl_c()
        .await
        .context("failed waiting for ctrl-c")?;
    scheduled.stop().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            period: None,
            skip_idle: false,
            tags: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            rate_unit: None,
            duration_unit: None,
        }
    }

    #[test]
    fn run_args_override_config() {
        let mut cfg = ReporterConfig::default();
        cfg.tags.insert("env".into(), "dev".into());
        apply_run_args(
            &mut cfg,
            RunArgs {
                period: Some("250ms".into()),
                skip_idle: true,
                tags: vec!["host=web-1".into(), "env=prod".into()],
                exclude: vec!["queue.*".into()],
                rate_unit: Some("minutes".into()),
                ..args()
            },
        )
        .unwrap();

        assert_eq!(cfg.period, Duration::from_millis(250));
        assert!(cfg.skip_idle_metrics);
        assert_eq!(cfg.tags["host"], "web-1");
        assert_eq!(cfg.tags["env"], "prod");
        assert_eq!(cfg.exclude, vec!["queue.*".to_string()]);
        assert_eq!(cfg.rate_unit, TimeUnit::Minutes);
        assert_eq!(cfg.duration_unit, TimeUnit::Milliseconds);
    }

    #[test]
    fn run_args_reject_bad_values() {
        let mut cfg = ReporterConfig::default();
        let zero = RunArgs {
            period: Some("0s".into()),
            ..args()
        };
        assert!(apply_run_args(&mut cfg, zero).is_err());

        let bad_tag = RunArgs {
            tags: vec!["novalue".into()],
            ..args()
        };
        assert!(apply_run_args(&mut cfg, bad_tag).is_err());
    }
}

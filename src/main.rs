use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use simple_logger::SimpleLogger;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use proxy_harvester::api::{ApiServer, AppState};
use proxy_harvester::argument::{Cli, Commands, HarvestArgs, ServeArgs, ValidateArgs};
use proxy_harvester::config::{self, DynamicConfig};
use proxy_harvester::coordinator::{Coordinator, CoordinatorConfig};
use proxy_harvester::dnsbl::DnsblChecker;
use proxy_harvester::fetcher::{Fetcher, FetcherConfig};
use proxy_harvester::geo::GeoCache;
use proxy_harvester::proxy::{Protocol, Proxy};
use proxy_harvester::scheduler::{Scheduler, SchedulerConfig};
use proxy_harvester::sources::registry::seed_configs;
use proxy_harvester::store::ProxyStore;
use proxy_harvester::transformer::TransformFilters;
use proxy_harvester::utils::error::{ProxyError, ProxyResult};
use proxy_harvester::validator::{TestLevel, Validator};

fn init_logger(cli_level: &Option<String>, configured_level: &str) -> ProxyResult<()> {
    let level = match cli_level.as_deref().unwrap_or(configured_level) {
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Warn,
    };
    SimpleLogger::new()
        .with_level(log::LevelFilter::Off)
        .with_module_level("proxy_harvester", level)
        .without_timestamps()
        .init()
        .map_err(|e| ProxyError::Config(format!("failed to initialize logger: {}", e)))
}

fn parse_test_level(s: &str) -> TestLevel {
    match s {
        "basic" => TestLevel::Basic,
        "comprehensive" => TestLevel::Comprehensive,
        _ => TestLevel::Standard,
    }
}

fn main() -> ProxyResult<()> {
    let cli = Cli::parse();
    let config = DynamicConfig::load_or_default(&cli.config)?;
    init_logger(&cli.log_level, &config.logging.level)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ProxyError::Config(format!("failed to build runtime: {}", e)))?;

    runtime.block_on(async move {
        match cli.sub.clone() {
            Commands::Serve(args) => run_serve(config, cli.config, args).await,
            Commands::Harvest(args) => run_harvest(config, args).await,
            Commands::Validate(args) => run_validate(config, args).await,
        }
    })
}

/// Builds the shared pipeline components every subcommand needs: store,
/// fetcher, validator, and the scoring profile the config names as its
/// default (the first bundled profile if none is marked as such).
async fn build_pipeline(
    config: &DynamicConfig,
) -> ProxyResult<(Arc<ProxyStore>, Arc<Fetcher>, Arc<Validator>, proxy_harvester::ScoringProfile)> {
    let store = Arc::new(ProxyStore::new());
    let fetcher = Arc::new(Fetcher::new(FetcherConfig::default()));
    let geo_cache = GeoCache::with_default_provider(Duration::from_secs(3600));
    let validator = Arc::new(Validator::new(
        geo_cache,
        Fetcher::new(FetcherConfig::default()),
        Duration::from_secs(config.validator.timeout_secs),
    ));
    let profile = config
        .scoring_profile("standard_validation")
        .cloned()
        .unwrap_or_else(proxy_harvester::ScoringProfile::standard_validation);
    Ok((store, fetcher, validator, profile))
}

async fn build_dnsbl_checker(config: &DynamicConfig) -> Option<Arc<DnsblChecker>> {
    if !config.dnsbl.enabled {
        return None;
    }
    match DnsblChecker::with_config(config.dnsbl.clone()).await {
        Ok(checker) => Some(Arc::new(checker)),
        Err(e) => {
            log::warn!("DNSBL checker unavailable, comprehensive checks will skip it: {}", e);
            None
        }
    }
}

async fn run_serve(config: DynamicConfig, config_path: std::path::PathBuf, args: ServeArgs) -> ProxyResult<()> {
    let (store, fetcher, validator, profile) = build_pipeline(&config).await?;
    let dnsbl_checker = build_dnsbl_checker(&config).await;

    let scheduler_config = SchedulerConfig {
        max_concurrent_jobs: config.scheduler.max_concurrent_jobs,
        job_queue_size: config.scheduler.job_queue_size,
        persistence_path: config.scheduler.persistence_path.clone(),
        ..SchedulerConfig::default()
    };
    let mut scheduler = Scheduler::with_persisted_jobs(
        Arc::clone(&store),
        Arc::clone(&validator),
        profile.clone(),
        scheduler_config,
    )
    .await?;
    if let Some(checker) = dnsbl_checker.clone() {
        scheduler = scheduler.with_dnsbl_checker(checker);
    }
    let scheduler = Arc::new(scheduler);

    let coordinator_config = CoordinatorConfig {
        tick_interval: Duration::from_secs(config.scheduler.validation_interval_secs),
        ..CoordinatorConfig::default()
    };
    let coordinator = Arc::new(Coordinator::new(
        seed_configs(),
        Arc::clone(&fetcher),
        Arc::clone(&store),
        Arc::clone(&scheduler),
        TransformFilters::default(),
        coordinator_config,
    ));

    let shared_config = Arc::new(RwLock::new(config));
    if let Err(e) = config::start_config_watcher(&config_path, Arc::clone(&shared_config)).await {
        log::warn!("config hot-reload disabled, could not watch {}: {}", config_path.display(), e);
    }

    let shutdown = CancellationToken::new();
    let worker_handles = scheduler.spawn_workers(shutdown.clone());
    let coordinator_handle = Arc::clone(&coordinator).spawn(shutdown.clone());

    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        scheduler: Arc::clone(&scheduler),
        coordinator: Arc::clone(&coordinator),
        config: shared_config,
        started_at: std::time::Instant::now(),
    });
    let bind_addr = args
        .bind
        .parse()
        .map_err(|e| ProxyError::Config(format!("invalid --bind address {}: {}", args.bind, e)))?;
    let server = ApiServer::new(bind_addr, state);
    let server_handle = tokio::spawn(server.start());

    wait_for_shutdown_signal().await;
    log::info!("shutdown signal received, stopping workers");
    shutdown.cancel();

    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = coordinator_handle.await;
    server_handle.abort();

    scheduler.persist().await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn run_harvest(config: DynamicConfig, args: HarvestArgs) -> ProxyResult<()> {
    let (store, fetcher, validator, profile) = build_pipeline(&config).await?;
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        validator,
        profile,
        SchedulerConfig::default(),
    ));
    let coordinator = Coordinator::new(
        seed_configs(),
        fetcher,
        Arc::clone(&store),
        scheduler,
        TransformFilters::default(),
        CoordinatorConfig::default(),
    );

    let summaries = if args.sources.is_empty() {
        coordinator.tick().await
    } else {
        let mut out = Vec::with_capacity(args.sources.len());
        for name in &args.sources {
            out.push(coordinator.run_source(name).await);
        }
        out
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries.iter().map(|s| {
            serde_json::json!({
                "source": s.source,
                "found": s.found,
                "success": s.success,
                "error": s.error,
            })
        }).collect::<Vec<_>>())?);
    } else {
        println!("{:<20} {:>8} {:>8}  error", "source", "found", "ok");
        for s in &summaries {
            println!("{:<20} {:>8} {:>8}  {}", s.source, s.found, s.success, s.error.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}

async fn run_validate(config: DynamicConfig, args: ValidateArgs) -> ProxyResult<()> {
    let level = parse_test_level(&args.level);
    let (_store, _fetcher, validator, profile) = build_pipeline(&config).await?;
    let dnsbl_checker = build_dnsbl_checker(&config).await;

    let lines = read_targets(&args.file).await?;
    let mut results = Vec::with_capacity(lines.len());
    for line in lines {
        let Some((ip, port)) = parse_target(&line) else {
            log::warn!("skipping unparseable target: {}", line);
            continue;
        };
        let candidate = Proxy::new(ip, port, Protocol::Http, "cli");
        let result = validator
            .validate(&candidate, level, &[], &profile, dnsbl_checker.as_deref())
            .await;
        results.push((candidate, result));
    }

    if args.json {
        let values: Vec<serde_json::Value> = results
            .iter()
            .map(|(proxy, result)| {
                serde_json::json!({
                    "ip": proxy.ip.to_string(),
                    "port": proxy.port,
                    "result": result,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else {
        println!("{:<21} {:>6} {:>9}  composite", "target", "ok", "rtt_ms");
        for (proxy, result) in &results {
            println!(
                "{:<21} {:>6} {:>9}  {:.1}",
                format!("{}:{}", proxy.ip, proxy.port),
                result.success,
                result.avg_rtt_ms.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                result.composite_score,
            );
        }
    }
    Ok(())
}

async fn read_targets(file: &Option<std::path::PathBuf>) -> ProxyResult<Vec<String>> {
    let mut lines = Vec::new();
    match file {
        Some(path) => {
            let content = tokio::fs::read_to_string(path).await.map_err(ProxyError::Network)?;
            for line in content.lines() {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
        }
        None => {
            let mut reader = BufReader::new(stdin()).lines();
            while let Some(line) = reader.next_line().await.map_err(ProxyError::Network)? {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
        }
    }
    Ok(lines)
}

fn parse_target(line: &str) -> Option<(Ipv4Addr, u16)> {
    let (ip, port) = line.rsplit_once(':')?;
    Some((ip.parse().ok()?, port.parse().ok()?))
}

mod cli;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use kiln_core::constants::DEFAULT_CONFIG_FILE;
use kiln_core::kiln_plugin::PluginEnv;
use kiln_core::plugin_system::{classify_source, parse_key};
use kiln_core::utils::is_file;
use kiln_core::{KilnConfig, PluginRegistry, Result, TaskQueue};
use log::{debug, info};
use tracing_subscriber::EnvFilter;

use cli::{Batch, CliArgs, Commands};

fn init_logging(args: &CliArgs) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    // RUST_LOG wins over the flags.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

async fn load_config(args: &CliArgs) -> Result<KilnConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|path| is_file(path)),
    };
    let mut config = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            KilnConfig::load(&path).await?
        }
        None => KilnConfig::default(),
    };

    if let Some(root) = &args.root {
        config.root_dir = root.clone();
    }
    if args.branch.is_some() {
        config.branch = args.branch.clone();
    }
    config.plugins.extend(args.plugins.iter().map(|key| kiln_core::config::PluginEntry {
        key: key.clone(),
        update: args.update,
    }));
    Ok(config)
}

fn parse(key: &str) -> Result<()> {
    let (source, alias) = parse_key(key);
    let kind = classify_source(&source)?.kind();
    println!("source: {}", source);
    println!("alias: {}", alias);
    println!("kind: {}", kind);
    Ok(())
}

async fn list(registry: &PluginRegistry) -> Result<()> {
    let records = registry.records().await?;
    if records.is_empty() {
        println!("No plugins registered.");
        return Ok(());
    }
    for record in records {
        println!(
            "{}\t{}\t{}\t{}",
            record.alias,
            record.kind,
            record.state,
            record.artifact.display()
        );
    }
    Ok(())
}

/// Worker pool for a batch: `--jobs` wins, `--parallel` uses the configured
/// worker count, otherwise plugins are handled one at a time.
fn batch_queue(batch: Batch, config: &KilnConfig) -> Option<TaskQueue> {
    let workers = batch.jobs.or(batch.parallel.then_some(config.workers))?;
    let queue = TaskQueue::new(workers);
    info!("Running on {} workers", queue.workers());
    Some(queue)
}

async fn build(registry: &PluginRegistry, queue: Option<&TaskQueue>) -> Result<()> {
    match queue {
        Some(queue) => registry.build_async(queue).await,
        None => registry.build().await,
    }
}

async fn test(registry: &PluginRegistry, queue: Option<&TaskQueue>) -> Result<()> {
    match queue {
        Some(queue) => registry.test_async(queue).await,
        None => registry.test().await,
    }
}

async fn run(registry: &PluginRegistry, env: &PluginEnv, queue: Option<&TaskQueue>, calls: &[String]) -> Result<()> {
    registry.retrieve().await?;
    build(registry, queue).await?;
    test(registry, queue).await?;
    registry.initialize().await?;
    registry.start(env).await?;
    info!("All plugins started.");

    for handler in calls {
        let (call, symbol) = registry.resolve_handler(handler).await?;
        println!(
            "{}.{}({}) -> {:#x}",
            call.alias,
            call.method,
            call.args.join(","),
            symbol.address()
        );
    }
    Ok(())
}

async fn execute(args: &CliArgs) -> Result<()> {
    if let Commands::Parse { key } = &args.command {
        return parse(key);
    }

    let config = load_config(args).await?;
    let registry = PluginRegistry::from_config(&config).await?;

    let result = match &args.command {
        Commands::Parse { key } => parse(key),
        Commands::List => list(&registry).await,
        Commands::Retrieve => registry.retrieve().await,
        Commands::Build(batch) => build(&registry, batch_queue(*batch, &config).as_ref()).await,
        Commands::Test(batch) => test(&registry, batch_queue(*batch, &config).as_ref()).await,
        Commands::Run { batch, calls } => {
            let env: PluginEnv = config.env.clone();
            run(&registry, &env, batch_queue(*batch, &config).as_ref(), calls).await
        }
    };

    // Plugins are always given the chance to clean up.
    let closed = registry.close().await;
    result.and(closed)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(&args);

    match execute(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

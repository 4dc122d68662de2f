mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use ms_av::{FfprobeProber, Prober, Tool, ToolRegistry};
use ms_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults based on --verbose.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediasync=debug,ms_engine=debug,ms_db=debug,ms_av=debug,ms_core=debug".to_string()
        } else {
            "mediasync=info,ms_engine=info,ms_db=info,ms_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { no_watch } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if no_watch {
                config.watch.enabled = false;
            }
            tracing::info!("Starting mediasync");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(ms_engine::start(config))?;
            Ok(())
        }
        Commands::Scan { library } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(name) = library {
                config.libraries.retain(|l| l.name == name);
                if config.libraries.is_empty() {
                    anyhow::bail!("No library named {name:?} in the configuration");
                }
            }
            let rt = tokio::runtime::Runtime::new()?;
            let summary = rt.block_on(ms_engine::run_once(config))?;
            println!("Library roots: {}", summary.library_paths);
            if summary.recovered > 0 {
                println!("Recovered interrupted jobs: {}", summary.recovered);
            }
            println!(
                "Jobs: {} done, {} failed",
                summary.jobs.done, summary.jobs.failed
            );
            Ok(())
        }
        Commands::Probe { file, json } => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&config, &file, json))
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(cli.config.as_deref());
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(&config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("mediasync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// A one-shot command must not run against defaults the user did not ask
/// for, so an explicit config file has to load cleanly.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load(p).with_context(|| format!("cannot load config {}", p.display())),
        None => Ok(Config::default()),
    }
}

async fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let tools = ToolRegistry::discover(&config.tools);
    tools.require(Tool::Ffprobe)?;
    let prober = FfprobeProber::from_registry(&tools);
    let report = prober.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let secs = report.runtime_secs();
        println!("File: {}", file.display());
        println!("Dimensions: {}x{}", report.width, report.height);
        println!(
            "Duration: {:02}:{:02}:{:02}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
        println!("Size: {} bytes", report.size_bytes);
    }

    Ok(())
}

async fn check_tools(config: &Config) -> Result<()> {
    let statuses = ToolRegistry::discover(&config.tools).status().await;

    for status in &statuses {
        let mark = if status.available() { "✓" } else { "✗" };
        print!("{mark} {}", status.tool.binary());
        match (&status.path, &status.version) {
            (Some(path), Some(version)) => print!(" - {} ({version})", path.display()),
            (Some(path), None) => print!(" - {}", path.display()),
            (None, _) => print!(" - not found"),
        }
        println!();
    }

    if statuses.iter().all(|s| s.available()) {
        println!("\nAll external tools are available.");
    } else {
        println!("\nProbe and thumbnail jobs will fail until the missing tools are installed.");
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = Config::load(p)?;
            println!("✓ Configuration parsed");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Database: {}", config.database.path.display());
    println!("  Libraries: {}", config.libraries.len());
    println!(
        "    Roots: {}",
        config.libraries.iter().map(|l| l.paths.len()).sum::<usize>()
    );
    println!("  Watch enabled: {}", config.watch.enabled);
    println!("  Jobs enabled: {}", config.jobs.enabled);
    println!("  Stale job policy: {:?}", config.jobs.stale_job_policy);
    println!("  Tool timeout: {}s", config.tools.timeout_secs);

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ No warnings");
    } else {
        println!("Warnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

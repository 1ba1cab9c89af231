mod cli;

use splicer::{app, config};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use splice_av::{FfprobeProber, ToolRegistry};
use splice_core::{millis_to_secs_arg, JobSpec, Strategy};
use splice_pipeline::{DryRun, JobOutcome, PlanItem, StitchRequest};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("splicer=trace,splice_pipeline=trace,splice_av=debug")
        } else {
            EnvFilter::new("splicer=info,splice_pipeline=info,splice_av=warn")
        }
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Stitch {
            job,
            strategy,
            dry_run,
            keep_output,
            json,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let options = StitchOptions {
                strategy,
                dry_run,
                keep_output,
                json,
            };
            rt.block_on(stitch(&job, cli.config.as_deref(), options))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, cli.config.as_deref(), json))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("splicer {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct StitchOptions {
    strategy: Option<Strategy>,
    dry_run: bool,
    keep_output: bool,
    json: bool,
}

async fn stitch(job: &Path, config_path: Option<&Path>, options: StitchOptions) -> Result<()> {
    let StitchOptions {
        strategy,
        dry_run,
        keep_output,
        json,
    } = options;
    let mut config = config::load_config_or_default(config_path)?;
    config.workspace.keep_output |= keep_output;

    let content = std::fs::read_to_string(job)
        .with_context(|| format!("Failed to read job file: {:?}", job))?;
    let spec = JobSpec::from_json(&content)
        .with_context(|| format!("Invalid job file: {:?}", job))?;
    let request = StitchRequest::from_spec(&spec, strategy.unwrap_or(config.stitch.strategy))?;

    let cancellation = CancellationToken::new();
    let app = app::App::new(config, cancellation.clone())?;

    let token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });

    if dry_run {
        let dry = app.runner().plan_only(&request).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&dry)?);
        } else {
            print_plan(&dry);
        }
        return Ok(());
    }

    let outcome = app.runner().run(&request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_plan(dry: &DryRun) {
    println!(
        "Track: {} ({} s)",
        dry.job.track.location,
        millis_to_secs_arg(dry.track_duration_ms)
    );
    println!("Mode: {}", dry.job.mode);
    println!("Strategy: {}", dry.job.strategy);
    if let Some(ref fp) = dry.job.fingerprint {
        println!("Fingerprint: {}", fp);
    }
    println!("\nPlan ({} items):", dry.plan.len());
    for (i, item) in dry.plan.items.iter().enumerate() {
        match item {
            PlanItem::Slice(range) => println!("  {}. slice {}", i + 1, range),
            PlanItem::Clip(clip) => println!("  {}. clip {} ({})", i + 1, clip.id, clip.path.display()),
        }
    }
    println!(
        "\n[DRY RUN] Would stitch {} s of the track into {}",
        millis_to_secs_arg(dry.plan.retained_ms()),
        dry.storage_key
    );
    println!(
        "Expected output: {} s",
        millis_to_secs_arg(dry.expected_duration_ms)
    );
}

fn print_outcome(outcome: &JobOutcome) {
    println!("Job: {}", outcome.job_id);
    println!("Key: {}", outcome.key);
    println!("Location: {}", outcome.location.display());
    if let Some(ms) = outcome.duration_ms {
        println!("Duration: {} s", millis_to_secs_arg(ms));
    }
    println!("Cached: {}", if outcome.cached { "yes" } else { "no" });
    if let Some(ref kept) = outcome.local_output {
        println!("Kept: {}", kept.display());
    }
}

async fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?;
    let info = FfprobeProber::new(ffprobe.path.clone(), ffprobe.timeout)
        .probe(file)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File: {}", file.display());
        let secs = info.duration_secs as u64;
        println!(
            "Duration: {:02}:{:02}:{:02} ({} ms)",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            info.duration_ms()
        );
        if let Some(ref codec) = info.codec {
            println!("Codec: {}", codec);
        }
        if let Some(channels) = info.channels {
            println!("Channels: {}", channels);
        }
        if let Some(rate) = info.sample_rate {
            println!("Sample rate: {} Hz", rate);
        }
        if let Some(bitrate) = info.bitrate {
            println!("Bitrate: {} kb/s", bitrate / 1000);
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable stitching.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Strategy: {}", config.stitch.strategy);
    println!("  Output extension: {}", config.stitch.output_extension);
    println!(
        "  Duration check: ±{} ms ({})",
        config.stitch.duration_tolerance_ms,
        if config.stitch.strict_duration { "strict" } else { "warn" }
    );
    println!("  Temp dir: {}", app::temp_dir(&config).display());
    println!(
        "  Cache: {} ({}, prefix {})",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.root.display(),
        config.cache.key_prefix
    );
    println!(
        "  Fetch: timeout {}s, {} retries",
        config.fetch.timeout_secs, config.fetch.retries
    );

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    Ok(())
}

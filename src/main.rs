// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Emotiscope: facial emotion analysis web app
//!
//! Upload a photo, have a local vision model name the dominant emotion, and keep
//! a browsable history of every analysis.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use emotiscope::config::AppConfig;
use emotiscope::db::Database;
use emotiscope::inference::{result_label, EmotionAnalyzer, OllamaEmotionAnalyzer};
use emotiscope::ollama::OllamaClient;
use emotiscope::pipeline::UploadPipeline;
use emotiscope::store::ImageStore;
use emotiscope::web::{start_server, AppState};
use emotiscope::{EmotiscopeError, Result};

/// Emotiscope CLI - facial emotion analysis
#[derive(Parser, Debug)]
#[command(name = "emotiscope")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Facial emotion analysis with a local vision model", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Analyze a single local image and print the result label
    Analyze {
        /// Image to analyze
        path: PathBuf,
    },

    /// Print every recorded analysis, newest first
    History {
        /// Output format
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Show AI engine and database status
    Status,

    /// Write a default configuration and create the upload directory
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("Emotiscope v{}", env!("CARGO_PKG_VERSION"));
    }

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Serve { host, port }) => run_serve(config, host, port).await,
        Some(Commands::Analyze { path }) => run_analyze(config, path).await,
        Some(Commands::History { format }) => run_history(config, &format),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        None => run_serve(config, None, None).await,
    }
}

/// Assemble the upload pipeline and serve the web UI
async fn run_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }

    let images = ImageStore::new(&config.uploads.dir)?;
    let db = Database::open(&config.database.path)?;
    let analyzer = OllamaEmotionAnalyzer::new(&config.ai_engine)?;

    if let Err(e) = analyzer.client().health_check().await {
        warn!("{} - uploads will be recorded as analysis errors until it is reachable", e);
    }

    let pipeline = UploadPipeline::new(
        images,
        db.clone(),
        Arc::new(analyzer),
        &config.uploads.allowed_extensions,
    );

    info!(
        "Storing uploads in {} and records in {}",
        config.uploads.dir, config.database.path
    );

    let state = AppState::new(config, db, pipeline)?;
    start_server(state).await
}

/// Run the analyzer on one file without recording anything
async fn run_analyze(config: AppConfig, path: PathBuf) -> Result<()> {
    if !path.is_file() {
        return Err(EmotiscopeError::Config(format!("Not a file: {:?}", path)));
    }

    let analyzer = OllamaEmotionAnalyzer::new(&config.ai_engine)?;
    let outcome = analyzer.analyze(&path).await;
    if let Err(e) = &outcome {
        warn!("Emotion analysis failed: {}", e);
    }

    println!("{}: {}", path.display(), result_label(&outcome));
    Ok(())
}

fn run_history(config: AppConfig, format: &str) -> Result<()> {
    let db = Database::open(&config.database.path)?;
    let records = db.list_analyses()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No analyses yet.");
        return Ok(());
    }

    for record in records {
        println!(
            "[{}] #{} {} - {} ({})",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.id,
            record.user_name,
            record.analysis_result,
            record.image_filename
        );
    }
    Ok(())
}

async fn run_status(config: AppConfig) -> Result<()> {
    let client = OllamaClient::new(
        &config.ai_engine.url,
        std::time::Duration::from_secs(config.ai_engine.timeout_secs),
    )?;

    println!("Emotiscope v{} Status", env!("CARGO_PKG_VERSION"));
    println!("=======================");

    match client.health_check().await {
        Ok(()) => {
            println!("Ollama: Running ({})", client.base_url());
            match client.model_available(&config.ai_engine.model).await {
                Ok(true) => println!("Model {}: available", config.ai_engine.model),
                Ok(false) => println!(
                    "Model {}: missing (run `ollama pull {}`)",
                    config.ai_engine.model, config.ai_engine.model
                ),
                Err(e) => println!("Model {}: Error - {}", config.ai_engine.model, e),
            }
        }
        Err(e) => println!("Ollama: Error - {}", e),
    }

    match Database::open(&config.database.path) {
        Ok(db) => {
            println!("\nDatabase ({}):", config.database.path);
            println!("  Analyses: {}", db.get_analysis_count()?);
        }
        Err(e) => println!("\nDatabase: Error - {}", e),
    }

    println!("\nConfiguration:");
    println!("  Listen: {}:{}", config.web.host, config.web.port);
    println!("  Upload dir: {}", config.uploads.dir);
    println!("  Allowed types: {}", config.uploads.allowed_extensions.join(", "));

    Ok(())
}

/// Initialize a new Emotiscope directory
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(EmotiscopeError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let config = AppConfig::default();
    std::fs::create_dir_all(target.join(&config.uploads.dir))?;
    config.save(&config_path)?;

    println!("Emotiscope initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - {}/", config.uploads.dir);
    println!("\nNext steps:");
    println!("  1. Start Ollama and pull the model: ollama pull {}", config.ai_engine.model);
    println!("  2. Start the web UI: emotiscope serve");

    Ok(())
}

//! refgraph CLI - Command line interface for refgraph
//!
//! Crawls the graph of GitHub issues and pull requests that reference each
//! other and prints it as it grows.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use refgraph_core::{Config, Secrets};
use refgraph_github::GitHubClient;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CrawlArgs, RefsArgs};

/// refgraph: Crawl GitHub issue and pull request reference graphs
#[derive(Parser, Debug)]
#[command(name = "refgraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Taxonomy file (overrides config and env)
    #[arg(long, global = true, env = "REFGRAPH_TAXONOMY")]
    taxonomy: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Crawl the reference graph starting at an issue or pull request URL
    #[command(visible_alias = "c")]
    Crawl(CrawlArgs),

    /// Print the references found in a piece of text
    Refs(RefsArgs),

    /// Show the authenticated GitHub user
    Whoami,

    /// Show current configuration
    Config,

    /// Create a secrets file template for the GitHub token
    InitSecrets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let (concurrency, max_depth) = match &cli.command {
        Some(Commands::Crawl(args)) => (args.concurrency, args.max_depth),
        _ => (None, None),
    };
    let config = Config::load_with_overrides(concurrency, max_depth, cli.taxonomy.clone())?;

    if cli.verbose {
        tracing::info!(
            concurrency = config.crawl.concurrency,
            max_depth = ?config.crawl.max_depth,
            api_url = %config.github.api_url,
            taxonomy = ?config.taxonomy,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("refgraph {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Crawl(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Refs(args)) => {
            args.execute(&config)?;
        }
        Some(Commands::Whoami) => {
            let client = GitHubClient::from_secrets(&config.github)?;
            if !client.is_authenticated() {
                anyhow::bail!(
                    "No GitHub token. Set GITHUB_TOKEN or run `refgraph init-secrets`"
                );
            }
            let viewer = client.viewer().await?;
            println!("Logged in as {}", viewer.login);
            if let Some(avatar) = viewer.avatar_url {
                println!("  avatar: {}", avatar);
            }
        }
        Some(Commands::Config) => print_config(&config),
        Some(Commands::InitSecrets) => {
            let path = Secrets::default_secrets_path()
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
            Secrets::create_template(&path)?;
            println!("Created {}", path.display());
            println!("Add your GitHub token to it, or set GITHUB_TOKEN instead.");
        }
        None => {
            println!("refgraph - Crawl GitHub issue and pull request reference graphs");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config) {
    println!("refgraph Configuration");
    println!("======================");
    println!();
    println!("Crawl Settings:");
    println!("  concurrency: {}", config.crawl.concurrency);
    match config.crawl.max_depth {
        Some(depth) => println!("  max_depth: {}", depth),
        None => println!("  max_depth: (unlimited)"),
    }
    println!();
    println!("GitHub Settings:");
    println!("  api_url: {}", config.github.api_url);
    println!("  timeout: {:?}", config.github.timeout);
    println!("  page_size: {}", config.github.page_size);
    println!();
    match &config.taxonomy {
        Some(path) => println!("Taxonomy: {}", path.display()),
        None => println!("Taxonomy: (built-in)"),
    }
    println!();

    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
    if let Some(path) = Secrets::default_secrets_path() {
        println!("Secrets file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found)");
        }
    }
}

//! gitauthors command-line tool.
//!
//! Builds and inspects the cache that maps a repository's commit author
//! emails to GitHub identities, and generates / validates its configuration.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gitauthors_core::config::{expand_tilde, AppConfig};
use gitauthors_core::git::{GitClient, GitHubClient};
use gitauthors_core::{CacheStore, IdentityResolver, ResolutionRequest, SyncEngine, SyncOutcome};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Map commit author emails to GitHub identities.
#[derive(Parser, Debug)]
#[command(
    name = "gitauthors",
    version,
    about = "Build and inspect a cache of commit authors' GitHub identities"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "gai.toml")]
    config: String,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Update the cache with the authors of new commits.
    Sync,

    /// Resolve a single email without touching the cache.
    Lookup {
        /// Author email to resolve.
        email: String,

        /// A commit authored with this email.
        #[arg(long)]
        commit: String,

        /// Only ask for the commit's author, never search users.
        #[arg(long)]
        skip_search: bool,
    },

    /// Print the cached identities.
    Show,

    /// Validate a configuration file.
    Validate,

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./gai.toml")]
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = expand_tilde(Path::new(&cli.config));
    init_tracing(cli.verbose, &config_path);

    match run(cli.command, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins, then `-v`, then the config file's `log_level`.
fn init_tracing(verbose: u8, config_path: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => AppConfig::load_from_file(config_path)
                .map(|c| c.log_level)
                .unwrap_or_else(|_| "warn".to_string()),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        };
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

async fn run(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(config_path),
        Commands::Show => cmd_show(config_path).await,
        Commands::Sync => {
            let result = cmd_sync(config_path).await;
            if result.is_err() {
                println!("{}", style::error("Failed to build the cache"));
            }
            result
        }
        Commands::Lookup {
            email,
            commit,
            skip_search,
        } => cmd_lookup(config_path, email, commit, skip_search).await,
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

fn require_token(config: &AppConfig) -> Result<String> {
    config
        .github
        .token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("has no {}", config.github.token_env))
}

fn build_resolver(config: &AppConfig, token: String) -> Result<IdentityResolver> {
    let client = GitHubClient::new(&config.github.api_url, token)
        .context("failed to create GitHub client")?;
    Ok(IdentityResolver::new(Arc::new(client))
        .with_noreply_domain(config.github.noreply_domain.clone()))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let token = require_token(&config)?;
    let resolver = build_resolver(&config, token.clone())?;

    let repository = config.repository.clone();
    let client = tokio::task::spawn_blocking(move || GitClient::prepare(&repository, Some(&token)))
        .await
        .context("repository preparation was interrupted")?
        .context("failed to prepare the repository")?;
    debug!(path = %client.repo_path().display(), "repository ready");

    let engine = SyncEngine::new(config.sync_settings(), Arc::new(resolver));
    let outcome = engine
        .run_cycle(&client)
        .await
        .context("sync cycle failed")?;

    match outcome {
        SyncOutcome::Updated(stats) => {
            println!("{}", style::success("Build the cache successfully"));
            println!(
                "  {}",
                style::dim(&format!(
                    "{} commit(s), {} new author(s), cursor {}",
                    stats.commits_scanned, stats.resolved, stats.cursor
                ))
            );
            Ok(())
        }
        SyncOutcome::NoChange { .. } => {
            println!("{}", style::success("Nothing new"));
            Ok(())
        }
        SyncOutcome::NoCommits => anyhow::bail!("Has no commits"),
    }
}

async fn cmd_lookup(
    config_path: &Path,
    email: String,
    commit: String,
    skip_search: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let token = require_token(&config)?;
    let resolver = build_resolver(&config, token)?;

    let request = ResolutionRequest {
        email,
        commit_hash: commit,
        owner: config.repository.owner.clone(),
        repo_name: config.repository.name.clone(),
        skip_search: skip_search || config.github.skip_search,
    };
    let name = resolver.resolve(&request).await?;

    println!("Email   : {}", request.email);
    println!("Identity: {}", name);
    Ok(())
}

async fn cmd_show(config_path: &Path) -> Result<()> {
    let config =
        AppConfig::load_from_file(config_path).context("failed to load configuration file")?;
    let cache_path = config.cache_path();
    let cache = CacheStore::new(&cache_path).load().await;

    println!();
    println!("{}", style::header(&format!("Author cache: {}", cache_path.display())));
    println!(
        "  Cursor: {}",
        cache.cursor().unwrap_or("none (never synced)")
    );
    println!();

    if cache.is_empty() {
        println!("{}", style::warn("No authors cached yet."));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Email", "Identity"]);
    for (email, name) in cache.authors() {
        table.add_row(vec![Cell::new(email), Cell::new(name)]);
    }

    println!("{}", table);
    println!();
    println!("{} author(s)", cache.len());
    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    if let Err(e) = config.normalize().and_then(|()| config.validate()) {
        println!("  [FAIL] Validation error: {}", e);
        anyhow::bail!("configuration validation failed");
    }
    println!("  [OK] All required fields are valid");

    let repo = &config.repository;
    println!();
    println!("Configuration summary:");
    println!("  Remote        : {}", repo.remote);
    println!("  Repository    : {}/{}", repo.owner, repo.name);
    println!("  Branch        : {}", repo.branch);
    println!("  Local path    : {}", repo.local.display());
    println!("  Private       : {}", repo.private);
    println!("  Cache file    : {}", config.cache.path.display());
    println!("  Concurrency   : {}", config.cache.concurrency_limit);
    println!("  GitHub API    : {}", config.github.api_url);
    println!(
        "  GitHub token  : {} ({})",
        style::presence(config.github.token.is_some()),
        config.github.token_env
    );
    println!();
    println!("Configuration is valid.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# gitauthors configuration
log_level = "warn"

[repository]
# Either a remote URL, or owner + name.
remote = "https://github.com/owner/repo.git"
# owner = "owner"
# name = "repo"
local = "."
branch = "master"
private = false
skip_https_check = false

[cache]
path = "gai-cache.json"
concurrency_limit = 60

[github]
api_url = "https://api.github.com"
token_env = "GITHUB_ACCESS_TOKEN"
skip_search = false
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Set the repository remote (or owner and name)");
    println!("  2. Export a token: export GITHUB_ACCESS_TOKEN=...");
    println!(
        "  3. Validate with: gitauthors validate --config {}",
        output.display()
    );
    println!("  4. Build the cache: gitauthors sync --config {}", output.display());

    Ok(())
}

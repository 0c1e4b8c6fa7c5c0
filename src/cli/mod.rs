//! Command-line interface for medialoc.
//!
//! Provides commands for localizing one document, localizing every
//! matching document, watching a vault for edits, and showing the
//! resolved configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{ConsoleNotifier, FsStorage, HttpFetcher};
use crate::config::{self, ResolvedConfig};
use crate::core::Orchestrator;
use crate::domain::DocumentId;
use crate::ingest::{Scheduler, VaultWatcher};

/// medialoc - Download remote media referenced by notes into the vault
#[derive(Parser, Debug)]
#[command(name = "medialoc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Vault root directory
    #[arg(long, global = true, env = "MEDIALOC_VAULT", default_value = ".")]
    pub vault: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Localize media in one document
    Process {
        /// Document path (vault-relative, or absolute inside the vault)
        document: PathBuf,

        /// Don't print a result notice
        #[arg(short, long)]
        quiet: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Localize media in every matching document
    ProcessAll {
        /// Glob over vault-relative paths (defaults to the include pattern)
        #[arg(short, long)]
        glob: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Watch the vault and localize edited documents until Ctrl-C
    Watch,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Process {
                document,
                quiet,
                json,
            } => {
                process_document(&self.vault, &document, quiet, json).await
            }
            Commands::ProcessAll { glob, json } => {
                process_all(&self.vault, glob.as_deref(), json).await
            }
            Commands::Watch => {
                watch(&self.vault).await
            }
            Commands::Config => {
                show_config(&self.vault)
            }
        }
    }
}

/// Wire the default collaborators for a vault
fn build_orchestrator(cfg: &ResolvedConfig) -> Result<Orchestrator> {
    let storage = FsStorage::new(&cfg.vault);
    let fetcher = HttpFetcher::with_timeout(Duration::from_secs(cfg.settings.fetch_timeout_secs))
        .context("Failed to build HTTP client")?;

    Ok(Orchestrator::new(
        Arc::new(storage),
        Arc::new(fetcher),
        Arc::new(ConsoleNotifier),
        cfg.settings.clone(),
    ))
}

/// Turn a user-supplied path into a document ID
fn document_id(vault: &Path, document: &Path) -> Result<DocumentId> {
    let relative = if document.is_absolute() {
        let absolute = document
            .canonicalize()
            .with_context(|| format!("Document not found: {}", document.display()))?;
        absolute
            .strip_prefix(vault)
            .with_context(|| {
                format!(
                    "Document {} is outside the vault {}",
                    document.display(),
                    vault.display()
                )
            })?
            .to_path_buf()
    } else {
        document.to_path_buf()
    };

    Ok(DocumentId::new(relative.to_string_lossy()))
}

/// Localize one document
async fn process_document(vault: &Path, document: &Path, quiet: bool, json: bool) -> Result<()> {
    let cfg = config::load_config(vault)?;
    let doc = document_id(&cfg.vault, document)?;
    if !cfg.settings.includes(doc.as_str()) {
        tracing::warn!(
            document = %doc,
            include = %cfg.settings.include,
            "Document does not match the include pattern, processing anyway"
        );
    }
    let orchestrator = build_orchestrator(&cfg)?;

    let report = orchestrator.process_document(&doc, quiet || json).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.failed > 0 {
        eprintln!("⚠️  {} reference(s) could not be localized", report.failed);
    }

    Ok(())
}

/// Localize every document selected by a glob or the include pattern
async fn process_all(vault: &Path, pattern: Option<&str>, json: bool) -> Result<()> {
    let cfg = config::load_config(vault)?;
    let orchestrator = build_orchestrator(&cfg)?;

    let report = match pattern {
        Some(pattern) => {
            let glob = glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
            orchestrator
                .process_all(|doc| glob.matches(doc.as_str()))
                .await?
        }
        None => orchestrator.process_matching().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.errors > 0 {
        anyhow::bail!("{} document(s) could not be processed", report.errors);
    }

    Ok(())
}

/// Watch the vault and process edited documents on the scheduler's timer
async fn watch(vault: &Path) -> Result<()> {
    let cfg = config::load_config(vault)?;
    let orchestrator = Arc::new(build_orchestrator(&cfg)?);

    let scheduler = Arc::new(Scheduler::new(orchestrator.clone()).context("Failed to create scheduler")?);
    let watcher = VaultWatcher::new(&cfg.vault);
    let handle = watcher
        .watch(scheduler.clone())
        .with_context(|| format!("Failed to watch {}", cfg.vault.display()))?;

    scheduler.start();

    eprintln!("👀 Watching {} (Ctrl-C to stop)", cfg.vault.display());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    eprintln!();
    handle.stop().await?;
    scheduler.stop().await?;

    let pending = scheduler
        .queue()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .len();
    if pending > 0 {
        tracing::info!(pending, "Stopped with documents still queued");
    }

    let registry = orchestrator.registry();
    if !registry.is_empty() {
        tracing::debug!(links = registry.len(), "Hashes recorded this session");
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(vault: &Path) -> Result<()> {
    let cfg = config::load_config(vault)?;

    println!("Vault:       {}", cfg.vault.display());
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Settings:");
    let yaml = serde_yaml::to_string(&cfg.settings).context("Failed to render settings")?;
    for line in yaml.lines() {
        println!("  {}", line);
    }

    if !cfg.rejected.is_empty() {
        println!();
        println!("Rejected values:");
        for error in &cfg.rejected {
            println!("  - {}", error);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["medialoc", "--vault", "/v", "process", "a.md", "--quiet"]).unwrap();
        assert_eq!(cli.vault, PathBuf::from("/v"));
        assert!(matches!(cli.command, Commands::Process { quiet: true, json: false, .. }));

        let cli = Cli::try_parse_from(["medialoc", "process-all", "--glob", "notes/*.md", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::ProcessAll { glob: Some(_), json: true }));
    }

    #[test]
    fn test_relative_document_id() {
        let doc = document_id(Path::new("/vault"), Path::new("notes/a.md")).unwrap();
        assert_eq!(doc.as_str(), "notes/a.md");
    }
}

//! CLI entry point for `sift`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sift::auth::{OAuthConfig, OAuthFlow, TokenStore};
use sift::config::Settings;
use sift::providers::ai::provider_from_settings;
use sift::providers::calendar::{CalendarProvider, GoogleCalendarClient};
use sift::providers::email::{GmailClient, MailProvider};
use sift::server::{self, AppState};
use sift::services::{BackupManager, Classifier, ReportRenderer, TriagePipeline};

#[derive(Parser)]
#[command(name = "sift", version, about = "LLM-assisted triage for a single Gmail inbox")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage unread emails once and emit the report
    Run {
        /// Cap on unread messages examined this run
        #[arg(long, value_name = "N")]
        max_emails: Option<u32>,
        /// Classify and route without forwarding, labeling, or marking read
        #[arg(long)]
        dry_run: bool,
    },
    /// Authorize against Google and store the OAuth token
    Auth,
    /// Revoke the stored grant and delete the token file
    Revoke,
    /// Serve the OAuth and rule-configuration HTTP API
    Serve,
    /// Back up settings, credentials, and token files
    Backup {
        /// Directory to create the backup under
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Restore a backup directory into the config directory
    Restore {
        /// Backup directory created by `sift backup` (defaults to the newest)
        dir: Option<PathBuf>,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved settings path
    ConfigPath,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path)?;
    settings.validate()?;

    match cli.command {
        Commands::Run {
            max_emails,
            dry_run,
        } => cmd_run(settings, max_emails, dry_run).await,
        Commands::Auth => cmd_auth(settings_path, settings).await,
        Commands::Revoke => {
            build_flow(&settings)?.revoke().await?;
            println!("Credentials revoked.");
            Ok(())
        }
        Commands::Serve => cmd_serve(settings_path, settings).await,
        Commands::Backup { output } => cmd_backup(&settings_path, &settings, output),
        Commands::Restore { dir, force } => cmd_restore(&settings_path, dir, force),
        Commands::ConfigPath => {
            println!("{}", settings_path.display());
            Ok(())
        }
    }
}

/// Initializes tracing. Returns the appender guard that must stay alive
/// for file logging to flush.
fn init_logging(
    verbose: u8,
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("sift={level}")));

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let file = path
                .file_name()
                .context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

/// Builds the OAuth flow from settings.
fn build_flow(settings: &Settings) -> anyhow::Result<Arc<OAuthFlow>> {
    let config = OAuthConfig::from_credentials_file(&settings.gmail.credentials_path)?;
    let store = TokenStore::new(settings.gmail.token_path.clone());
    Ok(Arc::new(OAuthFlow::new(
        config,
        &settings.server.external_url,
        store,
    )))
}

async fn cmd_run(settings: Settings, max_emails: Option<u32>, dry_run: bool) -> anyhow::Result<()> {
    let flow = build_flow(&settings)?;
    let mail = GmailClient::new(flow.clone());

    let llm = provider_from_settings(&settings.ai)?;
    let classifier = Classifier::new(
        llm,
        &settings.ruleset(),
        settings.ai.temperature,
        settings.ai.max_tokens,
    );

    let calendar: Option<Box<dyn CalendarProvider>> = settings.calendar.enabled.then(|| {
        Box::new(GoogleCalendarClient::new(
            flow.clone(),
            settings.calendar.calendar_id.clone(),
        )) as Box<dyn CalendarProvider>
    });

    let max = max_emails.unwrap_or(settings.gmail.max_results);
    let send_report = settings.report.send_email && !dry_run;
    let html_path = settings.report.html_path.clone();

    let mut pipeline = TriagePipeline::new(mail, classifier, calendar, settings);
    if dry_run {
        pipeline = pipeline.dry_run();
    }

    let report = pipeline.run(max).await?;

    let renderer = ReportRenderer::new(&report);
    renderer
        .write_html(&html_path)
        .with_context(|| format!("writing report to {}", html_path.display()))?;

    if send_report && report.processed > 0 {
        let profile = pipeline.mail().profile().await?;
        pipeline
            .mail()
            .send(&renderer.email(&profile.email_address))
            .await?;
        println!("Report emailed to {}", profile.email_address);
    }

    println!(
        "Processed {} emails: {} forwarded, {} spam skipped, {} errors.",
        report.processed, report.forwarded, report.skipped_spam, report.errors
    );
    println!("Report written to {}", html_path.display());
    Ok(())
}

async fn cmd_auth(settings_path: PathBuf, settings: Settings) -> anyhow::Result<()> {
    let flow = build_flow(&settings)?;
    let bind = settings.server.bind.clone();
    let state = AppState::new(settings_path, settings, flow.clone());

    let url = flow.authorize_url()?;
    println!("Visit this URL to authorize sift:\n\n{url}\n");
    println!("Waiting for the OAuth callback on {bind} ...");

    let authorized = state.authorized.clone();
    server::serve(state, &bind, async move { authorized.notified().await }).await?;

    println!("Authorization complete. Token stored.");
    Ok(())
}

async fn cmd_serve(settings_path: PathBuf, settings: Settings) -> anyhow::Result<()> {
    let flow = build_flow(&settings)?;
    let bind = settings.server.bind.clone();
    let state = AppState::new(settings_path, settings, flow);

    println!("Serving on {bind} (ctrl-c to stop)");
    server::serve(state, &bind, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

fn cmd_backup(
    settings_path: &Path,
    settings: &Settings,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let root = output.unwrap_or_else(|| {
        settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("backups")
    });

    let files = vec![
        settings_path.to_path_buf(),
        settings.gmail.credentials_path.clone(),
        settings.gmail.token_path.clone(),
    ];

    let info = BackupManager::new(root).backup(&files)?;
    println!(
        "Backed up {} files to {}",
        info.files.len(),
        info.dir.display()
    );
    Ok(())
}

fn cmd_restore(settings_path: &Path, backup_dir: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let config_dir = settings_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let backup_dir = match backup_dir {
        Some(dir) => dir,
        None => BackupManager::new(config_dir.join("backups"))
            .list()?
            .into_iter()
            .next()
            .context("no backups found; pass a backup directory explicitly")?,
    };
    let root = backup_dir.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

    let restored = BackupManager::new(root).restore(&backup_dir, &config_dir, force)?;
    println!(
        "Restored {} files from {} to {}",
        restored.len(),
        backup_dir.display(),
        config_dir.display()
    );
    Ok(())
}

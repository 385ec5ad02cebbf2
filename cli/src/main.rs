use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use backoffice::mail::{
    recipients, send_campaign, Campaign, CampaignSettings, ConsoleMailer, Mailer, Recipient,
    SmtpMailer,
};
use backoffice::pipeline::{MemorySink, Sink, SyncConfig, SyncOutcome, SyncPipeline};
use backoffice::sheets::GoogleSheets;
use backoffice::supabase::SupabaseClient;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "backoffice", about = "Applications sheet sync and mail campaigns")]
struct Cli {
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the configured worksheet with every application record
    SyncSheet {
        /// Print the table as CSV instead of writing the worksheet.
        /// Only the Supabase variables are required
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a templated mail campaign
    Send {
        campaign: CampaignArg,

        /// Recipient file (default: schools.txt, or events.csv for info-session-link)
        #[arg(long)]
        recipients: Option<PathBuf>,

        /// Comma separated addresses (info-session only)
        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,

        /// Render and log every message without contacting the relay
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CampaignArg {
    Schools,
    InfoSession,
    InfoSessionLink,
}

impl From<CampaignArg> for Campaign {
    fn from(arg: CampaignArg) -> Self {
        match arg {
            CampaignArg::Schools => Campaign::SchoolOutreach,
            CampaignArg::InfoSession => Campaign::InfoSession,
            CampaignArg::InfoSessionLink => Campaign::InfoSessionLink,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
    backoffice::config::load_dotenv();

    let result = match cli.command {
        Commands::SyncSheet { dry_run } => sync_sheet(dry_run).await,
        Commands::Send {
            campaign,
            recipients,
            to,
            dry_run,
        } => send(campaign, recipients, to, dry_run).await,
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn sync_sheet(dry_run: bool) -> Result<ExitCode> {
    let config = if dry_run {
        SyncConfig::load_for_dry_run()
    } else {
        SyncConfig::load()
    }
    .context("loading sync configuration")?;
    let supabase = SupabaseClient::new(
        &config.supabase_url,
        &config.supabase_service_key,
        config.timeout(),
    )
    .context("creating Supabase client")?;

    if dry_run {
        let sink = MemorySink::new();
        let outcome = run_sync(&config, supabase, sink.clone()).await?;

        if let Some(table) = sink.contents(&config.target()).await {
            table
                .write_csv(std::io::stdout())
                .context("writing CSV to stdout")?;
        }
        tracing::info!(state = ?outcome.state, rows = outcome.rows, "dry run finished");
        return Ok(ExitCode::SUCCESS);
    }

    let sheets = GoogleSheets::from_credentials_file(
        &config.google_sheets_credentials_path,
        config.timeout(),
    )
    .context("loading Google service account")?;

    let outcome = run_sync(&config, supabase, sheets).await?;
    tracing::info!(state = ?outcome.state, rows = outcome.rows, "sync finished");
    Ok(ExitCode::SUCCESS)
}

async fn run_sync<K: Sink>(
    config: &SyncConfig,
    supabase: SupabaseClient,
    sink: K,
) -> Result<SyncOutcome> {
    let mut pipeline = SyncPipeline::new(supabase.clone(), supabase, sink, config.target())
        .collection(&config.supabase_table)
        .layout(config.layout())
        .resolve_concurrency(config.resolve_concurrency);

    let outcome = pipeline
        .run()
        .await
        .with_context(|| format!("syncing {} into {}", config.supabase_table, config.target()))?;
    Ok(outcome)
}

async fn send(
    arg: CampaignArg,
    path: Option<PathBuf>,
    to: Vec<String>,
    dry_run: bool,
) -> Result<ExitCode> {
    let campaign = Campaign::from(arg);
    let settings = CampaignSettings::load().context("loading campaign settings")?;
    let recipients = load_recipients(arg, path, to)?;

    if recipients.is_empty() {
        tracing::warn!(?campaign, "no recipients, nothing to send");
        return Ok(ExitCode::SUCCESS);
    }

    let mailer: Box<dyn Mailer> = if dry_run {
        Box::new(ConsoleMailer)
    } else {
        Box::new(SmtpMailer::from_env().context("configuring SMTP")?)
    };
    let report = send_campaign(mailer.as_ref(), campaign, &recipients, &settings).await;

    for failure in &report.failed {
        eprintln!("failed: {} ({})", failure.email, failure.error.summary());
    }
    println!(
        "sent {} of {} messages",
        report.sent.len(),
        report.attempted()
    );

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

fn load_recipients(
    arg: CampaignArg,
    path: Option<PathBuf>,
    to: Vec<String>,
) -> Result<Vec<Recipient>> {
    let recipients = match arg {
        CampaignArg::Schools => {
            reject_inline(&to)?;
            let path = path.unwrap_or_else(|| PathBuf::from("schools.txt"));
            recipients::load_tab_separated(&path)?
        }
        CampaignArg::InfoSessionLink => {
            reject_inline(&to)?;
            let path = path.unwrap_or_else(|| PathBuf::from("events.csv"));
            recipients::load_csv(&path)?
        }
        CampaignArg::InfoSession => {
            if path.is_some() {
                bail!("the info-session campaign takes addresses via --to, not --recipients");
            }
            if to.is_empty() {
                bail!("the info-session campaign needs --to");
            }
            recipients::parse_inline(&to)
        }
    };
    Ok(recipients)
}

fn reject_inline(to: &[String]) -> Result<()> {
    if !to.is_empty() {
        bail!("--to only applies to the info-session campaign, use --recipients");
    }
    Ok(())
}

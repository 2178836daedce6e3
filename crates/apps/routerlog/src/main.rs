//! routerlog - Save an ASUS router's web history to CSV files
//!
//! One pass per invocation: log in, page through the router's web history
//! since the last saved row, append to `History-<timestamp>.csv`, exit.

use chrono::Utc;
use clap::Parser;
use history::{
    DisplayZone, RouterClient, SettingsOverrides, SyncError, SyncSettings, save_settings,
    sync_history,
};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code when login yields no session token
const EXIT_EMPTY_TOKEN: u8 = 2;
/// Exit code when a history page can't be fetched or parsed
const EXIT_NO_CODE: u8 = 3;

#[derive(Parser)]
#[command(name = "routerlog")]
#[command(about = "Append an ASUS router's web history to local CSV files")]
#[command(version)]
struct Cli {
    /// Router admin URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Admin username
    #[arg(long, short)]
    username: Option<String>,

    /// Admin password (prefer ROUTERLOG_PASSWORD or the settings file)
    #[arg(long, short)]
    password: Option<String>,

    /// Maximum number of history pages to fetch
    #[arg(long, value_name = "N")]
    max_pages: Option<u32>,

    /// Fetch history from this point instead of the last saved row
    /// (unix seconds, RFC 3339, "YYYY-MM-DD HH:MM:SS" or "YYYY-MM-DD")
    #[arg(long, value_name = "DATE")]
    from: Option<String>,

    /// Field delimiter for the CSV output
    #[arg(long, short)]
    delimiter: Option<String>,

    /// Folder holding the History-*.csv files
    #[arg(long, short, value_name = "DIR")]
    output_folder: Option<PathBuf>,

    /// Render dates in UTC instead of local time
    #[arg(long)]
    utc: bool,

    /// strftime format for the date column
    #[arg(long, value_name = "FORMAT")]
    date_format: Option<String>,

    /// Settings file (defaults to ~/.config/routerlog/settings.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also print written rows to stdout
    #[arg(long)]
    echo: bool,

    /// Store the given options in the settings file and exit without syncing
    #[arg(long)]
    save_settings: bool,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            max_pages: self.max_pages,
            from_date: self.from.clone(),
            delimiter: self.delimiter.clone(),
            output_folder: self.output_folder.clone(),
            time_zone: self.utc.then_some(DisplayZone::Utc),
            date_format: self.date_format.clone(),
        }
    }
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            match e.downcast_ref::<SyncError>() {
                Some(SyncError::EmptyToken) => ExitCode::from(EXIT_EMPTY_TOKEN),
                Some(SyncError::NoCode { .. }) => ExitCode::from(EXIT_NO_CODE),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    if cli.save_settings {
        let path = save_settings(cli.config.as_deref(), cli.overrides())?;
        info!("Settings saved to {}", path.display());
        return Ok(());
    }

    let started_at = Utc::now();

    let mut settings = SyncSettings::load(cli.config.as_deref())?;
    settings.apply(cli.overrides())?;
    if let Err(e) = settings.validate() {
        if let Some(path) = SyncSettings::default_settings_path() {
            info!("Settings can be stored in {}", path.display());
        }
        return Err(e);
    }

    let client = RouterClient::new(&settings.base_url)?;
    info!("Syncing web history from {}", client.base_url());

    let stats = sync_history(&client, settings.to_options(started_at, cli.echo))?;

    if let Some(path) = &stats.output_path {
        info!(
            "Wrote {} row(s) from {} page(s) to {} in {} ms",
            stats.rows_written,
            stats.pages_fetched,
            path.display(),
            stats.duration_ms
        );
    }
    Ok(())
}

mod menu;
mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use indicatif::MultiProgress;
use owo_colors::OwoColorize;
use tdconvert::discover;
use tdconvert::online::Telegram;
use tdconvert::{report, Config, ConversionResult, Converter, Direction, DEFAULT_API_ID};
use tracing_subscriber::EnvFilter;

use crate::progress::Progress;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder searched (recursively) for Telethon/Pyrogram .session files
    #[arg(long, default_value = "sessions")]
    sessions_dir: PathBuf,

    /// Folder searched for tdata folders; converted tdata is written here
    #[arg(long, default_value = "tdatas")]
    tdatas_dir: PathBuf,

    /// Root for converted .session files
    #[arg(long, default_value = "converted")]
    output_dir: PathBuf,

    /// JSON results log
    #[arg(long, default_value = "conversion_results.json")]
    results_file: PathBuf,

    /// Conversion direction (skips the menu)
    #[arg(short, long, value_enum)]
    direction: Option<Direction>,

    /// Local passcode for reading and writing tdata
    #[arg(short, long)]
    passcode: Option<String>,

    /// Also convert the installed Telegram Desktop's tdata
    #[arg(long)]
    desktop: bool,

    /// API id for online lookups and for Pyrogram sessions that carry none
    #[arg(long, default_value_t = DEFAULT_API_ID)]
    api_id: i32,

    /// Skip the online lookup; use only the session's cache and sidecar
    #[arg(long)]
    offline: bool,

    /// Conversions to run at once
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// tdata key file name
    #[arg(long, default_value = "data")]
    key_file: String,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            sessions_dir: self.sessions_dir.clone(),
            tdatas_dir: self.tdatas_dir.clone(),
            output_dir: self.output_dir.clone(),
            results_file: self.results_file.clone(),
            passcode: self.passcode.clone(),
            key_file: self.key_file.clone(),
            api_id: self.api_id,
            jobs: self.jobs.max(1),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn banner() {
    println!();
    println!("{}", "  Telegram session converter".bright_cyan().bold());
    println!(
        "{}",
        "  Telethon ⇄ Pyrogram ⇄ Telegram Desktop (tdata)".dimmed()
    );
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    banner();

    let direction = match args.direction {
        Some(direction) => direction,
        None => match menu::choose_direction()? {
            Some(direction) => direction,
            None => {
                println!("Bye");
                return Ok(());
            }
        },
    };
    println!("Direction: {}", direction.to_string().bright_cyan());

    let config = args.config();
    let mut discovery = discover::candidates(&config, direction)
        .context("Failed to scan for sessions")?;
    if args.desktop {
        let install = tdconvert::get_default_tdata_path();
        discovery
            .candidates
            .extend(discover::desktop_candidate(direction, install.as_deref()));
    }

    println!(
        "Found {} item(s) to convert, {} skipped",
        discovery.candidates.len(),
        discovery.skipped.len()
    );

    let mut results: Vec<ConversionResult> = Vec::new();
    if !discovery.candidates.is_empty() {
        let multi = MultiProgress::new();
        let progress = Arc::new(Progress::new(&multi, &discovery.candidates)?);

        let mut converter = Converter::new(config.clone()).with_reporter(progress);
        if !args.offline {
            converter = converter.with_lookup(Arc::new(Telegram::new(config.api_id)));
        }
        results = converter.run_batch(discovery.candidates, direction).await;
        multi.clear()?;
    } else {
        println!(
            "{}",
            format!(
                "Nothing to convert: put sessions in {:?} or tdata folders in {:?}",
                config.sessions_dir, config.tdatas_dir
            )
            .yellow()
        );
    }
    results.extend(discovery.skipped.iter().map(ConversionResult::skipped));

    if !results.is_empty() {
        println!("{}", report::render_table(&results));
    }

    report::save_results(&config.results_file, &results)
        .with_context(|| format!("Failed to write {:?}", config.results_file))?;

    println!();
    println!("{}", report::summary_line(&results).bold());
    println!("Results saved to {}", config.results_file.display());

    Ok(())
}

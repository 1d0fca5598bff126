//! Conversion results: the JSON log and the terminal table

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use comfy_table::presets::UTF8_FULL;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};
use serde::{Deserialize, Serialize};

use crate::detect::SessionKind;
use crate::discover::Skipped;
use crate::profile::AccountInfo;
use crate::Result;

/// Characters of an error message shown in the table
const TABLE_ERROR_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Skipped,
}

/// Outcome of converting one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source_file: String,
    pub source_name: String,
    pub source_kind: Option<SessionKind>,
    pub target_kind: Option<SessionKind>,
    pub status: Status,
    pub account_info: Option<AccountInfo>,
    pub output_paths: Vec<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl ConversionResult {
    /// A result that has not succeeded yet (status `error`, no error message)
    pub fn pending(source: &Path, source_kind: SessionKind, target_kind: SessionKind) -> Self {
        Self {
            source_file: source.display().to_string(),
            source_name: source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_kind: Some(source_kind),
            target_kind: Some(target_kind),
            status: Status::Error,
            account_info: None,
            output_paths: Vec::new(),
            error: None,
            timestamp: Local::now(),
        }
    }

    pub fn skipped(skipped: &Skipped) -> Self {
        Self {
            source_file: skipped.source.display().to_string(),
            source_name: skipped
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_kind: None,
            target_kind: None,
            status: Status::Skipped,
            account_info: None,
            output_paths: Vec::new(),
            error: Some(skipped.reason.clone()),
            timestamp: Local::now(),
        }
    }

    pub fn succeed(mut self, info: AccountInfo, outputs: Vec<PathBuf>) -> Self {
        self.status = Status::Success;
        self.account_info = Some(info);
        self.output_paths = outputs.iter().map(|p| p.display().to_string()).collect();
        self.error = None;
        self
    }

    pub fn fail(mut self, error: impl ToString) -> Self {
        self.status = Status::Error;
        self.error = Some(error.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Source file name without its extension
    fn source_stem(&self) -> String {
        Path::new(&self.source_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_name.clone())
    }
}

/// The JSON results file
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultsLog {
    pub conversion_date: DateTime<Local>,
    pub total_sessions: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<ConversionResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub fn counts(results: &[ConversionResult]) -> Counts {
    let mut counts = Counts::default();
    for result in results {
        match result.status {
            Status::Success => counts.successful += 1,
            Status::Error => counts.failed += 1,
            Status::Skipped => counts.skipped += 1,
        }
    }
    counts
}

impl ResultsLog {
    pub fn new(results: Vec<ConversionResult>) -> Self {
        let Counts {
            successful,
            failed,
            skipped,
        } = counts(&results);
        Self {
            conversion_date: Local::now(),
            total_sessions: results.len(),
            successful,
            failed,
            skipped,
            results,
        }
    }
}

/// Write the results log as pretty UTF-8 JSON
pub fn save_results(path: &Path, results: &[ConversionResult]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let log = ResultsLog::new(results.to_vec());
    let json = serde_json::to_string_pretty(&log)?;
    std::fs::write(path, json)?;
    tracing::info!("Saved {} results to {:?}", log.total_sessions, path);
    Ok(())
}

/// Error text as shown in the table: the first characters, then "..."
pub fn truncate_error(error: &str) -> String {
    let head: String = error.chars().take(TABLE_ERROR_CHARS).collect();
    format!("{}...", head)
}

fn count_cell(count: Option<usize>) -> Cell {
    Cell::new(count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()))
        .set_alignment(CellAlignment::Center)
}

/// Results table for the terminal
pub fn render_table(results: &[ConversionResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "№", "Name", "Username", "Phone", "User ID", "DC", "Chats", "Contacts", "Peers",
            "Status", "Output",
        ]);

    for (idx, result) in results.iter().enumerate() {
        let number = Cell::new(idx + 1).set_alignment(CellAlignment::Center);

        let row = match (&result.status, &result.account_info) {
            (Status::Success, Some(info)) => vec![
                number,
                Cell::new(&info.name).fg(Color::Green),
                Cell::new(&info.username_display).fg(Color::Yellow),
                Cell::new(&info.phone).fg(Color::Blue),
                Cell::new(
                    info.user_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(info.dc_id).set_alignment(CellAlignment::Center),
                count_cell(info.chats_count),
                count_cell(info.contacts_count),
                count_cell(info.peers_count),
                Cell::new("✓ Success").fg(Color::Green),
                Cell::new(output_names(&result.output_paths)),
            ],
            _ => {
                let mut name = result.source_stem();
                if let Some(error) = &result.error {
                    name = format!("{}\n{}", name, truncate_error(error));
                }
                let (status, color) = match result.status {
                    Status::Skipped => ("- Skipped", Color::DarkYellow),
                    _ => ("✗ Error", Color::Red),
                };
                vec![
                    number,
                    Cell::new(name),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(status).fg(color),
                    Cell::new("-"),
                ]
            }
        };
        table.add_row(row);
    }

    table
}

fn output_names(paths: &[String]) -> String {
    paths
        .iter()
        .map(|p| {
            Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.clone())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-line totals
pub fn summary_line(results: &[ConversionResult]) -> String {
    let c = counts(results);
    let mut line = format!("✓ {} successful | ✗ {} failed", c.successful, c.failed);
    if c.skipped > 0 {
        line.push_str(&format!(" | {} skipped", c.skipped));
    }
    line
}

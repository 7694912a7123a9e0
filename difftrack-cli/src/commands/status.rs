//! `difftrack status`: changed files in the working tree.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use difftrack_core::ChangeStatus;

use super::{runtime, Workspace, WorkspaceArgs};

/// Arguments for `difftrack status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusReportJson {
    root: String,
    baseline: String,
    files: Vec<FileStatusJson>,
}

#[derive(Serialize)]
struct FileStatusJson {
    path: String,
    status: ChangeStatus,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "path")]
    path: String,
}

impl StatusArgs {
    pub fn run(self, workspace: &WorkspaceArgs) -> Result<()> {
        runtime()?.block_on(self.execute(workspace))
    }

    async fn execute(self, workspace: &WorkspaceArgs) -> Result<()> {
        let ws = Workspace::open(workspace)?;
        let changes = ws.session.file_changes();
        let files: Vec<FileStatusJson> = changes
            .iter()
            .map(|(path, status)| FileStatusJson {
                path: ws.display_path(path),
                status: *status,
            })
            .collect();
        ws.session.destroy();

        if self.json {
            let payload = StatusReportJson {
                root: ws.root().display().to_string(),
                baseline: ws.repository.baseline().display().to_string(),
                files,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&ws, files);
        Ok(())
    }
}

fn print_table(ws: &Workspace, files: Vec<FileStatusJson>) {
    println!(
        "difftrack v{} | {} vs {} | {} changed",
        env!("CARGO_PKG_VERSION"),
        ws.root().display(),
        ws.repository.baseline().display(),
        files.len(),
    );
    if files.is_empty() {
        println!("No changes against the baseline.");
        return;
    }

    let rows: Vec<StatusTableRow> = files
        .into_iter()
        .map(|file| StatusTableRow {
            status: format!("{} {}", status_indicator(file.status), status_label(file.status)),
            path: file.path,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

pub(crate) fn status_label(status: ChangeStatus) -> &'static str {
    match status {
        ChangeStatus::Added => "ADDED",
        ChangeStatus::Modified => "MODIFIED",
        ChangeStatus::Missing => "MISSING",
        ChangeStatus::Removed => "REMOVED",
        ChangeStatus::Untracked => "UNTRACKED",
        ChangeStatus::Ignored => "IGNORED",
    }
}

fn status_indicator(status: ChangeStatus) -> String {
    match status {
        ChangeStatus::Added | ChangeStatus::Untracked => "■".green().bold().to_string(),
        ChangeStatus::Modified => "■".yellow().bold().to_string(),
        ChangeStatus::Missing | ChangeStatus::Removed => "■".red().bold().to_string(),
        ChangeStatus::Ignored => "■".bright_black().bold().to_string(),
    }
}

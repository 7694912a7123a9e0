//! `difftrack show`: one file's diff state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use difftrack_core::{ChangeStatus, FileDiffState};

use super::status::status_label;
use super::{resolve_file, runtime, Workspace, WorkspaceArgs};

/// Arguments for `difftrack show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// File to load, absolute or relative to the current directory.
    pub file: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ShowJson<'a> {
    path: String,
    status: Option<ChangeStatus>,
    #[serde(flatten)]
    state: &'a FileDiffState,
}

impl ShowArgs {
    pub fn run(self, workspace: &WorkspaceArgs) -> Result<()> {
        let file = resolve_file(&self.file)?;
        runtime()?.block_on(self.execute(workspace, file))
    }

    async fn execute(self, workspace: &WorkspaceArgs, file: PathBuf) -> Result<()> {
        let ws = Workspace::open(workspace)?;
        ws.session
            .activate_file(&file)
            .await
            .with_context(|| format!("failed to load {}", file.display()))?;
        let state = ws.session.active_file_state();
        let status = ws.session.file_changes().get(&file).copied();
        ws.session.destroy();

        let path = ws.display_path(&file);
        if self.json {
            let payload = ShowJson {
                path,
                status,
                state: &state,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to serialize diff state JSON")?
            );
            return Ok(());
        }

        print_summary(&path, status, &state);
        Ok(())
    }
}

fn print_summary(path: &str, status: Option<ChangeStatus>, state: &FileDiffState) {
    let label = status.map(status_label).unwrap_or("UNCHANGED");
    println!("{} {}", path.bold(), label);
    println!("  baseline: {} lines", state.old_contents.lines().count());
    println!("  working:  {} lines", state.new_contents.lines().count());

    let annotations = state.annotations.as_deref().unwrap_or_default();
    println!("  annotations: {}", annotations.len());
    for overlay in annotations {
        println!("    {}", overlay.0.to_string().bright_black());
    }
}

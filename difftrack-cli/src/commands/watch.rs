//! `difftrack watch`: follow changes until ctrl-c.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{resolve_file, runtime, Workspace, WorkspaceArgs};

/// Arguments for `difftrack watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Also keep this file active and report its reloads.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl WatchArgs {
    pub fn run(self, workspace: &WorkspaceArgs) -> Result<()> {
        let file = self.file.as_deref().map(resolve_file).transpose()?;
        runtime()?.block_on(execute(workspace, file))
    }
}

async fn execute(workspace: &WorkspaceArgs, file: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open(workspace)?;
    ws.repository
        .start_watching()
        .context("failed to watch working tree")?;

    let _status = {
        let root = ws.root().to_path_buf();
        ws.session.on_did_change_status(move |changes| {
            tracing::info!(root = %root.display(), changed = changes.len(), "status changed");
            for (path, status) in changes.iter() {
                let shown = path.strip_prefix(&root).unwrap_or(path);
                println!("{:>9}  {}", status.to_string(), shown.display());
            }
        })
    };
    let _active = ws.session.on_active_file_updates(|state| {
        tracing::info!(
            path = %state.file_path.display(),
            baseline_bytes = state.old_contents.len(),
            working_bytes = state.new_contents.len(),
            annotations = state.annotations.as_ref().map(Vec::len),
            "active file updated",
        );
    });

    if let Some(file) = &file {
        ws.session
            .activate_file(file)
            .await
            .with_context(|| format!("failed to load {}", file.display()))?;
    }

    tracing::info!(root = %ws.root().display(), "watching; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    ws.repository.stop_watching();
    ws.session.destroy();
    Ok(())
}

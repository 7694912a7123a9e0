pub mod show;
pub mod status;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use difftrack_core::{config, LogNotifier, Repository, RepositoryKind, SessionConfig};
use difftrack_local::{
    logging::{init_json_tracing, init_tracing},
    ConflictMarkerProvider, LocalResolver, SnapshotRepository,
    StaticRegistry, SNAPSHOT_KIND,
};
use difftrack_sync::{Collaborators, DiffSession};

/// Where the working tree and its baseline live.
#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    /// Working tree root.
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Baseline snapshot directory. Defaults to `<root>/.baseline`.
    #[arg(long, global = true)]
    pub baseline: Option<PathBuf>,

    /// Log one JSON object per event on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// An open session over the workspace.
pub struct Workspace {
    pub repository: Arc<SnapshotRepository>,
    pub session: DiffSession,
}

impl Workspace {
    /// Load config, set up logging and open a session. Must be called from
    /// inside a tokio runtime.
    pub fn open(args: &WorkspaceArgs) -> Result<Self> {
        let config = load_config()?;
        if args.log_json {
            init_json_tracing(&config.log_filter);
        } else {
            init_tracing(&config.log_filter);
        }

        let baseline = args
            .baseline
            .clone()
            .unwrap_or_else(|| args.root.join(".baseline"));
        let repository = SnapshotRepository::open(&args.root, &baseline).with_context(|| {
            format!(
                "failed to open {} against baseline {}",
                args.root.display(),
                baseline.display()
            )
        })?;
        let registry = StaticRegistry::new(vec![repository.clone() as Arc<dyn Repository>]);

        let config = SessionConfig {
            supported_kind: RepositoryKind::from(SNAPSHOT_KIND),
            ..config
        };
        let session = DiffSession::new(
            Collaborators {
                registry,
                storage: LocalResolver::new(),
                providers: vec![Arc::new(ConflictMarkerProvider)],
                notifier: Arc::new(LogNotifier),
            },
            &config,
        );
        Ok(Self {
            repository,
            session,
        })
    }

    pub fn root(&self) -> &Path {
        self.repository.root()
    }

    /// `path` relative to the tree root when it is inside it.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(self.root())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn load_config() -> Result<SessionConfig> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    config::load_at(&home).with_context(|| {
        format!(
            "failed to load {}",
            config::config_path_at(&home).display()
        )
    })
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Absolute, canonical form of a user-supplied file path. The file itself
/// may be missing (deleted since the baseline); its directory may not.
pub fn resolve_file(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("could not determine current directory")?
            .join(path)
    };
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return Ok(canonical);
    }
    let parent = absolute
        .parent()
        .with_context(|| format!("{} has no parent directory", absolute.display()))?;
    let name = absolute
        .file_name()
        .with_context(|| format!("{} has no file name", absolute.display()))?;
    let parent = std::fs::canonicalize(parent)
        .with_context(|| format!("directory not found: {}", parent.display()))?;
    Ok(parent.join(name))
}

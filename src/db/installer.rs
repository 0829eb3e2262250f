//! Installs (or refreshes) the tenant provisioning procedure in the operations database.
//!
//! One `Installer` is built at startup and passed to whoever needs it. The install body runs at
//! most once successfully per instance: concurrent callers wait for the first one, and a failed
//! attempt leaves the next caller free to try again.

use crate::error::InstallError;
use async_trait::async_trait;
use sqlx::PgPool;
use std::path::PathBuf;
use tokio::sync::OnceCell;

/// Relative to the working directory, then the container image location.
pub const DEFAULT_SCRIPT_CANDIDATES: [&str; 3] = [
    "db/provision_tenant.sql",
    "../db/provision_tenant.sql",
    "/app/db/provision_tenant.sql",
];

/// Runs a multi-statement script.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run_script(&self, script: &str) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl ScriptRunner for PgPool {
    async fn run_script(&self, script: &str) -> Result<(), sqlx::Error> {
        let mut conn = self.acquire().await?;
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(script)).await?;
        Ok(())
    }
}

pub struct Installer {
    candidates: Vec<PathBuf>,
    installed: OnceCell<()>,
}

impl Installer {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Installer {
            candidates,
            installed: OnceCell::new(),
        }
    }

    /// Default candidate list, with `override_path` (e.g. `PROVISION_SCRIPT_PATH`) tried first.
    pub fn with_default_candidates(override_path: Option<PathBuf>) -> Self {
        let candidates = override_path
            .into_iter()
            .chain(DEFAULT_SCRIPT_CANDIDATES.iter().map(PathBuf::from))
            .collect();
        Installer::new(candidates)
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn is_installed(&self) -> bool {
        self.installed.initialized()
    }

    /// Load the script and execute it unconditionally, so a new deployment always replaces the
    /// procedure definition. Later calls return immediately once this has succeeded.
    pub async fn ensure_installed<R>(&self, runner: &R) -> Result<(), InstallError>
    where
        R: ScriptRunner + ?Sized,
    {
        self.installed
            .get_or_try_init(|| async {
                let (path, script) = self.load_script().await?;
                runner.run_script(&script).await.map_err(InstallError::Execute)?;
                tracing::info!(path = %path.display(), "tenant provisioning procedure installed");
                Ok::<(), InstallError>(())
            })
            .await
            .map(|_| ())
    }

    /// First candidate that reads successfully. An empty file is an error, not a fallthrough.
    async fn load_script(&self) -> Result<(PathBuf, String), InstallError> {
        let mut last_err: Option<std::io::Error> = None;
        for candidate in &self.candidates {
            match tokio::fs::read_to_string(candidate).await {
                Ok(script) if script.trim().is_empty() => {
                    return Err(InstallError::Empty(candidate.display().to_string()));
                }
                Ok(script) => return Ok((candidate.clone(), script)),
                Err(e) => {
                    tracing::debug!(path = %candidate.display(), error = %e, "provisioning script candidate unavailable");
                    last_err = Some(e);
                }
            }
        }
        Err(InstallError::Load {
            tried: self
                .candidates
                .iter()
                .map(|p: &PathBuf| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no candidate paths configured")
            }),
        })
    }
}

//! Local-process sandbox: one directory per agent, commands via `sh -lc`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use switchyard_core::error::SandboxError;
use switchyard_core::sandbox::{ExecOutput, FileEntry, RuntimeInfo, Sandbox};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::path::resolve_in_workspace;

/// Workspaces live at `{base_dir}/{agent_id}/workspace`.
pub struct LocalSandbox {
    base_dir: PathBuf,
}

impl LocalSandbox {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The workspace root for an agent. The id must be a single path segment.
    pub fn workspace_dir(&self, agent_id: &str) -> Result<PathBuf, SandboxError> {
        let id = agent_id.trim();
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0'])
        {
            return Err(SandboxError::InvalidPath(format!("agent id '{agent_id}'")));
        }
        Ok(self.base_dir.join(id).join("workspace"))
    }

    async fn ensure_workspace(&self, agent_id: &str) -> Result<PathBuf, SandboxError> {
        let workspace = self.workspace_dir(agent_id)?;
        tokio::fs::create_dir_all(&workspace).await?;
        Ok(workspace)
    }

    async fn resolve(&self, agent_id: &str, path: &str) -> Result<(PathBuf, PathBuf), SandboxError> {
        let workspace = self.ensure_workspace(agent_id).await?;
        let resolved = resolve_in_workspace(&workspace, path)?;
        Ok((workspace, resolved))
    }
}

fn not_found(path: &str, e: std::io::Error) -> SandboxError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SandboxError::NotFound(path.into())
    } else {
        SandboxError::Io(e)
    }
}

fn relative_display(workspace: &Path, path: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn ensure_running(&self, agent_id: &str) -> Result<RuntimeInfo, SandboxError> {
        let workspace = self.ensure_workspace(agent_id).await?;
        Ok(RuntimeInfo {
            mode: "local".into(),
            workspace,
        })
    }

    async fn exec(
        &self,
        agent_id: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, SandboxError> {
        let workspace = self.ensure_workspace(agent_id).await?;
        debug!(agent_id = %agent_id, command = %command, "Executing workspace command");

        let child = Command::new("sh")
            .args(["-lc", command])
            .current_dir(&workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Spawn(e.to_string()))?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(agent_id = %agent_id, command = %command, "Workspace command timed out");
                return Err(SandboxError::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let exit_code = output.status.code();
        if exit_code != Some(0) {
            debug!(agent_id = %agent_id, exit_code = ?exit_code, "Workspace command failed");
        }

        Ok(ExecOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn list_files(&self, agent_id: &str, path: &str) -> Result<Vec<FileEntry>, SandboxError> {
        let (workspace, dir) = self.resolve(agent_id, path).await?;
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(|e| not_found(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(FileEntry {
                path: relative_display(&workspace, &entry.path()),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read_file(&self, agent_id: &str, path: &str) -> Result<String, SandboxError> {
        let (_, file) = self.resolve(agent_id, path).await?;
        tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| not_found(path, e))
    }

    async fn write_file(
        &self,
        agent_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SandboxError> {
        let (workspace, file) = self.resolve(agent_id, path).await?;
        if file == workspace {
            return Err(SandboxError::InvalidPath(path.into()));
        }
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, content).await?;
        debug!(agent_id = %agent_id, path = %path, bytes = content.len(), "Wrote workspace file");
        Ok(())
    }

    async fn delete_path(&self, agent_id: &str, path: &str) -> Result<(), SandboxError> {
        let (workspace, target) = self.resolve(agent_id, path).await?;
        if target == workspace {
            return Err(SandboxError::InvalidPath(
                "refusing to delete the workspace root".into(),
            ));
        }

        let metadata = tokio::fs::symlink_metadata(&target)
            .await
            .map_err(|e| not_found(path, e))?;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        debug!(agent_id = %agent_id, path = %path, "Deleted workspace path");
        Ok(())
    }
}

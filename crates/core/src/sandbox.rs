//! Sandbox trait: the per-agent execution environment used by tools.
//!
//! Every path argument is relative to the agent's workspace root; anything
//! that resolves outside of it is rejected with
//! [`SandboxError::PathEscape`](crate::error::SandboxError::PathEscape).

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SandboxError;

/// Where and how an agent's workspace is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    /// Execution mode, e.g. "local"
    pub mode: String,
    pub workspace: PathBuf,
}

/// Result of a command run inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A directory entry reported by [`Sandbox::list_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the workspace root
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Make sure the workspace exists and is ready for commands.
    async fn ensure_running(&self, agent_id: &str) -> Result<RuntimeInfo, SandboxError>;

    async fn exec(
        &self,
        agent_id: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, SandboxError>;

    async fn list_files(&self, agent_id: &str, path: &str) -> Result<Vec<FileEntry>, SandboxError>;

    async fn read_file(&self, agent_id: &str, path: &str) -> Result<String, SandboxError>;

    async fn write_file(&self, agent_id: &str, path: &str, content: &str)
    -> Result<(), SandboxError>;

    /// Remove a file or directory tree.
    async fn delete_path(&self, agent_id: &str, path: &str) -> Result<(), SandboxError>;
}

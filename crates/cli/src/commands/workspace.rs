//! `switchyard workspace`: inspect an agent's sandbox from the shell.

use std::time::Duration;

use switchyard_core::sandbox::Sandbox;
use switchyard_sandbox::LocalSandbox;

use super::{CmdResult, load_config, open_store, resolve_agent};

async fn sandbox_for(agent: &str) -> Result<(LocalSandbox, String), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agent = resolve_agent(store.as_ref(), agent).await?;
    let sandbox = LocalSandbox::new(&config.runtime.base_dir);
    sandbox.ensure_running(&agent.id).await?;
    Ok((sandbox, agent.id))
}

pub async fn ls(agent: &str, path: &str) -> CmdResult {
    let (sandbox, agent_id) = sandbox_for(agent).await?;
    let entries = sandbox.list_files(&agent_id, path).await?;
    if entries.is_empty() {
        println!("(empty)");
    }
    for entry in entries {
        if entry.is_dir {
            println!("  {}/", entry.path);
        } else {
            println!("  {:<48} {:>10}", entry.path, entry.size);
        }
    }
    Ok(())
}

pub async fn cat(agent: &str, path: &str) -> CmdResult {
    let (sandbox, agent_id) = sandbox_for(agent).await?;
    print!("{}", sandbox.read_file(&agent_id, path).await?);
    Ok(())
}

pub async fn exec(agent: &str, command: &str, timeout_secs: Option<u64>) -> CmdResult {
    let config = load_config()?;
    let timeout = Duration::from_secs(timeout_secs.unwrap_or(config.runtime.default_exec_timeout_secs));
    let (sandbox, agent_id) = sandbox_for(agent).await?;

    let output = sandbox.exec(&agent_id, command, timeout).await?;
    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    if output.success() {
        Ok(())
    } else {
        let code = output
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        Err(format!("Command exited with {code}").into())
    }
}

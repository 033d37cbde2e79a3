//! `switchyard agent`: create, list and delete agents.

use switchyard_core::agent::AgentStatus;
use switchyard_core::store::Store;

use super::{CmdResult, load_config, open_store, resolve_agent};

pub async fn create(name: &str, persona: &str) -> CmdResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agent = store.create_agent(name.trim(), persona.trim()).await?;
    println!("Created agent '{}' ({})", agent.name, agent.id);
    Ok(())
}

pub async fn list(all: bool) -> CmdResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agents: Vec<_> = store
        .list_agents()
        .await?
        .into_iter()
        .filter(|a| all || !a.is_deleted())
        .collect();

    if agents.is_empty() {
        println!("No agents yet. Create one with:");
        println!("   switchyard agent create <name> --persona \"...\"");
        return Ok(());
    }

    println!("Agents ({}):", agents.len());
    println!("{:-<72}", "");
    for agent in &agents {
        println!(
            "  {:<36}  {:<20} {}",
            agent.id,
            agent.name,
            agent.status.as_str()
        );
    }
    Ok(())
}

/// Soft delete: the log stays, the agent stops taking turns.
pub async fn delete(key: &str) -> CmdResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agent = resolve_agent(store.as_ref(), key).await?;
    store.set_agent_status(&agent.id, AgentStatus::Deleted).await?;
    println!("Deleted agent '{}' ({})", agent.name, agent.id);
    Ok(())
}

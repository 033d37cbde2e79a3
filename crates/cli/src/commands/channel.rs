//! `switchyard channel`: bind agents to chat channels.

use serde_json::json;
use switchyard_core::store::Store;

use super::{CmdResult, load_config, open_store, resolve_agent};

pub async fn telegram(agent: &str, token: &str, allow: &[String], disable: bool) -> CmdResult {
    let config = load_config()?;
    let store = open_store(&config).await?;
    let agent = resolve_agent(store.as_ref(), agent).await?;

    let token = token.trim();
    if token.is_empty() && !disable {
        return Err("A bot token is required to enable Telegram".into());
    }

    let binding = json!({
        "bot_token": token,
        "allowed_chat_ids": allow,
    });
    store
        .upsert_agent_channel(&agent.id, "telegram", !disable, binding)
        .await?;

    if disable {
        println!("Telegram disabled for '{}'", agent.name);
    } else {
        println!("Telegram bound to '{}'", agent.name);
        if allow.is_empty() {
            println!("   Accepting messages from every chat");
        } else {
            println!("   Allowed chats: {}", allow.join(", "));
        }
        if !config.telegram.enabled {
            println!("   Note: set [telegram] enabled = true (or SWITCHYARD_TELEGRAM_ENABLED=1)");
        }
    }
    println!("   Restart the daemon to apply.");
    Ok(())
}

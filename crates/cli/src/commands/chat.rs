//! `switchyard chat`: talk to one agent over the console channel.

use std::io::Write;
use std::time::Duration;

use switchyard_channels::local::CONSOLE_CHANNEL;
use switchyard_channels::LocalSender;
use switchyard_core::message::InboundMessage;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CmdResult, Pipeline, load_config, resolve_agent};

/// Upper bound on one reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(600);

const CONSOLE_USER: &str = "console";

pub async fn run(agent: &str, message: Option<String>) -> CmdResult {
    let config = load_config()?;
    let pipeline = Pipeline::build(&config).await?;
    let agent = resolve_agent(pipeline.store.as_ref(), agent).await?;

    pipeline
        .registry
        .register_sender(CONSOLE_CHANNEL, std::sync::Arc::new(LocalSender))
        .await;
    pipeline.start().await;

    let ask = |text: String| {
        let bus = pipeline.bus.clone();
        let agent_id = agent.id.clone();
        async move {
            let inbound =
                InboundMessage::new(agent_id, CONSOLE_CHANNEL, CONSOLE_USER, CONSOLE_USER, text);
            bus.request(inbound, Some(REPLY_TIMEOUT)).await
        }
    };

    if let Some(text) = message {
        let outcome = ask(text).await;
        pipeline.stop().await;
        println!("{}", outcome?);
        return Ok(());
    }

    println!();
    println!("  Chatting with {} ({})", agent.name, agent.id);
    println!("  Model: {}", config.model.model);
    println!("  Type 'exit' or press Ctrl-D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match ask(line.to_string()).await {
            Ok(reply) => {
                println!();
                for text in reply.lines() {
                    println!("  {} > {text}", agent.name);
                }
                println!();
            }
            Err(e) => eprintln!("  [Error] {e}"),
        }
    }

    pipeline.stop().await;
    println!();
    Ok(())
}

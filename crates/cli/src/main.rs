//! Switchyard CLI, the main entry point.
//!
//! Commands:
//! - `daemon`: run workers, channels and the scheduler
//! - `chat`: talk to one agent from the terminal
//! - `agent`: create, list and delete agents
//! - `channel`: bind an agent to a chat channel
//! - `job`: manage scheduled jobs
//! - `workspace`: inspect an agent's sandbox
//! - `config`: show or initialize configuration

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard: persistent AI agents behind chat channels",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the full daemon (workers + channels + scheduler)
    Daemon,

    /// Chat with an agent
    Chat {
        /// Agent id or name
        #[arg(short, long)]
        agent: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Manage agents
    #[command(subcommand)]
    Agent(AgentCommand),

    /// Bind agents to channels
    #[command(subcommand)]
    Channel(ChannelCommand),

    /// Manage scheduled jobs
    #[command(subcommand)]
    Job(JobCommand),

    /// Inspect an agent workspace
    #[command(subcommand)]
    Workspace(WorkspaceCommand),

    /// Show or initialize configuration
    Config {
        /// Write the default config file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long, requires = "init")]
        force: bool,
    },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Create an agent
    Create {
        name: String,

        #[arg(short, long, default_value = "")]
        persona: String,
    },
    /// List agents
    List {
        /// Include deleted agents
        #[arg(long)]
        all: bool,
    },
    /// Delete an agent
    Delete {
        /// Agent id or name
        agent: String,
    },
}

#[derive(Subcommand)]
enum ChannelCommand {
    /// Configure the Telegram bot of an agent
    Telegram {
        #[arg(short, long)]
        agent: String,

        /// Bot token from @BotFather
        #[arg(short, long, env = "SWITCHYARD_TELEGRAM_TOKEN", default_value = "")]
        token: String,

        /// Chat ids allowed to talk to the bot (repeatable); empty allows all
        #[arg(long = "allow", allow_hyphen_values = true)]
        allow: Vec<String>,

        /// Disable the binding
        #[arg(long)]
        disable: bool,
    },
}

#[derive(Subcommand)]
enum JobCommand {
    /// Schedule an instruction
    Add {
        #[arg(short, long)]
        agent: String,

        /// Instruction delivered to the agent as a system turn
        instruction: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// One-shot time: "in 2 hours", "tomorrow 9am", ISO timestamp, unix seconds
        #[arg(long, conflicts_with = "cron", required_unless_present = "cron")]
        at: Option<String>,

        /// Recurring five-field cron expression, evaluated in UTC
        #[arg(long)]
        cron: Option<String>,
    },
    /// List jobs of an agent
    List {
        #[arg(short, long)]
        agent: String,
    },
    /// Delete a job
    Delete {
        #[arg(short, long)]
        agent: String,

        job_id: String,
    },
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    /// List files
    Ls {
        #[arg(short, long)]
        agent: String,

        #[arg(default_value = ".")]
        path: String,
    },
    /// Print a file
    Cat {
        #[arg(short, long)]
        agent: String,

        path: String,
    },
    /// Run a shell command inside the workspace
    Exec {
        #[arg(short, long)]
        agent: String,

        command: String,

        /// Seconds before the command is killed
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Daemon => commands::daemon::run().await?,
        Commands::Chat { agent, message } => commands::chat::run(&agent, message).await?,
        Commands::Agent(cmd) => match cmd {
            AgentCommand::Create { name, persona } => {
                commands::agent::create(&name, &persona).await?
            }
            AgentCommand::List { all } => commands::agent::list(all).await?,
            AgentCommand::Delete { agent } => commands::agent::delete(&agent).await?,
        },
        Commands::Channel(ChannelCommand::Telegram {
            agent,
            token,
            allow,
            disable,
        }) => commands::channel::telegram(&agent, &token, &allow, disable).await?,
        Commands::Job(cmd) => match cmd {
            JobCommand::Add {
                agent,
                instruction,
                description,
                at,
                cron,
            } => {
                commands::job::add(commands::job::AddJob {
                    agent: &agent,
                    instruction: &instruction,
                    description: &description,
                    at: at.as_deref(),
                    cron: cron.as_deref(),
                })
                .await?
            }
            JobCommand::List { agent } => commands::job::list(&agent).await?,
            JobCommand::Delete { agent, job_id } => commands::job::delete(&agent, &job_id).await?,
        },
        Commands::Workspace(cmd) => match cmd {
            WorkspaceCommand::Ls { agent, path } => commands::workspace::ls(&agent, &path).await?,
            WorkspaceCommand::Cat { agent, path } => commands::workspace::cat(&agent, &path).await?,
            WorkspaceCommand::Exec {
                agent,
                command,
                timeout,
            } => commands::workspace::exec(&agent, &command, timeout).await?,
        },
        Commands::Config { init, force } => {
            if init {
                commands::config::init(force).await?
            } else {
                commands::config::show().await?
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn job_add_needs_exactly_one_schedule() {
        assert!(Cli::try_parse_from(["switchyard", "job", "add", "-a", "ada", "stretch"]).is_err());
        assert!(
            Cli::try_parse_from([
                "switchyard", "job", "add", "-a", "ada", "stretch", "--at", "in 1 hour", "--cron",
                "0 9 * * *"
            ])
            .is_err()
        );

        let cli = Cli::try_parse_from([
            "switchyard", "job", "add", "-a", "ada", "stretch", "--cron", "0 9 * * 1-5",
        ])
        .unwrap();
        match cli.command {
            Commands::Job(JobCommand::Add { cron, at, .. }) => {
                assert_eq!(cron.as_deref(), Some("0 9 * * 1-5"));
                assert!(at.is_none());
            }
            _ => panic!("expected job add"),
        }
    }

    #[test]
    fn global_logging_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["switchyard", "daemon", "--verbose", "--log-json"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
    }

    #[test]
    fn telegram_allow_is_repeatable() {
        let cli = Cli::try_parse_from([
            "switchyard", "channel", "telegram", "-a", "ada", "-t", "123:abc", "--allow", "1",
            "--allow", "-100",
        ])
        .unwrap();
        match cli.command {
            Commands::Channel(ChannelCommand::Telegram { allow, token, .. }) => {
                assert_eq!(allow, ["1", "-100"]);
                assert_eq!(token, "123:abc");
            }
            _ => panic!("expected channel telegram"),
        }
    }
}

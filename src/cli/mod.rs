//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod chat;
pub mod common;
pub mod config;
pub mod conversations;
pub mod watch;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use chatdeck::config::Settings;
use chatdeck::tasks::CompletionParams;

use self::chat::ChatArgs;
use self::common::Deck;
use self::conversations::LabelArgs;

#[derive(Parser)]
#[command(name = "chatdeck")]
#[command(version)]
#[command(about = "Local chat dashboard core backed by a llama.cpp server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message and print the reply
    Chat {
        /// Message text
        message: String,
        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
        /// Agent profile name or alias (`@alias` in the message also works)
        #[arg(short, long)]
        agent: Option<String>,
        /// Model override
        #[arg(long)]
        model: Option<String>,
        /// Sampling temperature override
        #[arg(long)]
        temperature: Option<f32>,
        /// Context size override (sent as max_tokens)
        #[arg(long)]
        context_size: Option<u32>,
    },
    /// Refresh and print a conversation summary
    Summarize {
        /// Conversation id
        conversation: String,
    },
    /// List conversations
    List,
    /// Rate an entry of a conversation
    Label {
        /// Conversation id
        conversation: String,
        /// Id of the entry being rated
        target: String,
        /// Reward from -2 to 2
        #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i8).range(-2..=2))]
        reward: i8,
        /// Entry type recorded with the label (defaults to the target's type)
        #[arg(long)]
        target_type: Option<String>,
    },
    /// Keep the worker running and refresh missing summaries when idle
    Watch,
    /// Show the effective settings
    Config {
        /// Only print the settings file path
        #[arg(long)]
        path: bool,
    },
    /// Show version information
    Version,
}

pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let command = match cli.command {
        None => {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
        Some(Commands::Version) => {
            cmd_version();
            return Ok(());
        }
        Some(command) => command,
    };

    // Logging follows the settings file; `RUST_LOG` still wins.
    let settings = Settings::load().context("Failed to load settings")?;
    chatdeck::utils::logging::init_logging(&settings.logging);

    match command {
        Commands::Chat {
            message,
            conversation,
            agent,
            model,
            temperature,
            context_size,
        } => {
            let args = ChatArgs {
                message,
                conversation,
                params: CompletionParams {
                    agent,
                    model,
                    temperature,
                    context_size,
                },
            };
            chat::cmd_chat(Deck::open(settings)?, args).await?;
        }
        Commands::Summarize { conversation } => {
            conversations::cmd_summarize(Deck::open(settings)?, conversation).await?;
        }
        Commands::List => {
            conversations::cmd_list(Deck::open(settings)?).await?;
        }
        Commands::Label {
            conversation,
            target,
            reward,
            target_type,
        } => {
            let args = LabelArgs {
                conversation,
                target,
                target_type,
                reward,
            };
            conversations::cmd_label(Deck::open(settings)?, args).await?;
        }
        Commands::Watch => {
            watch::cmd_watch(Deck::open(settings)?).await?;
        }
        Commands::Config { path } => {
            config::cmd_config(&settings, path)?;
        }
        Commands::Version => cmd_version(),
    }

    Ok(())
}

fn cmd_version() {
    println!("chatdeck {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Local chat dashboard core: task queue, worker and idle monitor");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_overrides() {
        let cli = Cli::try_parse_from([
            "chatdeck",
            "chat",
            "hello",
            "--agent",
            "Debugger",
            "--temperature",
            "0.7",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Chat {
                message,
                agent,
                temperature,
                conversation,
                ..
            }) => {
                assert_eq!(message, "hello");
                assert_eq!(agent.as_deref(), Some("Debugger"));
                assert_eq!(temperature, Some(0.7));
                assert!(conversation.is_none());
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_parse_label_negative_reward() {
        let cli = Cli::try_parse_from(["chatdeck", "label", "c1", "e1", "--reward", "-2"]).unwrap();
        match cli.command {
            Some(Commands::Label {
                conversation,
                target,
                reward,
                target_type,
            }) => {
                assert_eq!(conversation, "c1");
                assert_eq!(target, "e1");
                assert_eq!(reward, -2);
                assert!(target_type.is_none());
            }
            _ => panic!("expected label command"),
        }
    }

    #[test]
    fn test_parse_label_rejects_out_of_range_reward() {
        assert!(Cli::try_parse_from(["chatdeck", "label", "c1", "e1", "--reward", "3"]).is_err());
    }
}

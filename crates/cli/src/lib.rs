pub mod commands;
pub mod logging;

use assistant_core::config::{AppConfig, LoadOptions};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::ask::AskRequest;

#[derive(Debug, Parser)]
#[command(
    name = "assistant",
    about = "Virtual assistant operator CLI",
    long_about = "Query the configured knowledge base, run the onboarding dialog, and inspect configuration.",
    after_help = "Examples:\n  assistant ask \"What is the return policy?\"\n  assistant onboard\n  assistant config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Ask the knowledge base one question and print the reply as JSON")]
    Ask {
        question: String,
        #[arg(long, help = "User name attached to the turn")]
        user: Option<String>,
        #[arg(long, help = "Conversation id (a random one is generated when omitted)")]
        conversation: Option<String>,
        #[arg(long = "log-pii", help = "Include the question text and user name in telemetry")]
        log_personal_information: bool,
    },
    #[command(about = "Run the onboarding dialog and report its result")]
    Onboard,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(logging_config) = AppConfig::load_logging(LoadOptions::default()) {
        logging::init_logging(&logging_config);
    }

    let result = match cli.command {
        Command::Ask { question, user, conversation, log_personal_information } => {
            commands::ask::run(AskRequest {
                question,
                user_name: user,
                conversation_id: conversation,
                log_personal_information,
            })
        }
        Command::Onboard => commands::onboard::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

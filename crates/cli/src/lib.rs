pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pizzabot_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "pizzabot",
    about = "Pizzabot operator CLI",
    long_about = "Inspect configuration, apply migrations, print the menu, or talk to Mario from the terminal.",
    after_help = "Examples:\n  pizzabot config\n  pizzabot migrate\n  pizzabot menu\n  pizzabot chat --session demo"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Show effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Apply pending session-store migrations and return structured status output")]
    Migrate,
    #[command(about = "Print the menu the way the assistant renders it")]
    Menu,
    #[command(about = "Hold a conversation on stdin/stdout using an in-memory session")]
    Chat {
        #[arg(long, default_value = "cli", help = "Session key for the conversation")]
        session: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Config => commands::config::run(&options),
        Command::Migrate => commands::migrate::run(&options),
        Command::Menu => commands::menu::run(&options),
        Command::Chat { session } => commands::chat::run(&options, &session),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}

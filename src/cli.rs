//! Command-line interface parsing and dispatch.

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::api::models::{
    display_name, fetch_models, format_context_length, provider_label, supports_vision,
};
use crate::core::config::Config;
use crate::ui::repl::run_chat;

#[derive(Parser)]
#[command(name = "tabchat")]
#[command(about = "A terminal chat client with tabbed AI sessions")]
#[command(
    long_about = "Tabchat runs several independent AI conversations side by side. A fixed\n\
number of sessions stays visible as tabs; the rest collect in an overflow\n\
list. Responses stream in live and can be cancelled mid-flight, and images\n\
or PDFs can be attached to a message.\n\n\
Commands inside the chat:\n\
  /help             Show the full command list\n\
  /new, /close      Open and close sessions\n\
  /switch, /move    Rearrange visible and overflow tabs\n\
  /attach, /stop    Attach files, cancel a streaming response"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model for newly created sessions
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Backend base URL
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Enable transcript logging to the given file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// List the backend's model catalog and exit
    Models,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load()?;
    if let Some(base_url) = args.base_url {
        config.base_url = Some(base_url);
    }
    if let Some(model) = args.model {
        config.default_model = Some(model);
    }

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(config, args.log).await,
        Commands::Models => list_models(&config).await,
    }
}

async fn list_models(config: &Config) -> Result<(), Box<dyn Error>> {
    let client = reqwest::Client::new();
    match fetch_models(&client, config.base_url()).await {
        Ok(models) => {
            for model in &models {
                let mut line = format!(
                    "{} - {} ({})",
                    provider_label(&model.id),
                    display_name(model),
                    model.id
                );
                if let Some(context) = model.context_length {
                    line.push_str(&format!(" {}", format_context_length(context)));
                }
                if supports_vision(model) {
                    line.push_str(" [vision]");
                }
                println!("{line}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "Could not load models from {}: {e}",
                config.base_url()
            );
            eprintln!("Sessions will fall back to {}.", config.default_model());
            Ok(())
        }
    }
}

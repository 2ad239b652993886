mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use runtime::{Message, Session};
use tracing_subscriber::EnvFilter;

use config::{Config, Overrides};
use error::{Error, Result};

const CONFIG_FILE: &str = "switchboard.toml";

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Ask questions of a language model backed by MCP tool servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file [default: switchboard.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider kind (claude, ollama, openai), overriding the config file
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Model identifier, overriding the config file
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive question loop
    Chat,
    /// List the tools exposed by the configured servers
    Tools,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let overrides = Overrides {
        provider: cli.provider,
        model: cli.model,
    };
    let session_config = config.into_session_config(overrides, |name| std::env::var(name).ok())?;

    tracing::debug!(provider = %session_config.provider, servers = session_config.servers.len(), "connecting");
    let session = Session::connect(session_config).await?;
    report_failures(&session);

    let result = match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&session).await,
        Some(Commands::Tools) => cmd_tools(&session).await,
    };

    for failure in session.close().await {
        tracing::warn!(server = %failure.server, error = %failure.error, "error closing server");
    }
    result
}

/// An explicit path must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) if !path.exists() => Err(Error::ConfigNotFound {
            path: path.to_path_buf(),
        }),
        Some(path) => Ok(Config::load(path)?),
        None if Path::new(CONFIG_FILE).exists() => Ok(Config::load(CONFIG_FILE)?),
        None => Ok(Config::default()),
    }
}

fn report_failures(session: &Session) {
    for failure in session.connect_failures() {
        tracing::warn!(server = %failure.server, error = %failure.error, "server unavailable");
    }
}

async fn cmd_chat(session: &Session) -> Result<()> {
    println!("switchboard v{}", env!("CARGO_PKG_VERSION"));
    println!("Provider: {}", session.provider());

    let servers = session.server_names().await;
    if servers.is_empty() {
        println!("Servers: none");
    } else {
        println!("Servers: {}", servers.join(", "));
    }
    let catalog = session.catalog().await?;
    let tools: Vec<_> = catalog.descriptors().map(|d| d.spec.name.as_str()).collect();
    println!("Tools: {}", if tools.is_empty() { "none".to_string() } else { tools.join(", ") });
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut history: Vec<Message> = Vec::new();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        match session.ask_with_history(history.clone(), input).await {
            Ok(answer) => {
                println!("\n{}\n", answer.text);
                history = answer.transcript;
            }
            Err(e) => {
                eprintln!("Error: {e}\n");
            }
        }
    }

    println!("\nSession ended.");
    Ok(())
}

async fn cmd_tools(session: &Session) -> Result<()> {
    let catalog = session.catalog().await?;

    if catalog.is_empty() {
        println!("No tools available.");
    }
    for descriptor in catalog.descriptors() {
        let spec = &descriptor.spec;
        if spec.description.is_empty() {
            println!("{:<24} [{}]", spec.name, descriptor.server);
        } else {
            println!("{:<24} [{}] {}", spec.name, descriptor.server, spec.description);
        }
    }

    for shadowed in catalog.shadowed() {
        println!(
            "\nnote: `{}` from {} is hidden by {}",
            shadowed.tool, shadowed.hidden, shadowed.winner
        );
    }
    for failure in catalog.failed() {
        tracing::warn!(server = %failure.server, error = %failure.error, "could not list tools");
    }

    Ok(())
}

use clap::{Parser, Subcommand};
use dictate_client::Client;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dictate", about = "dictate daemon control client")]
struct Cli {
    /// Unix socket path; defaults to the same path the daemon loads from config.
    #[arg(long, env = "DICTATE_SOCKET_PATH")]
    socket: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the daemon is reachable.
    Ping,
    /// Begin explicit-mode capture.
    Start,
    /// Stop explicit-mode capture and print the transcript.
    Stop,
    /// Smart-capture (VAD-driven) and print the transcript, refining with the LLM unless disabled.
    Transcribe {
        #[arg(long)]
        no_llm: bool,
    },
    /// Print whether the daemon is running and recording.
    Status,
    /// Ask the daemon to shut down.
    Shutdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let socket_path = cli
        .socket
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| dictate_core::config::Config::load().map(|c| c.paths.socket_path).unwrap_or_else(|_| "/tmp/v2m.sock".into()));

    let client = Client::new(socket_path);

    let result = match cli.command {
        Command::Ping => client.ping().await,
        Command::Start => client.start_capture().await,
        Command::Stop => client.stop_capture().await,
        Command::Transcribe { no_llm } => client.transcribe(!no_llm).await,
        Command::Status => client.get_status().await,
        Command::Shutdown => client.shutdown().await,
    };

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

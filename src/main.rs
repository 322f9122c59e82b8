use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use nic::{chat, config::Config, constants, web_server};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the NIC web server.
    Start {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "templates", help = "Directory holding index.html.")]
        templates_dir: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
        #[arg(long, help = "Leave error source chains out of failure responses.")]
        hide_error_details: bool,
    },
    /// Chat with a running NIC server from the terminal.
    Chat {
        #[arg(long, env = "NIC_SERVER", default_value = "http://127.0.0.1:9900", help = "Base URL of the NIC server.")]
        server: String,
        #[arg(long, help = "Wait for the whole reply instead of streaming it.")]
        no_stream: bool,
    },
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for OPENAI_API_KEY and FDC_API_KEY)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,nic=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("NIC starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Start {
            port,
            templates_dir,
            static_dir,
            hide_error_details,
        } => {
            let mut config = Config::from_env();
            config.expose_error_details = !hide_error_details;

            let options = web_server::ServerOptions {
                port,
                templates_dir,
                static_dir,
            };
            web_server::start_web_server(config, options, async {
                tokio::signal::ctrl_c().await.ok();
                info!("Ctrl-C received, initiating shutdown...");
            })
            .await?;
            info!("NIC server stopped.");
        }
        Commands::Chat { server, no_stream } => {
            chat::run_chat(&server, !no_stream).await?;
        }
    }

    Ok(())
}

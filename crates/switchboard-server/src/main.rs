use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch server
    Serve {
        /// Path to the service TOML (capabilities, provider, storage)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the listen port from settings
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the OpenAPI schema for the HTTP API
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            switchboard_server::commands::serve::run(config, port).await?;
        }
        Commands::Schema => {
            println!("{}", switchboard_server::openapi::generate_schema());
        }
    }

    Ok(())
}

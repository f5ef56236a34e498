// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use edge_manager::config::Config;
use edge_manager::{init_tracing, run, version};
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Parser)]
#[command(name = "edge-manager")]
#[command(about = "Edge fleet control plane", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane
    Server {
        /// YAML config file. Defaults apply when not set.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Output the default config in YAML
    Config {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Print build information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => {
            init_tracing();
            let config = match config {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };
            run(config).await?;
        }
        Commands::Config { file } => {
            let mut writer: Pin<Box<dyn AsyncWrite + Send>> = if let Some(file) = file {
                Box::pin(
                    tokio::fs::OpenOptions::new()
                        .create(true)
                        .truncate(true)
                        .write(true)
                        .open(file)
                        .await?,
                )
            } else {
                Box::pin(tokio::io::stdout())
            };

            writer
                .write_all(Config::default().to_yaml()?.as_bytes())
                .await?;
            writer.flush().await?;
        }
        Commands::Version => println!("{}", version()),
    }

    Ok(())
}

mod embed_page;

use std::path::PathBuf;
use std::process::Command;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the CLI
    Run {
        /// Arguments passed through to esp-ota
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Gzip the update page into a PROGMEM C header
    EmbedPage {
        /// HTML page to embed
        #[arg(long, default_value = embed_page::DEFAULT_INPUT)]
        input: PathBuf,
        /// Header file to write
        #[arg(long, default_value = embed_page::DEFAULT_OUTPUT)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            let status = Command::new("cargo").arg("build").status()?;
            if !status.success() {
                anyhow::bail!("Build failed");
            }
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let status = Command::new("cargo")
                .arg("run")
                .arg("-p")
                .arg("ota-cli")
                .arg("--")
                .args(args)
                .status()?;
            if !status.success() {
                anyhow::bail!("Run failed");
            }
        }
        Commands::EmbedPage { input, output } => {
            let size = embed_page::embed_page(input, output)?;
            println!(
                "Wrote {} ({} compressed bytes)",
                output.display(),
                size
            );
        }
    }

    Ok(())
}

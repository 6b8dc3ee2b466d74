//! Refiner CLI - apply free-text instructions to CSV files
//!
//! # Commands
//!
//! ```bash
//! refiner refine input.csv -i "remove empty rows"        # Deterministic rules only
//! refiner refine input.csv -i "pivot by region" --ai     # Try the local model first
//! refiner probe                                          # Is the runtime installed?
//! refiner rules                                          # Show fallback keywords
//! refiner serve                                          # Start HTTP server (port 3000)
//! ```

use clap::{Parser, Subcommand};
use refiner::transform::{format_delimiter, RULE_KEYWORDS};
use refiner::{
    refine_csv, server, Generator, LogBroadcaster, ProcessOutcome, RefineRequest, Refiner,
    RefinerConfig, Strategy,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "refiner")]
#[command(about = "Refine CSV tables with free-text instructions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an instruction to a CSV file
    Refine {
        /// Input CSV file
        input: PathBuf,

        /// What to do with the data
        #[arg(short, long)]
        instruction: String,

        /// Try the local generation runtime before the fallback rules
        #[arg(long)]
        ai: bool,

        /// Model to use (default: REFINER_MODEL or llama2)
        #[arg(short, long)]
        model: Option<String>,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether the generation runtime is available
    Probe,

    /// Show fallback keywords in match order
    Rules,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result: CmdResult = match RefinerConfig::from_env() {
        Ok(config) => match cli.command {
            Commands::Refine {
                input,
                instruction,
                ai,
                model,
                output,
            } => {
                let request = RefineRequest::new(instruction)
                    .with_generation(ai)
                    .with_model(model);
                tokio::task::spawn_blocking(move || {
                    cmd_refine(&config, &input, &request, output.as_deref())
                })
                .await
                .unwrap_or_else(|e| Err(format!("Worker failed: {}", e).into()))
            }

            Commands::Probe => {
                tokio::task::spawn_blocking(move || cmd_probe(&config))
                    .await
                    .unwrap_or_else(|e| Err(format!("Worker failed: {}", e).into()))
            }

            Commands::Rules => cmd_rules(),

            Commands::Serve { port } => server::start_server(config, port)
                .await
                .map_err(Into::into),
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

type CmdResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn cmd_refine(
    config: &RefinerConfig,
    input: &Path,
    request: &RefineRequest,
    output: Option<&Path>,
) -> CmdResult {
    eprintln!("📄 Processing: {}", input.display());

    let refiner = Refiner::from_config(config, LogBroadcaster::default());
    let report = refine_csv(&refiner, input, request)?;

    eprintln!("   Encoding: {}", report.csv_info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(report.csv_info.delimiter));
    eprintln!("   Rows: {}", report.csv_info.row_count);
    eprintln!("   Columns: {}", report.csv_info.headers.join(", "));

    let refined = match report.outcome {
        ProcessOutcome::EmptyInput => {
            eprintln!("⚠️  Nothing to do: the input has no rows.");
            return Ok(());
        }
        ProcessOutcome::Completed(refined) => refined,
    };

    match &refined.strategy {
        Strategy::Generation { model } => eprintln!("\n🤖 Refined by model '{}'", model),
        Strategy::Fallback { rule } => eprintln!("\n⚙️  Refined by rule '{}'", rule),
    }
    eprintln!(
        "   Result: {} rows x {} columns",
        refined.table.row_count(),
        refined.table.column_count()
    );

    let csv = refined.table.to_csv()?;
    write_output(&csv, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_probe(config: &RefinerConfig) -> CmdResult {
    let refiner = Refiner::from_config(config, LogBroadcaster::default());
    let program = config.runtime.program.display();

    if refiner.generator().is_available() {
        println!("✅ {} is available (default model: {})", program, config.model);
    } else {
        println!("❌ {} is not available; fallback rules will be used", program);
    }
    Ok(())
}

fn cmd_rules() -> CmdResult {
    println!("Fallback rules (first keyword found in the instruction wins):\n");
    for (i, (keyword, rule)) in RULE_KEYWORDS.iter().enumerate() {
        println!("  {}. \"{}\" → {} ({})", i + 1, keyword, rule, rule.description());
    }
    println!("\n  Otherwise the data is returned unchanged.");
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> CmdResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}

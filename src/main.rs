use clap::{Parser, Subcommand};
use miette::{miette, Result};
use std::path::PathBuf;

use ilxlate::cli;

#[derive(Parser)]
#[command(name = "ilxlate")]
#[command(about = "Ahead-of-time rewrite pipeline for lowered managed method bodies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rewrite passes over a program
    Optimize {
        /// Input program (JSON)
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Redirection policy table (JSON)
        #[arg(short, long)]
        policies: Option<PathBuf>,

        /// Translation options (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write a per-function report (JSON)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Process functions one at a time
        #[arg(long)]
        sequential: bool,

        /// Number of worker threads
        #[arg(long)]
        threads: Option<usize>,

        /// Disable allocation hoisting
        #[arg(long)]
        no_hoist: bool,

        /// Disable dead finally elimination
        #[arg(long)]
        no_dead_finally: bool,

        /// Treat every unresolved call target as escaping
        #[arg(long)]
        no_escape_heuristic: bool,
    },

    /// Print def/use, escape and purity facts
    Analyze {
        /// Input program (JSON)
        input: PathBuf,

        /// Only functions whose identifier contains this text
        #[arg(short, long)]
        function: Option<String>,

        /// Redirection policy table (JSON)
        #[arg(short, long)]
        policies: Option<PathBuf>,
    },

    /// Validate and list a redirection policy table
    Policies {
        /// Policy table (JSON)
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            input,
            output,
            policies,
            config,
            report,
            sequential,
            threads,
            no_hoist,
            no_dead_finally,
            no_escape_heuristic,
        } => {
            let args = cli::optimize::OptimizeArgs {
                input,
                output,
                policies,
                config,
                report,
                sequential,
                threads,
                no_hoist,
                no_dead_finally,
                no_escape_heuristic,
            };
            cli::optimize::optimize(&args).map_err(|e| miette!("{:#}", e))
        }
        Commands::Analyze {
            input,
            function,
            policies,
        } => cli::analyze::analyze(&input, function.as_deref(), policies.as_deref())
            .map_err(|e| miette!("{:#}", e)),
        Commands::Policies { input } => {
            cli::policies::policies(&input).map_err(|e| miette!("{:#}", e))
        }
    }
}

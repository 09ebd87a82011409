use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memql", version, about = "In-memory MySQL-flavored SQL engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive SQL prompt
    Repl {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Verbose output
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// Execute a SQL script file
    Run {
        /// Path to the .sql file
        file: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop at the first failing statement
        #[arg(long)]
        halt_on_error: bool,

        /// Write a JSON schema snapshot after the run
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Verbose output
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// Execute SQL given on the command line
    Exec {
        /// One or more statements, separated by ';'
        sql: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

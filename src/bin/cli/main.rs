//! CLI tool for nestpack pipeline runs.

mod commands;
mod exit_codes;
mod output;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use exit_codes::ExitCode;

/// Recursive transformation pipeline for nested package archives
#[derive(Parser)]
#[command(name = "nestpack")]
#[command(author, version, about = "Recursive transformation pipeline for nested package archives", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Suppress the summary output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over an archive, a flat container or a directory (alias: p)
    #[command(alias = "p")]
    Process {
        /// Archive, .zip container or directory to process
        input: PathBuf,

        /// Output directory
        #[arg(short = 'o', long, default_value = ".")]
        output: PathBuf,

        /// Signing command; the file to sign is appended as last argument
        #[arg(short = 's', long, env = "NESTPACK_SIGN_COMMAND")]
        sign: Option<String>,

        /// Mark processed archives as conditioned
        #[arg(long)]
        condition: bool,

        /// Process archives that are not marked as conditioned
        #[arg(short = 'a', long)]
        all: bool,

        /// Show recursion counters for every processed file
        #[arg(short = 'v', long)]
        verbose: bool,

        /// Glob selecting archives by file name
        #[arg(long, default_value = "*.pkg")]
        filter: String,

        /// Extension of nested packages to recurse into
        #[arg(long, default_value = "pkg")]
        extension: String,

        /// Relative path excluded from signing (repeatable)
        #[arg(short = 'x', long = "exclude-sign")]
        exclude_sign: Vec<String>,

        /// File listing relative paths excluded from signing, one per line
        #[arg(long)]
        exclude_sign_file: Option<PathBuf>,
    },

    /// Show entries and metadata of an archive (alias: i)
    #[command(alias = "i")]
    Inspect {
        /// Archive file to inspect
        archive: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

fn main() {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted");
        std::process::exit(exit_codes::USER_INTERRUPT);
    })
    .ok();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Process {
            input,
            output,
            sign,
            condition,
            all,
            verbose,
            filter,
            extension,
            exclude_sign,
            exclude_sign_file,
        } => commands::process(&commands::ProcessConfig {
            input,
            output,
            sign,
            condition,
            all,
            verbose,
            filter,
            extension,
            exclude_sign,
            exclude_sign_file,
            format: cli.format,
            quiet: cli.quiet,
        }),

        Commands::Inspect { archive } => commands::inspect(&archive, cli.format),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}

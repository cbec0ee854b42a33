//! CLI tool for Fast-LZMA2 streams.

mod commands;
mod exit_codes;
mod output;
mod progress;

use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

use exit_codes::ExitCode;
use flzma2::{DecoderConfig, Threads};

/// Fast-LZMA2 stream decompressor
#[derive(Parser)]
#[command(name = "flzma2")]
#[command(author, version, about = "Fast-LZMA2 stream decompressor", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Number of threads (0 = auto, 1 = single-threaded)
    #[arg(long, short = 't', default_value = "0", global = true)]
    threads: usize,

    /// Limit on block buffers in MiB when decoding with several threads
    #[arg(long, value_name = "MIB", global = true)]
    memory_limit: Option<usize>,

    /// Log more (-v debug, -vv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompress files (alias: d)
    #[command(alias = "d")]
    Decompress {
        /// Files to decompress; standard input when empty or "-"
        files: Vec<PathBuf>,

        /// Write to standard output
        #[arg(short = 'c', long)]
        stdout: bool,

        /// Keep input files
        #[arg(short = 'k', long)]
        keep: bool,

        /// Overwrite existing output files
        #[arg(long)]
        force: bool,

        /// Output file (one input only)
        #[arg(short = 'o', long, conflicts_with = "stdout")]
        output: Option<PathBuf>,
    },

    /// Decode and verify without writing output (alias: t)
    #[command(alias = "t")]
    Test {
        /// Files to test; standard input when empty or "-"
        files: Vec<PathBuf>,
    },

    /// Show stream properties and sizes (alias: i)
    #[command(alias = "i")]
    Info {
        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
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

impl Cli {
    fn decoder_config(&self) -> DecoderConfig {
        let threads = match self.threads {
            0 => Threads::Auto,
            1 => Threads::Single,
            n => Threads::count_or_single(n),
        };
        let mut config = DecoderConfig::new().threads(threads);
        if let Some(mib) = self.memory_limit {
            config = config.memory_limit(mib.saturating_mul(1024 * 1024));
        }
        config
    }
}

fn main() {
    // Set up Ctrl+C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted");
        std::process::exit(exit_codes::USER_INTERRUPT);
    })
    .ok();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let decoder = cli.decoder_config();
    let exit_code = match cli.command {
        Commands::Decompress {
            files,
            stdout,
            keep,
            force,
            output,
        } => commands::decompress(&commands::DecompressConfig {
            files: &files,
            to_stdout: stdout,
            keep,
            force,
            output: output.as_deref(),
            format: cli.format,
            quiet: cli.quiet,
            decoder,
        }),

        Commands::Test { files } => commands::test(&files, cli.format, cli.quiet, &decoder),

        Commands::Info { files } => commands::info(&files, cli.format),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-token-replacer")]
#[command(about = "Replace literal tokens inside the string constants of compiled Java classes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Rewrite every .class file under the given directories.
    Replace(ReplaceArgs),
    /// Print the string constants of one class file that a run may rewrite.
    Sites {
        class_file: PathBuf,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ReplaceArgs {
    /// Input directories; missing ones are skipped.
    #[arg(required = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// A single token, applied after the token file.
    #[arg(short = 't', long = "token", value_name = "KEY=VALUE")]
    pub tokens: Vec<String>,

    /// JSON object mapping tokens to replacements.
    #[arg(long = "tokens", value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// Write changed classes under DIR instead of replacing them in place.
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Abort before writing anything if any class fails to process.
    #[arg(long)]
    pub strict: bool,

    #[arg(long)]
    pub dry_run: bool,

    /// Delete existing .class files under the output directory first.
    #[arg(long, requires = "output")]
    pub clean: bool,

    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

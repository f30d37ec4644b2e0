use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "cdg")]
#[command(
    about = "Incremental source-tree tracker: scan what matters, then see what changed since the last scan"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress spinners and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize .codigest/config.toml
    Init(InitArgs),

    /// Discover files and commit them as the new baseline
    Scan(ScanArgs),

    /// Text diff of the current files against the last scan
    Diff(DiffArgs),

    /// Symbol-level changes since the last scan
    Semdiff(SemdiffArgs),

    /// Display the scanned files as a tree
    Tree(TreeArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

/// Flags shared by every command that builds a file set.
#[derive(Debug, Clone, Default, Args)]
pub struct SelectionArgs {
    /// Ignore config-file filters; only built-in defaults and .gitignore apply
    #[arg(long)]
    pub all: bool,

    /// Follow local Python imports from the selected files
    #[arg(long)]
    pub resolve: bool,
}

#[derive(Debug, Parser)]
pub struct ScanArgs {
    /// Files or directories to include (default: the whole project)
    #[arg(value_name = "TARGET")]
    pub targets: Vec<PathBuf>,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Debug, Parser)]
pub struct DiffArgs {
    /// Any path inside the project
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Follow local Python imports from the selected files
    #[arg(long)]
    pub resolve: bool,

    /// Also write the diff to .codigest/changes.diff
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Parser)]
pub struct SemdiffArgs {
    /// Any path inside the project
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Follow local Python imports from the selected files
    #[arg(long)]
    pub resolve: bool,

    /// Also write the report to .codigest/semdiff.txt
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Parser)]
pub struct TreeArgs {
    /// Root directory to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}

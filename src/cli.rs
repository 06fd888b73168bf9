use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use forester_complete::model::config::AppConfig;
use forester_complete::session::NewTreeOverrides;

/// Tree-address completion for forester projects.
#[derive(Debug, Parser)]
#[command(name = "forester-complete", version, about)]
pub struct Cli {
    /// Project root; defaults to the current directory.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Path or name of the forester executable.
    #[arg(long, global = true)]
    pub forester: Option<String>,

    /// Forester config file passed to every query.
    #[arg(long, global = true)]
    pub config_file: Option<String>,

    /// Query timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the normalized forest as JSON.
    Query,
    /// Complete the tree reference under the cursor.
    Complete(CompleteArgs),
    /// Create a new tree and print its path.
    New(NewArgs),
    /// Pick a tree interactively and print its address.
    Pick(PickArgs),
    /// Answer JSON requests line by line on stdin.
    Serve,
}

#[derive(Debug, Args)]
pub struct CompleteArgs {
    /// Text of the line up to (at least) the cursor.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub line: Option<String>,

    /// Cursor column in characters; defaults to the end of --line.
    #[arg(long, requires = "line")]
    pub cursor: Option<usize>,

    /// Read the line from a file instead.
    #[arg(long, requires_all = ["row", "col"])]
    pub file: Option<PathBuf>,

    /// Zero-based line in --file.
    #[arg(long, requires = "file")]
    pub row: Option<usize>,

    /// Zero-based character column in --file.
    #[arg(long, requires = "file")]
    pub col: Option<usize>,

    /// Fuzzy-rank candidates by the partial address.
    #[arg(long)]
    pub rank: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct NewArgs {
    #[arg(long)]
    pub prefix: Option<String>,

    /// Destination directory, relative to the root.
    #[arg(long)]
    pub dest: Option<String>,

    #[arg(long)]
    pub template: Option<String>,

    /// Use a random address instead of the next sequential one.
    #[arg(long)]
    pub random: bool,
}

#[derive(Debug, Args)]
pub struct PickArgs {
    /// Initial filter text.
    #[arg(long, default_value = "")]
    pub query: String,

    #[command(flatten)]
    pub new: NewArgs,
}

impl Cli {
    /// Flags win over every config file.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(executable) = &self.forester {
            config.forester.executable = executable.clone();
        }
        if let Some(config_file) = &self.config_file {
            config.forester.config_file = config_file.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.forester.timeout_ms = timeout_ms;
        }
    }
}

impl From<NewArgs> for NewTreeOverrides {
    fn from(args: NewArgs) -> Self {
        Self {
            prefix: args.prefix,
            dest: args.dest,
            template: args.template,
            random: args.random.then_some(true),
        }
    }
}

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::prompt::PromptType;
use crate::llm::Backend;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "cpk")]
#[command(
    about = "Assemble bounded, relevance-ordered class contexts from decompiled code and send them for review"
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

    /// Never contact a backend; report what would be sent
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the context for a class or method
    Context(ContextArgs),

    /// Split a context into token-bounded chunks
    Chunk(ChunkArgs),

    /// Show what a class references, or what references it
    Refs(RefsArgs),

    /// Send a context to the configured backend for analysis
    Analyze(AnalyzeArgs),

    /// Initialize a classpack.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Where the roster comes from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Directory of .java files, or a .jsonl roster
    #[arg(long, short = 's', default_value = ".")]
    pub source: PathBuf,
}

/// Per-invocation overrides of the [analysis] config section
#[derive(Args, Debug, Clone, Default)]
pub struct AnalysisOverrides {
    /// Allow patterns, comma-separated (e.g. "com.target.*")
    #[arg(long)]
    pub whitelist: Option<String>,

    /// Deny patterns, comma-separated; replaces the configured list
    #[arg(long)]
    pub blacklist: Option<String>,

    /// Token ceiling for the context
    #[arg(long)]
    pub max_tokens: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ContextArgs {
    /// Qualified class name, optionally `Class#method`
    pub target: String,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub overrides: AnalysisOverrides,

    /// Include superclass, interfaces and referenced classes
    #[arg(long)]
    pub hierarchy: bool,

    /// Restrict the context to one method of the target class
    #[arg(long, short = 'm')]
    pub method: Option<String>,

    /// Print the rendered context without shrinking or truncation
    #[arg(long)]
    pub raw: bool,

    /// Emit segments as JSON
    #[arg(long, conflicts_with = "raw")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ChunkArgs {
    /// Qualified class name, optionally `Class#method`
    pub target: String,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub overrides: AnalysisOverrides,

    /// Include superclass, interfaces and referenced classes
    #[arg(long)]
    pub hierarchy: bool,

    /// Write chunk_NNN.txt files here instead of printing
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct RefsArgs {
    /// Qualified class name (optional with --dot)
    #[arg(required_unless_present = "dot")]
    pub name: Option<String>,

    #[command(flatten)]
    pub source: SourceArgs,

    /// List classes that reference NAME instead
    #[arg(long)]
    pub usages: bool,

    /// Print the whole reference graph as Graphviz DOT
    #[arg(long, conflicts_with = "usages")]
    pub dot: bool,
}

#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Qualified class name, optionally `Class#method`
    pub target: String,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub overrides: AnalysisOverrides,

    /// Force hierarchy mode (defaults to analysis.hierarchy_enabled)
    #[arg(long)]
    pub hierarchy: bool,

    /// Prompt template
    #[arg(long, value_enum)]
    pub prompt: Option<PromptType>,

    /// Custom prompt text (implies --prompt custom)
    #[arg(long)]
    pub custom_prompt: Option<String>,

    /// Backend override
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Follow-up questions sent after the analysis, in order
    #[arg(long)]
    pub ask: Vec<String>,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
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

    /// Output directory; required unless --stdout is set
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "cpk",
            "--quiet",
            "analyze",
            "com.app.Main#onCreate",
            "--source",
            "out",
            "--prompt",
            "malware",
            "--backend",
            "mistral-self-hosted",
            "--ask",
            "first?",
            "--ask",
            "second?",
        ])
        .unwrap();

        assert!(cli.quiet);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.target, "com.app.Main#onCreate");
        assert_eq!(args.source.source, PathBuf::from("out"));
        assert_eq!(args.prompt, Some(PromptType::Malware));
        assert_eq!(args.backend, Some(Backend::MistralSelfHosted));
        assert_eq!(args.ask, vec!["first?", "second?"]);
    }

    #[test]
    fn test_refs_needs_name_unless_dot() {
        assert!(Cli::try_parse_from(["cpk", "refs"]).is_err());
        assert!(Cli::try_parse_from(["cpk", "refs", "--dot"]).is_ok());
        assert!(Cli::try_parse_from(["cpk", "refs", "a.B", "--usages", "--dot"]).is_err());
    }
}

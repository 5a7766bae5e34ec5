//! **classpack** - bounded, hierarchy-aware class context for LLM review
//!
//! Indexes a roster of code units (typically decompiled Java classes), walks
//! superclass/interface/reference relations under a depth limit and package
//! filters, then shrinks and truncates the result to a token ceiling before
//! it joins a running conversation with an analysis backend.

/// Command-line interface with clap integration
pub mod cli;

/// Subcommand handlers
pub mod commands;

/// Shell completion generation
pub mod completion;

/// Context assembly pipeline
pub mod core {
    /// Code units, the roster snapshot, and the source-of-truth trait
    pub mod unit;
    pub use unit::{CodeUnit, ResolutionError, Roster, UnitSource};

    /// Directory and JSONL roster sources
    pub mod source;
    pub use source::{DirectorySource, JsonlSource};

    /// Textual reference graph (Aho-Corasick over qualified names)
    pub mod graph;
    pub use graph::ReferenceGraph;

    /// Memoized allow/deny package filter
    pub mod filter;
    pub use filter::{FilterError, PackageFilter};

    /// Method slicing out of class source
    pub mod method;

    /// Depth-bounded, cycle-safe context traversal
    pub mod traverse;
    pub use traverse::{ContextBuilder, ContextDocument, Mode, Target};

    /// Token estimation and chunking
    pub mod budgeter;
    pub use budgeter::{Chunk, ContextManager, estimate_tokens};

    /// Whitespace shrinking and structure-aware truncation
    pub mod optimize;

    /// Analysis prompt templates
    pub mod prompt;
    pub use prompt::PromptType;

    /// Transcript and submission orchestration
    pub mod session;
    pub use session::{Reply, Session, SessionHandle, SubmitError, Transcript};
}

/// Transmission backends
pub mod llm;

/// Infrastructure - configuration, file I/O, directory walking
pub mod infra {
    /// Layered configuration (file + environment)
    pub mod config;
    pub use config::{Config, load_config};

    /// Memory-mapped file I/O for large files (>1MB threshold)
    pub mod io;
    pub use io::read_file_smart;

    /// Gitignore-aware directory walking
    pub mod walk;
    pub use walk::FileWalker;
}

pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, load_config};

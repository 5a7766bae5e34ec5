//! Gitignore-aware discovery of source files.
//!
//! - Respects .gitignore, .git/info/exclude, and the global gitignore
//! - Extra ignore globs prune directories early and filter files late
//! - Optional restriction to `ignore`'s built-in file types (e.g. "java")
//! - Sorted output so rosters come out in a stable order
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{
    DirEntry, WalkBuilder,
    types::{Types, TypesBuilder},
};
use tracing::warn;

/// Walker over a source tree with extra ignore globs
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Optional file type matcher ("java", "kotlin", ...)
    file_types: Option<Types>,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns such as `build/**`.
    /// Patterns match on paths relative to the walk root.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern).with_context(|| format!("Invalid ignore pattern `{pattern}`"))?);
        }

        Ok(Self {
            ignore_patterns: builder.build()?,
            file_types: None,
        })
    }

    /// Keep only files of the named built-in types, e.g. `&["java"]`
    pub fn with_default_types(
        mut self,
        names: &[&str],
    ) -> Result<Self>
    {
        let mut tb = TypesBuilder::new();
        tb.add_defaults();

        for n in names
        {
            tb.select(n);
        }

        self.file_types = Some(tb.build()?);

        Ok(self)
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Decompiler output trees can live under dot-directories
        b.hidden(false);
        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);

        // Prune ignored directories before descending into them
        let extra = self
            .ignore_patterns
            .clone();
        let prefix = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .is_some_and(|ft| ft.is_dir());
            if !is_dir
            {
                return true;
            }
            let rel = ent
                .path()
                .strip_prefix(&prefix)
                .unwrap_or(ent.path());
            !(extra.is_match(rel) || extra.is_match(rel.join("_")))
        });

        if let Some(t) = &self.file_types
        {
            b.types(t.clone());
        }

        b
    }

    /// Regular files under `root`, sorted by path
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();

        let mut out: Vec<PathBuf> = self
            .build_walk(root_path)
            .build()
            .filter_map(|res| match res
            {
                Ok(entry) => Some(entry),
                Err(e) =>
                {
                    warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        out.sort();
        out
    }
}

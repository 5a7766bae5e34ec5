//! Roster sources backed by the filesystem.
//!
//! [`DirectorySource`] scans a tree of decompiled `.java` files. Each file
//! contributes one unit named after its package and first top-level type.
//! Supertypes are read from the declaration header and resolved to
//! qualified names through explicit imports, then the file's own package.
//!
//! [`JsonlSource`] reads pre-rendered units, one JSON object per line.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use anyhow::{Context, Result};
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::unit::{CodeUnit, ResolutionError, UnitSource};
use crate::infra::io::read_file_smart;
use crate::infra::walk::FileWalker;

static PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").expect("valid regex"));
static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+)\s*;").expect("valid regex"));
static TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:(?:public|protected|private|abstract|final|static|sealed|non-sealed|strictfp)[ \t]+)*(class|interface|enum|record)[ \t]+(\w+)",
    )
    .expect("valid regex")
});

/// What one `.java` file declares at the top level
#[derive(Debug, Clone, PartialEq, Eq)]
struct JavaFile
{
    package: String,
    type_name: String,
    kind: String,
    extends: Vec<String>,
    implements: Vec<String>,
    imports: Vec<String>,
}

impl JavaFile
{
    fn parse(text: &str) -> Option<Self>
    {
        let package = PACKAGE
            .captures(text)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let imports = IMPORT
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .collect();

        let decl = TYPE_DECL.captures(text)?;
        let kind = decl[1].to_string();
        let type_name = decl[2].to_string();

        let header_start = decl
            .get(0)
            .map_or(0, |m| m.end());
        let header_end = text[header_start..]
            .find('{')
            .map_or(text.len(), |i| header_start + i);
        let (extends, implements) = supertypes(&text[header_start..header_end]);

        Some(Self {
            package,
            type_name,
            kind,
            extends,
            implements,
            imports,
        })
    }

    fn qualified_name(&self) -> String
    {
        if self
            .package
            .is_empty()
        {
            self.type_name
                .clone()
        }
        else
        {
            format!("{}.{}", self.package, self.type_name)
        }
    }
}

/// Remove generic argument lists, including nested ones
fn strip_generics(s: &str) -> String
{
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;

    for ch in s.chars()
    {
        match ch
        {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ =>
            {}
        }
    }

    out
}

/// `extends` and `implements` lists of a declaration header
fn supertypes(header: &str) -> (Vec<String>, Vec<String>)
{
    #[derive(PartialEq)]
    enum Clause
    {
        None,
        Extends,
        Implements,
    }

    let header = strip_generics(header);
    let mut clause = Clause::None;
    let mut extends = Vec::new();
    let mut implements = Vec::new();

    for word in header
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
    {
        match word
        {
            "extends" => clause = Clause::Extends,
            "implements" => clause = Clause::Implements,
            "permits" => break,
            w if w.contains(['(', ')', '@']) =>
            {}
            w => match clause
            {
                Clause::Extends => extends.push(w.to_string()),
                Clause::Implements => implements.push(w.to_string()),
                Clause::None =>
                {}
            },
        }
    }

    (extends, implements)
}

/// Qualify a supertype reference as written in `file`
fn resolve_name(
    name: &str,
    file: &JavaFile,
    known: &HashSet<String>,
) -> String
{
    if name.contains('.')
    {
        return name.to_string();
    }

    let suffix = format!(".{name}");
    if let Some(import) = file
        .imports
        .iter()
        .find(|i| i.ends_with(&suffix))
    {
        return import.clone();
    }

    if !file
        .package
        .is_empty()
    {
        let candidate = format!("{}.{name}", file.package);
        if known.contains(&candidate)
        {
            return candidate;
        }
    }

    name.to_string()
}

/// Units discovered under a directory of `.java` files
pub struct DirectorySource
{
    root: PathBuf,
    walker: FileWalker,

    /// Qualified name to file, filled by each scan
    paths: RwLock<HashMap<String, PathBuf>>,
}

impl DirectorySource
{
    pub fn new(
        root: impl Into<PathBuf>,
        ignore_patterns: &[String],
    ) -> Result<Self>
    {
        let walker = FileWalker::new(ignore_patterns)?.with_default_types(&["java"])?;
        Ok(Self {
            root: root.into(),
            walker,
            paths: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    fn path_of(
        &self,
        name: &str,
    ) -> Option<PathBuf>
    {
        self.paths
            .read()
            .ok()?
            .get(name)
            .cloned()
    }
}

impl UnitSource for DirectorySource
{
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn list_all_units(&self) -> Result<Vec<CodeUnit>>
    {
        if !self
            .root
            .is_dir()
        {
            anyhow::bail!("Source directory not found: {}", self.root.display());
        }

        let files = self
            .walker
            .walk_files(&self.root);

        let parsed: Vec<(PathBuf, String, JavaFile)> = files
            .into_par_iter()
            .filter_map(|path| {
                let text = match read_file_smart(&path)
                {
                    Ok(content) => content
                        .to_text()
                        .into_owned(),
                    Err(e) =>
                    {
                        warn!(path = %path.display(), error = %e, "skipping unreadable file");
                        return None;
                    }
                };
                match JavaFile::parse(&text)
                {
                    Some(file) => Some((path, text, file)),
                    None =>
                    {
                        debug!(path = %path.display(), "no top-level type declaration");
                        None
                    }
                }
            })
            .collect();

        let known: HashSet<String> = parsed
            .iter()
            .map(|(_, _, f)| f.qualified_name())
            .collect();

        let mut paths = HashMap::with_capacity(parsed.len());
        let mut units = Vec::with_capacity(parsed.len());

        for (path, text, file) in parsed
        {
            let name = file.qualified_name();
            let resolve = |n: &String| resolve_name(n, &file, &known);

            // Interfaces extend other interfaces; only classes have a superclass
            let (superclass, interfaces): (Option<String>, Vec<String>) = if file.kind == "class"
            {
                (
                    file.extends
                        .first()
                        .map(resolve),
                    file.implements
                        .iter()
                        .map(resolve)
                        .collect(),
                )
            }
            else if file.kind == "interface"
            {
                (
                    None,
                    file.extends
                        .iter()
                        .map(resolve)
                        .collect(),
                )
            }
            else
            {
                (
                    None,
                    file.implements
                        .iter()
                        .map(resolve)
                        .collect(),
                )
            };

            let mut unit = CodeUnit::new(name.clone(), text).with_interfaces(interfaces);
            unit.superclass = superclass;
            paths
                .entry(name)
                .or_insert(path);
            units.push(unit);
        }

        debug!(units = units.len(), "directory scanned");
        if let Ok(mut guard) = self
            .paths
            .write()
        {
            *guard = paths;
        }
        Ok(units)
    }

    fn source_text(
        &self,
        name: &str,
    ) -> Result<String, ResolutionError>
    {
        let path = self
            .path_of(name)
            .ok_or_else(|| ResolutionError::UnknownUnit(name.to_string()))?;

        let content = read_file_smart(&path).map_err(|e| ResolutionError::Unreadable {
            name: name.to_string(),
            reason: format!("{e:#}"),
        })?;
        let text = content
            .to_text()
            .into_owned();

        if text.is_empty()
        {
            return Err(ResolutionError::NoSource(name.to_string()));
        }
        Ok(text)
    }
}

/// Units stored as JSON lines (`{"name": ..., "source": ..., ...}`)
pub struct JsonlSource
{
    path: PathBuf,
}

impl JsonlSource
{
    pub fn new(path: impl Into<PathBuf>) -> Self
    {
        Self { path: path.into() }
    }
}

impl UnitSource for JsonlSource
{
    fn list_all_units(&self) -> Result<Vec<CodeUnit>>
    {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open roster {}", self.path.display()))?;
        let mut units = Vec::new();

        for (i, line) in BufReader::new(file)
            .lines()
            .enumerate()
        {
            let line = line.with_context(|| format!("Failed to read {}", self.path.display()))?;
            if line
                .trim()
                .is_empty()
            {
                continue;
            }
            let unit: CodeUnit = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid code unit", self.path.display(), i + 1))?;
            units.push(unit);
        }

        Ok(units)
    }

    fn source_text(
        &self,
        name: &str,
    ) -> Result<String, ResolutionError>
    {
        let units = self
            .list_all_units()
            .map_err(|e| ResolutionError::Unreadable {
                name: name.to_string(),
                reason: format!("{e:#}"),
            })?;

        let unit = units
            .into_iter()
            .find(|u| u.name == name)
            .ok_or_else(|| ResolutionError::UnknownUnit(name.to_string()))?;

        if unit
            .source
            .is_empty()
        {
            return Err(ResolutionError::NoSource(name.to_string()));
        }
        Ok(unit.source)
    }
}

/// Pick a source for `path`: `.jsonl` files are rosters, anything else a tree
pub fn open_source(
    path: &Path,
    ignore_patterns: &[String],
) -> Result<Box<dyn UnitSource>>
{
    let is_jsonl = path
        .extension()
        .is_some_and(|e| e == "jsonl");

    if is_jsonl
    {
        Ok(Box::new(JsonlSource::new(path)))
    }
    else
    {
        Ok(Box::new(DirectorySource::new(path, ignore_patterns)?))
    }
}

#[cfg(test)]
mod tests
{
    use tempfile::TempDir;

    use super::*;
    use crate::core::unit::Roster;

    fn write(
        root: &Path,
        rel: &str,
        text: &str,
    )
    {
        let path = root.join(rel);
        std::fs::create_dir_all(
            path.parent()
                .unwrap(),
        )
        .unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn test_header_parsing_strips_generics_and_permits()
    {
        let (ext, imp) = supertypes(" extends Base<Map<K, V>> implements Comparable<T>, Runnable permits X");
        assert_eq!(ext, vec!["Base"]);
        assert_eq!(imp, vec!["Comparable", "Runnable"]);

        let (ext, imp) = supertypes("(int x, List<String> y) implements Shape");
        assert!(ext.is_empty());
        assert_eq!(imp, vec!["Shape"]);
    }

    #[test]
    fn test_parse_first_top_level_type()
    {
        let text = "package com.app;\n\nimport com.lib.Base;\nimport java.util.*;\n\n\
                    /** doc */\npublic final class Main extends Base implements Api {\n  class Inner {}\n}\n";
        let file = JavaFile::parse(text).unwrap();

        assert_eq!(file.qualified_name(), "com.app.Main");
        assert_eq!(file.kind, "class");
        assert_eq!(file.extends, vec!["Base"]);
        assert_eq!(file.implements, vec!["Api"]);
        assert_eq!(file.imports, vec!["com.lib.Base"]);
    }

    #[test]
    fn test_directory_source_resolves_supertypes() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();
        write(root, "com/lib/Base.java", "package com.lib;\npublic class Base {}\n");
        write(root, "com/app/Api.java", "package com.app;\npublic interface Api extends Marker {}\n");
        write(root, "com/app/Marker.java", "package com.app;\ninterface Marker {}\n");
        write(
            root,
            "com/app/Main.java",
            "package com.app;\nimport com.lib.Base;\npublic class Main extends Base implements Api {}\n",
        );
        write(root, "notes/README.java", "// nothing declared here\n");

        let source = DirectorySource::new(root, &[])?;
        let roster = Roster::load(&source)?;

        assert_eq!(roster.len(), 4);
        let main = roster
            .get("com.app.Main")
            .unwrap();
        assert_eq!(main.superclass.as_deref(), Some("com.lib.Base"));
        assert_eq!(main.interfaces, vec!["com.app.Api"]);

        let api = roster
            .get("com.app.Api")
            .unwrap();
        assert_eq!(api.superclass, None);
        assert_eq!(api.interfaces, vec!["com.app.Marker"]);

        assert!(
            source
                .source_text("com.lib.Base")?
                .contains("public class Base")
        );
        assert!(matches!(
            source.source_text("com.nope.X"),
            Err(ResolutionError::UnknownUnit(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_directory_is_an_error()
    {
        let source = DirectorySource::new("/definitely/not/here", &[]).unwrap();
        assert!(
            source
                .list_all_units()
                .is_err()
        );
    }

    #[test]
    fn test_jsonl_source() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let path = tmp
            .path()
            .join("roster.jsonl");
        std::fs::write(
            &path,
            "{\"name\":\"a.A\",\"source\":\"class A {}\"}\n\n{\"name\":\"a.B\",\"superclass\":\"a.A\"}\n",
        )?;

        let source = JsonlSource::new(&path);
        let units = source.list_all_units()?;

        assert_eq!(units.len(), 2);
        assert_eq!(units[1].superclass.as_deref(), Some("a.A"));
        assert_eq!(source.source_text("a.A")?, "class A {}");
        assert_eq!(
            source.source_text("a.B"),
            Err(ResolutionError::NoSource("a.B".into()))
        );
        Ok(())
    }

    #[test]
    fn test_jsonl_reports_bad_line()
    {
        let tmp = TempDir::new().unwrap();
        let path = tmp
            .path()
            .join("bad.jsonl");
        std::fs::write(&path, "{\"name\":\"a.A\"}\nnot json\n").unwrap();

        let err = JsonlSource::new(&path)
            .list_all_units()
            .unwrap_err();
        assert!(format!("{err:#}").contains(":2: invalid code unit"));
    }
}

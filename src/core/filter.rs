//! Allow/deny package filtering for qualified names.
//!
//! Patterns come as comma-separated lists (`"android.*, com.google.*"`).
//! Each pattern is compiled into a glob anchored to the whole name. `*`
//! matches any sequence, dots included. Every other character is literal. The deny list wins
//! over the allow list. An empty allow list allows everything not denied.
//!
//! Decisions are memoized per name until [`PackageFilter::reset`] or
//! [`PackageFilter::invalidate`] is called.

use std::collections::HashMap;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, trace};

/// A filter pattern list could not be compiled
#[derive(Debug, thiserror::Error)]
pub enum FilterError
{
    #[error("invalid package pattern `{pattern}`: {source}")]
    InvalidPattern
    {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to build pattern set: {0}")]
    Build(#[from] globset::Error),
}

/// Split a CSV pattern list into trimmed, non-empty patterns
pub fn split_patterns(csv: &str) -> Vec<String>
{
    csv.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Glob for `pattern` with every metacharacter but `*` escaped
fn literal_glob(pattern: &str) -> String
{
    let mut glob = String::with_capacity(pattern.len());

    for (i, piece) in pattern
        .split('*')
        .enumerate()
    {
        // Runs of `*` collapse into one
        if i > 0 && !glob.ends_with('*')
        {
            glob.push('*');
        }
        glob.push_str(&globset::escape(piece));
    }

    glob
}

/// Compile a CSV pattern list into one anchored glob set
pub fn compile_patterns(csv: &str) -> Result<GlobSet, FilterError>
{
    let mut builder = GlobSetBuilder::new();

    for pattern in split_patterns(csv)
    {
        // Qualified names have no path separators, so `*` spans dots
        let glob = GlobBuilder::new(&literal_glob(&pattern))
            .literal_separator(false)
            .backslash_escape(false)
            .build()
            .map_err(|source| FilterError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }

    Ok(builder.build()?)
}

/// Memoizing allow/deny decision over qualified names
#[derive(Debug, Clone)]
pub struct PackageFilter
{
    allow: GlobSet,
    deny: GlobSet,
    cache: HashMap<String, bool>,
}

impl Default for PackageFilter
{
    fn default() -> Self
    {
        Self {
            allow: GlobSet::empty(),
            deny: GlobSet::empty(),
            cache: HashMap::new(),
        }
    }
}

impl PackageFilter
{
    /// Compile a filter from allow (whitelist) and deny (blacklist) CSVs
    pub fn new(
        allow_csv: &str,
        deny_csv: &str,
    ) -> Result<Self, FilterError>
    {
        Ok(Self {
            allow: compile_patterns(allow_csv)?,
            deny: compile_patterns(deny_csv)?,
            cache: HashMap::new(),
        })
    }

    /// Whether `name` may be included in a context
    pub fn is_allowed(
        &mut self,
        name: &str,
    ) -> bool
    {
        if let Some(&hit) = self
            .cache
            .get(name)
        {
            return hit;
        }

        let decision = self.decide(name);
        trace!(name, decision, "package filter decision");
        self.cache
            .insert(name.to_string(), decision);
        decision
    }

    /// Replace both pattern lists and drop every memoized decision.
    /// On error the previous patterns stay in force (cache still cleared).
    pub fn reset(
        &mut self,
        allow_csv: &str,
        deny_csv: &str,
    ) -> Result<(), FilterError>
    {
        self.cache
            .clear();
        let allow = compile_patterns(allow_csv)?;
        let deny = compile_patterns(deny_csv)?;
        self.allow = allow;
        self.deny = deny;
        debug!(
            allow = self.allow.len(),
            deny = self.deny.len(),
            "package filter reset"
        );
        Ok(())
    }

    /// Drop memoized decisions while keeping the patterns
    pub fn invalidate(&mut self)
    {
        self.cache
            .clear();
    }

    /// Memoized decision for `name`, if one exists
    pub fn cached(
        &self,
        name: &str,
    ) -> Option<bool>
    {
        self.cache
            .get(name)
            .copied()
    }

    pub fn cache_len(&self) -> usize
    {
        self.cache
            .len()
    }

    fn decide(
        &self,
        name: &str,
    ) -> bool
    {
        if self
            .deny
            .is_match(name)
        {
            return false;
        }
        self.allow
            .is_empty()
            || self
                .allow
                .is_match(name)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_split_patterns_trims_and_drops_empties()
    {
        assert_eq!(
            split_patterns(" android.* ,, java.*,  "),
            vec!["android.*".to_string(), "java.*".to_string()]
        );
        assert!(split_patterns("").is_empty());
    }

    #[test]
    fn test_deny_beats_allow()
    {
        let mut f = PackageFilter::new("com.example.*", "com.example.internal.*").unwrap();

        assert!(f.is_allowed("com.example.Api"));
        assert!(!f.is_allowed("com.example.internal.Secret"));
        assert!(!f.is_allowed("org.other.Thing"));
    }

    #[test]
    fn test_empty_allow_list_allows_everything_not_denied()
    {
        let mut f = PackageFilter::new("", "java.*, kotlin.*").unwrap();

        assert!(f.is_allowed("com.app.Main"));
        assert!(!f.is_allowed("java.lang.String"));
        assert!(!f.is_allowed("kotlin.jvm.functions.Function1"));
    }

    #[test]
    fn test_only_star_is_a_wildcard()
    {
        let mut f = PackageFilter::new("", "a.B?, a.[Cc], a.{D,E}, a.**.F").unwrap();

        assert!(f.is_allowed("a.BC"));
        assert!(!f.is_allowed("a.B?"));
        assert!(f.is_allowed("a.C"));
        assert!(!f.is_allowed("a.[Cc]"));
        assert!(f.is_allowed("a.D"));
        assert!(!f.is_allowed("a.{D,E}"));
        assert!(!f.is_allowed("a.x.y.F"));
    }

    #[test]
    fn test_patterns_are_anchored_and_dots_literal()
    {
        let mut f = PackageFilter::new("", "A, com.x.*").unwrap();

        // Exact pattern only matches the whole name
        assert!(!f.is_allowed("A"));
        assert!(f.is_allowed("pkg.A"));
        assert!(f.is_allowed("AB"));

        // `.` must not act as a wildcard
        assert!(f.is_allowed("comXx.Y"));
        assert!(!f.is_allowed("com.x.y.Z"));
    }

    #[test]
    fn test_inner_class_names_match_literally()
    {
        let mut f = PackageFilter::new("", "a.Outer$Inner").unwrap();

        assert!(!f.is_allowed("a.Outer$Inner"));
        assert!(f.is_allowed("a.Outer"));
    }

    #[test]
    fn test_decisions_are_memoized_until_reset()
    {
        let mut f = PackageFilter::new("", "").unwrap();

        assert!(f.is_allowed("a.A"));
        assert_eq!(f.cached("a.A"), Some(true));
        assert!(f.is_allowed("a.A"));
        assert_eq!(f.cache_len(), 1);

        f.reset("", "a.*").unwrap();
        assert_eq!(f.cached("a.A"), None);
        assert!(!f.is_allowed("a.A"));
    }

    #[test]
    fn test_invalid_pattern_is_a_configuration_error()
    {
        let err = PackageFilter::new("com.[broken", "").unwrap_err();
        assert!(matches!(err, FilterError::InvalidPattern { ref pattern, .. } if pattern == "com.[broken"));

        // A failed reset leaves the previous patterns in force
        let mut f = PackageFilter::new("", "x.*").unwrap();
        assert!(f.reset("", "y.[").is_err());
        assert!(!f.is_allowed("x.A"));
        assert!(f.is_allowed("y.A"));
    }
}

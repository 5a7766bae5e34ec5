//! Code units and the roster snapshot that owns them.
//!
//! A [`Roster`] is an immutable, insertion-ordered view over every unit the
//! source-of-truth knows about. Everything downstream (graph, traversal,
//! session) refers to units by qualified name and borrows text from here.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One analyzable class-level entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit
{
    /// Fully-qualified name (e.g. `com.example.net.Client`)
    pub name: String,

    /// Rendered source text; empty when the source-of-truth could not render it
    #[serde(default)]
    pub source: String,

    /// Declared superclass, if any
    #[serde(default)]
    pub superclass: Option<String>,

    /// Implemented interfaces in declaration order
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl CodeUnit
{
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self
    {
        Self {
            name: name.into(),
            source: source.into(),
            superclass: None,
            interfaces: Vec::new(),
        }
    }

    pub fn with_superclass(
        mut self,
        superclass: impl Into<String>,
    ) -> Self
    {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn with_interfaces<I, S>(
        mut self,
        interfaces: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interfaces = interfaces
            .into_iter()
            .map(Into::into)
            .collect();
        self
    }

    /// Package prefix including the trailing dot (`""` for the default package)
    pub fn package(&self) -> &str
    {
        package_prefix(&self.name)
    }
}

/// Package prefix of a qualified name, including the trailing dot
pub fn package_prefix(name: &str) -> &str
{
    match name.rfind('.')
    {
        Some(i) if i > 0 => &name[..=i],
        _ => "",
    }
}

/// A unit or its text could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError
{
    #[error("unknown code unit: {0}")]
    UnknownUnit(String),

    #[error("no source text available for {0}")]
    NoSource(String),

    #[error("failed to read source for {name}: {reason}")]
    Unreadable
    {
        name: String,
        reason: String,
    },

    #[error("method `{method}` not found in {unit}")]
    MethodNotFound
    {
        unit: String,
        method: String,
    },
}

/// Source-of-truth collaborator: supplies the roster and per-unit text
pub trait UnitSource: Send + Sync
{
    /// Every known unit, in a stable order
    fn list_all_units(&self) -> Result<Vec<CodeUnit>>;

    /// Fetch the current source text of one unit
    fn source_text(
        &self,
        name: &str,
    ) -> Result<String, ResolutionError>;
}

/// Immutable snapshot of all known code units, keyed by qualified name
#[derive(Debug, Clone, Default)]
pub struct Roster
{
    units: IndexMap<String, CodeUnit>,
}

impl Roster
{
    /// Build a roster; units with empty names are dropped and the first
    /// occurrence of a duplicated name wins.
    pub fn new(units: impl IntoIterator<Item = CodeUnit>) -> Self
    {
        let mut map: IndexMap<String, CodeUnit> = IndexMap::new();

        for unit in units
        {
            if unit
                .name
                .trim()
                .is_empty()
            {
                warn!("skipping code unit with an empty name");
                continue;
            }
            if map.contains_key(&unit.name)
            {
                warn!(name = %unit.name, "duplicate code unit; keeping the first");
                continue;
            }
            map.insert(
                unit.name
                    .clone(),
                unit,
            );
        }

        Self { units: map }
    }

    /// Snapshot everything a source-of-truth currently lists
    pub fn load(source: &dyn UnitSource) -> Result<Self>
    {
        let units = source
            .list_all_units()
            .context("Failed to list code units")?;
        let roster = Self::new(units);
        debug!(units = roster.len(), "roster loaded");
        Ok(roster)
    }

    pub fn len(&self) -> usize
    {
        self.units
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.units
            .is_empty()
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&CodeUnit>
    {
        self.units
            .get(name)
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool
    {
        self.units
            .contains_key(name)
    }

    /// Position of a unit in roster order
    pub fn index_of(
        &self,
        name: &str,
    ) -> Option<usize>
    {
        self.units
            .get_index_of(name)
    }

    pub fn by_index(
        &self,
        idx: usize,
    ) -> Option<&CodeUnit>
    {
        self.units
            .get_index(idx)
            .map(|(_, u)| u)
    }

    /// Units in roster order
    pub fn iter(&self) -> impl Iterator<Item = &CodeUnit>
    {
        self.units
            .values()
    }

    /// Borrow the text of a unit, failing when it is unknown or unrendered
    pub fn text_of(
        &self,
        name: &str,
    ) -> Result<&str, ResolutionError>
    {
        let unit = self
            .units
            .get(name)
            .ok_or_else(|| ResolutionError::UnknownUnit(name.to_string()))?;

        if unit
            .source
            .is_empty()
        {
            return Err(ResolutionError::NoSource(name.to_string()));
        }

        Ok(&unit.source)
    }
}

impl UnitSource for Roster
{
    fn list_all_units(&self) -> Result<Vec<CodeUnit>>
    {
        Ok(self
            .units
            .values()
            .cloned()
            .collect())
    }

    fn source_text(
        &self,
        name: &str,
    ) -> Result<String, ResolutionError>
    {
        self.text_of(name)
            .map(str::to_string)
    }
}

//! Context traversal: expands a root unit into an ordered document.
//!
//! Simple mode emits just the root. Hierarchy mode walks depth-first in
//! pre-order from the root, at most [`MAX_DEPTH`] hops. From each unit it
//! follows the superclass, then the interfaces in declaration order, then
//! every unit the text references (same package first). Visited and
//! filtered-out units are hard stops. A unit without source text is marked
//! visited and contributes nothing.
//!
//! Text comes from the source of truth when one is attached, otherwise from
//! the roster snapshot. Relations always come from the snapshot.
//!
//! The walk is an explicit worklist. Children are pushed in reverse so that
//! pop order equals the recursive pre-order.

use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::core::filter::PackageFilter;
use crate::core::graph::ReferenceGraph;
use crate::core::method::extract_method;
use crate::core::unit::{ResolutionError, Roster, UnitSource};

/// Hops from the root a hierarchy may span (root, relations, their relations)
pub const MAX_DEPTH: usize = 2;

/// How much of the graph a context covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode
{
    /// Root unit only
    #[default]
    Simple,

    /// Root plus superclass/interface/reference relations
    Hierarchy,
}

/// What a context is built around
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target
{
    Class(String),
    Method
    {
        class: String,
        method: String,
    },
}

impl Target
{
    /// Parse `pkg.Class` or `pkg.Class#method`
    pub fn parse(input: &str) -> Self
    {
        match input.split_once('#')
        {
            Some((class, method)) if !method.is_empty() => Target::Method {
                class: class.to_string(),
                method: method.to_string(),
            },
            _ => Target::Class(
                input.trim_end_matches('#')
                    .to_string(),
            ),
        }
    }

    /// Qualified name of the (declaring) class
    pub fn class(&self) -> &str
    {
        match self
        {
            Target::Class(c) => c,
            Target::Method { class, .. } => class,
        }
    }
}

/// One contributed piece of a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment
{
    /// Contributing qualified name (`Class#method` for method slices)
    pub unit: String,

    /// Header line rendered above the text
    pub header: String,

    /// Hops from the root
    pub depth: usize,

    /// Source text
    pub text: String,
}

/// Ordered segments produced by one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextDocument
{
    segments: Vec<Segment>,
}

impl ContextDocument
{
    pub fn segments(&self) -> &[Segment]
    {
        &self.segments
    }

    /// Contributing names in emission order
    pub fn units(&self) -> Vec<&str>
    {
        self.segments
            .iter()
            .map(|s| s.unit.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool
    {
        self.segments
            .is_empty()
    }

    /// Plain-text rendering: header line, text, blank line between segments
    pub fn render(&self) -> String
    {
        let mut out = String::new();

        for (i, seg) in self
            .segments
            .iter()
            .enumerate()
        {
            if i > 0
            {
                out.push_str("\n\n");
            }
            out.push_str(&seg.header);
            out.push('\n');
            out.push_str(
                seg.text
                    .trim_end(),
            );
        }

        out
    }
}

/// Header line naming a class segment
pub fn class_header(name: &str) -> String
{
    format!("// Class: {name}")
}

/// Visited set for one top-level traversal; dropped when the call returns
#[derive(Debug, Default)]
struct TraversalState
{
    visited: HashSet<usize>,

    /// Pending (roster index, depth) pairs; top is expanded next
    stack: Vec<(usize, usize)>,
}

/// Builds context documents over one roster snapshot
pub struct ContextBuilder<'a>
{
    roster: &'a Roster,
    graph: &'a ReferenceGraph,
    filter: &'a mut PackageFilter,
    source: Option<&'a dyn UnitSource>,
}

impl<'a> ContextBuilder<'a>
{
    pub fn new(
        roster: &'a Roster,
        graph: &'a ReferenceGraph,
        filter: &'a mut PackageFilter,
    ) -> Self
    {
        debug_assert_eq!(
            roster.len(),
            graph.node_count(),
            "reference graph must be built from the same roster"
        );
        Self {
            roster,
            graph,
            filter,
            source: None,
        }
    }

    /// Fetch unit text from `source` instead of the snapshot
    pub fn with_source(
        mut self,
        source: Option<&'a dyn UnitSource>,
    ) -> Self
    {
        self.source = source;
        self
    }

    fn text_of(
        &self,
        name: &str,
    ) -> Result<Cow<'a, str>, ResolutionError>
    {
        match self.source
        {
            Some(source) => source
                .source_text(name)
                .map(Cow::Owned),
            None => self
                .roster
                .text_of(name)
                .map(Cow::Borrowed),
        }
    }

    /// Build the document for a class or method target
    pub fn build(
        &mut self,
        target: &Target,
        mode: Mode,
    ) -> Result<ContextDocument, ResolutionError>
    {
        match target
        {
            Target::Class(name) => match mode
            {
                Mode::Simple => self.build_simple(name),
                Mode::Hierarchy => self.build_hierarchy(name),
            },
            Target::Method { class, method } =>
            {
                let text = self.text_of(class)?;
                let code =
                    extract_method(&text, method).ok_or_else(|| ResolutionError::MethodNotFound {
                        unit: class.clone(),
                        method: method.clone(),
                    })?;

                let (mut doc, header) = match mode
                {
                    Mode::Simple => (ContextDocument::default(), "Method code:"),
                    Mode::Hierarchy => (self.build_hierarchy(class)?, "Analyzed Method:"),
                };
                doc.segments
                    .push(Segment {
                        unit: format!("{class}#{method}"),
                        header: header.to_string(),
                        depth: 0,
                        text: code,
                    });
                Ok(doc)
            }
        }
    }

    /// Header plus source of the root only
    pub fn build_simple(
        &mut self,
        root: &str,
    ) -> Result<ContextDocument, ResolutionError>
    {
        let mut doc = ContextDocument::default();

        match self.text_of(root)
        {
            Ok(text) => doc
                .segments
                .push(Segment {
                    unit: root.to_string(),
                    header: class_header(root),
                    depth: 0,
                    text: text.into_owned(),
                }),
            Err(ResolutionError::NoSource(_)) => debug!(root, "root has no source text"),
            Err(e) => return Err(e),
        }

        Ok(doc)
    }

    /// Depth-bounded, filtered, cycle-safe pre-order expansion of `root`
    #[instrument(skip(self))]
    pub fn build_hierarchy(
        &mut self,
        root: &str,
    ) -> Result<ContextDocument, ResolutionError>
    {
        let root_idx = self
            .roster
            .index_of(root)
            .ok_or_else(|| ResolutionError::UnknownUnit(root.to_string()))?;

        // Decisions must not leak in from earlier calls
        self.filter
            .invalidate();

        let mut state = TraversalState::default();
        let mut doc = ContextDocument::default();
        state
            .stack
            .push((root_idx, 0));

        while let Some((idx, depth)) = state
            .stack
            .pop()
        {
            let Some(unit) = self
                .roster
                .by_index(idx)
            else
            {
                continue;
            };

            if depth > MAX_DEPTH
                || state
                    .visited
                    .contains(&idx)
                || !self
                    .filter
                    .is_allowed(&unit.name)
            {
                continue;
            }
            state
                .visited
                .insert(idx);

            let text = match self.text_of(&unit.name)
            {
                Ok(text) => text,
                Err(e @ ResolutionError::Unreadable { .. }) =>
                {
                    warn!(unit = %unit.name, error = %e, "skipping unreadable unit");
                    continue;
                }
                Err(e) =>
                {
                    debug!(unit = %unit.name, error = %e, "skipping unit without source");
                    continue;
                }
            };

            trace!(unit = %unit.name, depth, "emit");
            doc.segments
                .push(Segment {
                    unit: unit
                        .name
                        .clone(),
                    header: class_header(&unit.name),
                    depth,
                    text: text.into_owned(),
                });

            if depth < MAX_DEPTH
            {
                let children = self.relations(idx);
                state
                    .stack
                    .extend(
                        children
                            .into_iter()
                            .rev()
                            .map(|c| (c, depth + 1)),
                    );
            }
        }

        debug!(
            emitted = doc
                .segments
                .len(),
            visited = state
                .visited
                .len(),
            "hierarchy built"
        );
        Ok(doc)
    }

    /// Direct relations of the unit at `idx`, in expansion order
    fn relations(
        &self,
        idx: usize,
    ) -> Vec<usize>
    {
        let Some(unit) = self
            .roster
            .by_index(idx)
        else
        {
            return Vec::new();
        };

        let mut out: Vec<usize> = Vec::new();

        // (a) superclass, (b) interfaces in declaration order
        for name in unit
            .superclass
            .iter()
            .chain(
                unit.interfaces
                    .iter(),
            )
        {
            if let Some(j) = self
                .roster
                .index_of(name)
            {
                out.push(j);
            }
        }

        // (c) textual references, same package first
        let package = unit.package();
        let (same, other): (Vec<usize>, Vec<usize>) = self
            .graph
            .reference_indices(idx)
            .partition(|&j| {
                self.roster
                    .by_index(j)
                    .is_some_and(|u| u.package() == package)
            });
        out.extend(same);
        out.extend(other);

        out
    }
}

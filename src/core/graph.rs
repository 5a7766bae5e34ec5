//! Textual reference graph over a roster.
//!
//! An edge `A -> B` exists when B's qualified name occurs anywhere inside
//! A's rendered source. All names are fed to a single Aho-Corasick
//! automaton, so every unit's text is scanned once instead of once per
//! candidate name. The result is identical to a pairwise `contains` check.
//!
//! The graph is rebuilt wholesale for every roster snapshot.

use std::collections::{BTreeSet, HashMap};

use aho_corasick::{AhoCorasick, MatchKind};
use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::core::unit::Roster;

/// Forward and inverse "mentions" index, addressed in roster order
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph
{
    /// Qualified names in roster order
    names: Vec<String>,

    /// Name -> position in `names`
    index: HashMap<String, usize>,

    /// For each unit, the units its text mentions (self excluded)
    forward: Vec<BTreeSet<usize>>,

    /// For each unit, the units whose text mentions it
    inverse: Vec<BTreeSet<usize>>,
}

impl ReferenceGraph
{
    /// Index every textual reference between roster units
    #[instrument(skip_all, fields(units = roster.len()))]
    pub fn build(roster: &Roster) -> Self
    {
        let names: Vec<String> = roster
            .iter()
            .map(|u| {
                u.name
                    .clone()
            })
            .collect();
        let texts: Vec<&str> = roster
            .iter()
            .map(|u| {
                u.source
                    .as_str()
            })
            .collect();

        let forward: Vec<BTreeSet<usize>> = match AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&names)
        {
            Ok(ac) => texts
                .par_iter()
                .enumerate()
                .map(|(i, text)| {
                    ac.find_overlapping_iter(*text)
                        .map(|m| {
                            m.pattern()
                                .as_usize()
                        })
                        .filter(|&j| j != i)
                        .collect()
                })
                .collect(),
            Err(e) =>
            {
                // Automaton limits exceeded; fall back to the pairwise scan
                warn!(error = %e, "reference automaton unavailable, scanning pairwise");
                texts
                    .par_iter()
                    .enumerate()
                    .map(|(i, text)| {
                        names
                            .iter()
                            .enumerate()
                            .filter(|&(j, name)| j != i && text.contains(name.as_str()))
                            .map(|(j, _)| j)
                            .collect()
                    })
                    .collect()
            }
        };

        let mut inverse: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); names.len()];
        for (from, targets) in forward
            .iter()
            .enumerate()
        {
            for &to in targets
            {
                inverse[to].insert(from);
            }
        }

        let index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        let graph = Self {
            names,
            index,
            forward,
            inverse,
        };
        debug!(edges = graph.edge_count(), "reference graph built");
        graph
    }

    /// Units whose names appear in `name`'s text, in roster order
    pub fn references_of(
        &self,
        name: &str,
    ) -> Vec<&str>
    {
        self.lookup(name, &self.forward)
    }

    /// Units whose text mentions `name`, in roster order
    pub fn referenced_by(
        &self,
        name: &str,
    ) -> Vec<&str>
    {
        self.lookup(name, &self.inverse)
    }

    /// Roster positions referenced by the unit at `idx`
    pub(crate) fn reference_indices(
        &self,
        idx: usize,
    ) -> impl Iterator<Item = usize> + '_
    {
        self.forward
            .get(idx)
            .into_iter()
            .flat_map(|set| {
                set.iter()
                    .copied()
            })
    }

    pub fn edge_count(&self) -> usize
    {
        self.forward
            .iter()
            .map(BTreeSet::len)
            .sum()
    }

    pub fn node_count(&self) -> usize
    {
        self.names
            .len()
    }

    /// Render the whole graph as Graphviz DOT
    pub fn to_dot(&self) -> String
    {
        let mut g: DiGraph<&str, ()> = DiGraph::new();
        let nodes: Vec<_> = self
            .names
            .iter()
            .map(|n| g.add_node(n.as_str()))
            .collect();

        for (from, targets) in self
            .forward
            .iter()
            .enumerate()
        {
            for &to in targets
            {
                g.add_edge(nodes[from], nodes[to], ());
            }
        }

        format!("{:?}", Dot::with_config(&g, &[Config::EdgeNoLabel]))
    }

    fn lookup<'a>(
        &'a self,
        name: &str,
        edges: &'a [BTreeSet<usize>],
    ) -> Vec<&'a str>
    {
        let Some(&idx) = self
            .index
            .get(name)
        else
        {
            return Vec::new();
        };

        edges[idx]
            .iter()
            .map(|&j| self.names[j].as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests
{
    use proptest::prelude::*;

    use super::*;
    use crate::core::unit::CodeUnit;

    fn roster() -> Roster
    {
        Roster::new(vec![
            CodeUnit::new("app.Base", "public class Base {}"),
            CodeUnit::new(
                "app.Client",
                "public class Client extends app.Base { app.net.Http h; app.Client self; }",
            ),
            CodeUnit::new("app.net.Http", "public class Http { app.Base b; }"),
            CodeUnit::new("app.Unused", "public class Unused {}"),
        ])
    }

    #[test]
    fn test_forward_and_inverse_edges()
    {
        let graph = ReferenceGraph::build(&roster());

        assert_eq!(
            graph.references_of("app.Client"),
            vec!["app.Base", "app.net.Http"]
        );
        assert_eq!(
            graph.referenced_by("app.Base"),
            vec!["app.Client", "app.net.Http"]
        );
        assert!(
            graph
                .references_of("app.Unused")
                .is_empty()
        );
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_unknown_name_yields_empty_sets()
    {
        let graph = ReferenceGraph::build(&roster());

        assert!(
            graph
                .references_of("nope.Missing")
                .is_empty()
        );
        assert!(
            graph
                .referenced_by("nope.Missing")
                .is_empty()
        );
    }

    #[test]
    fn test_overlapping_names_are_all_found()
    {
        // `a.B` is a prefix of `a.BB`; both must be detected in one pass
        let roster = Roster::new(vec![
            CodeUnit::new("a.B", "class B {}"),
            CodeUnit::new("a.BB", "class BB {}"),
            CodeUnit::new("a.C", "uses a.BB only"),
        ]);
        let graph = ReferenceGraph::build(&roster);

        assert_eq!(graph.references_of("a.C"), vec!["a.B", "a.BB"]);
    }

    #[test]
    fn test_dot_export_lists_nodes_and_edges()
    {
        let dot = ReferenceGraph::build(&roster()).to_dot();

        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("app.Client"));
        assert_eq!(
            dot.matches("->")
                .count(),
            3
        );
    }

    proptest! {
        #[test]
        fn prop_references_never_include_self(
            texts in proptest::collection::vec("[a-c. ]{0,24}", 1..8)
        ) {
            let units: Vec<CodeUnit> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| CodeUnit::new(format!("a.{}", ["a", "b", "c", "ab", "ba", "abc", "c.a", "b.b"][i]), t.clone()))
                .collect();
            let roster = Roster::new(units);
            let graph = ReferenceGraph::build(&roster);

            for unit in roster.iter() {
                prop_assert!(!graph.references_of(&unit.name).contains(&unit.name.as_str()));
                for target in graph.references_of(&unit.name) {
                    prop_assert!(unit.source.contains(target));
                }
            }
        }
    }
}

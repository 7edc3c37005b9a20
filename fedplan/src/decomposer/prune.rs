//! Narrowing of candidate molecules through star connections.

use std::collections::BTreeSet;

use itertools::Itertools;
use petgraph::graphmap::DiGraphMap;

use crate::ast::PrefixMap;
use crate::catalogue::Catalogue;
use crate::decomposer::star::{Star, StarConnections};
use crate::session::PlanLog;

/// `linkedTo` edges between the molecules selected for any star.
pub(crate) fn molecule_links<'a>(
    catalogue: &'a Catalogue,
    candidates: &'a [BTreeSet<String>],
) -> DiGraphMap<&'a str, ()> {
    let selected = candidates
        .iter()
        .flatten()
        .map(String::as_str)
        .collect::<BTreeSet<_>>();

    let mut graph = DiGraphMap::new();
    for name in &selected {
        graph.add_node(*name);
        if let Some(molecule) = catalogue.molecule(name) {
            for link in &molecule.linked_to {
                if let Some(target) = selected.get(link.as_str()) {
                    graph.add_edge(*name, *target, ());
                }
            }
        }
    }
    graph
}

/// Keeps the candidates of every star consistent with the candidates of the stars it is
/// connected to.
///
/// A candidate `m` of star `s` survives an edge `s -> c` when some molecule linked from `m` is a
/// candidate of `c`, those linked molecules survive for `c`. Declared predicate ranges then
/// narrow the candidates of stars that are the object of a connecting triple. A star left without
/// candidates gets its original ones back.
pub(crate) fn prune_molecules(
    stars: &[Star],
    connections: &StarConnections,
    candidates: &[BTreeSet<String>],
    catalogue: &Catalogue,
    prefixes: &PrefixMap,
    log: &PlanLog,
) -> Vec<BTreeSet<String>> {
    let links = molecule_links(catalogue, candidates);

    let mut retained = candidates
        .iter()
        .map(|c| {
            if c.len() == 1 {
                c.clone()
            } else {
                BTreeSet::new()
            }
        })
        .collect::<Vec<_>>();

    for (s, c) in connections.edges() {
        for m in &candidates[s] {
            if !links.contains_node(m.as_str()) {
                continue;
            }
            let linked = links
                .neighbors(m.as_str())
                .filter(|n| candidates[c].contains(*n))
                .map(str::to_string)
                .collect::<Vec<_>>();
            if !linked.is_empty() {
                retained[s].insert(m.clone());
                retained[c].extend(linked);
            }
        }
    }

    for (s, star) in stars.iter().enumerate() {
        for c in connections.sources(s) {
            let connecting = stars[c]
                .triples
                .iter()
                .filter(|t| t.object == star.subject)
                .filter_map(|t| prefixes.resolve_term(&t.predicate))
                .collect::<BTreeSet<_>>();

            let ranges = candidates[s]
                .iter()
                .chain(&candidates[c])
                .filter_map(|m| catalogue.molecule(m))
                .flat_map(|m| {
                    m.predicates
                        .iter()
                        .filter(|p| connecting.contains(&p.predicate))
                        .flat_map(|p| p.range.iter())
                })
                .collect::<BTreeSet<_>>();

            let in_range = retained[s]
                .iter()
                .filter(|m| ranges.contains(m))
                .cloned()
                .collect::<BTreeSet<_>>();
            if !in_range.is_empty() {
                log.debug(format_args!(
                    "Ranges of {} restrict star {} to {:?}",
                    connecting.iter().join(", "),
                    star.key,
                    in_range
                ));
                retained[s] = in_range;
            }
        }
    }

    for (s, kept) in retained.iter_mut().enumerate() {
        if kept.is_empty() {
            *kept = candidates[s].clone();
        }
        log.debug(format_args!("Star {} keeps molecules {:?}", stars[s].key, kept));
    }
    retained
}

//! Merging of services sent to the same endpoint.

use std::collections::BTreeSet;

use petgraph::unionfind::UnionFind;

use crate::ast::Service;

fn join_variables(service: &Service) -> BTreeSet<&str> {
    service
        .triples
        .iter()
        .flat_map(|t| [&t.subject, &t.object])
        .filter_map(|term| term.variable_name())
        .collect()
}

fn share_join_variable(left: &Service, right: &Service) -> bool {
    !join_variables(left).is_disjoint(&join_variables(right))
}

/// Merges services targeting the same endpoint that are connected through shared subject or
/// object variables, so each connected group is sent as one call.
///
/// Endpoints keep the order of their first service.
pub(crate) fn merge_same_endpoint(services: Vec<Service>) -> Vec<Service> {
    let mut by_endpoint = Vec::<(String, Vec<Service>)>::new();
    for service in services {
        match by_endpoint.iter_mut().find(|(e, _)| *e == service.endpoint) {
            Some((_, group)) => group.push(service),
            None => by_endpoint.push((service.endpoint.clone(), vec![service])),
        }
    }

    let mut merged = vec![];
    for (_, group) in by_endpoint {
        let mut components = UnionFind::<usize>::new(group.len());
        for i in 0..group.len() {
            for j in i + 1..group.len() {
                if share_join_variable(&group[i], &group[j]) {
                    components.union(i, j);
                }
            }
        }

        let mut by_root = Vec::<(usize, Service)>::new();
        for (i, service) in group.into_iter().enumerate() {
            let root = components.find(i);
            match by_root.iter_mut().find(|(r, _)| *r == root) {
                Some((_, target)) => {
                    target.triples.extend(service.triples);
                    target.filters.extend(service.filters);
                }
                None => by_root.push((root, service)),
            }
        }
        merged.extend(by_root.into_iter().map(|(_, s)| s));
    }
    merged
}

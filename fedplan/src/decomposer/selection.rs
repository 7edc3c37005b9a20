//! Candidate molecule selection for stars.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::ast::{JoinBlock, PlanNode, PrefixMap, Service, Triple, UnionBlock, RDF_TYPE};
use crate::catalogue::Catalogue;
use crate::decomposer::star::{Star, StarConnections};
use crate::error::{DecomposeError, DecomposeResult};
use crate::session::PlanLog;

/// Stars after selection, with the candidate molecules of each star at the same index.
///
/// Split stars are replaced by one sub star per contributing molecule.
#[derive(Debug)]
pub(crate) struct SourceSelection {
    pub stars: Vec<Star>,
    pub candidates: Vec<BTreeSet<String>>,
}

impl SourceSelection {
    fn push(&mut self, star: Star, candidates: BTreeSet<String>) {
        self.stars.push(star);
        self.candidates.push(candidates);
    }
}

pub(crate) fn select_sources(
    stars: Vec<Star>,
    catalogue: &Catalogue,
    prefixes: &PrefixMap,
    log: &PlanLog,
) -> DecomposeResult<SourceSelection> {
    let connections = StarConnections::build(&stars);
    let all_molecules = catalogue
        .molecule_names()
        .map(str::to_string)
        .collect::<BTreeSet<_>>();

    let mut selection = SourceSelection {
        stars: Vec::with_capacity(stars.len()),
        candidates: Vec::with_capacity(stars.len()),
    };
    let mut free_stars = vec![];

    for (id, star) in stars.into_iter().enumerate() {
        let predicates = star.constant_predicates(prefixes);

        let typed = type_molecules(&star, catalogue, prefixes);
        if !typed.is_empty() {
            let properties = predicates
                .iter()
                .filter(|p| p.as_str() != RDF_TYPE)
                .cloned()
                .collect::<Vec<_>>();
            for m in &typed {
                check_properties(&star, m, &properties, catalogue)?;
            }
            log.debug(format_args!("Star {} is typed as {:?}", star.key, typed));
            selection.push(star, typed);
            continue;
        }

        if predicates.is_empty() {
            if !connections.participates(id) {
                free_stars.push(selection.stars.len());
            }
            selection.push(star, all_molecules.clone());
            continue;
        }

        let molecules = catalogue.molecules_for_predicates(&predicates);
        if !molecules.is_empty() {
            log.debug(format_args!(
                "Star {} may be answered by {:?}",
                star.key, molecules
            ));
            selection.push(star, molecules);
            continue;
        }

        let sub_stars = split_star(&star, &predicates, catalogue, prefixes)?;
        log.info(format_args!(
            "Star {} is split over molecules {}",
            star.key,
            sub_stars.iter().map(|(m, _)| m).join(", ")
        ));
        for (molecule, sub_star) in sub_stars {
            selection.push(sub_star, BTreeSet::from([molecule]));
        }
    }

    if !free_stars.is_empty() {
        log.debug(format_args!(
            "Stars {} have only variable predicates, every molecule is a candidate",
            free_stars
                .iter()
                .map(|i| selection.stars[*i].key.as_str())
                .join(", ")
        ));
    }

    Ok(selection)
}

/// Molecules named by the constant `rdf:type` objects of a star.
fn type_molecules(star: &Star, catalogue: &Catalogue, prefixes: &PrefixMap) -> BTreeSet<String> {
    star.triples
        .iter()
        .filter(|t| prefixes.is_type_predicate(&t.predicate))
        .filter_map(|t| prefixes.resolve_term(&t.object))
        .filter(|o| catalogue.molecule(o).is_some())
        .collect()
}

fn check_properties(
    star: &Star,
    molecule: &str,
    predicates: &[String],
    catalogue: &Catalogue,
) -> DecomposeResult<()> {
    let declared = catalogue.try_molecule(molecule)?;
    let missing = predicates
        .iter()
        .filter(|p| !declared.has_predicate(p))
        .cloned()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DecomposeError::OutsideFederation {
            star: star.key.clone(),
            molecule: molecule.to_string(),
            predicates: missing,
        })
    }
}

/// Splits a star no single molecule covers into sub stars, one per contributing molecule.
///
/// Every predicate goes to exactly one sub star. Molecules are picked greedily by the number
/// of still uncovered predicates they offer. Triples with a variable predicate go to the first
/// sub star.
fn split_star(
    star: &Star,
    predicates: &[String],
    catalogue: &Catalogue,
    prefixes: &PrefixMap,
) -> DecomposeResult<Vec<(String, Star)>> {
    let unsatisfiable = || DecomposeError::UnsatisfiableStar {
        star: star.key.clone(),
        predicates: predicates.to_vec(),
    };

    let per_molecule = catalogue.predicates_per_molecule(predicates);
    if per_molecule.is_empty() {
        return Err(unsatisfiable());
    }

    let mut remaining = predicates.iter().map(String::as_str).collect::<BTreeSet<_>>();
    let mut assignment = Vec::<(String, Vec<String>)>::new();
    while !remaining.is_empty() {
        let mut best: Option<(&String, usize)> = None;
        for (m, offered) in &per_molecule {
            let gain = offered
                .iter()
                .filter(|p| remaining.contains(p.as_str()))
                .count();
            if gain > best.map_or(0, |(_, g)| g) {
                best = Some((m, gain));
            }
        }
        let molecule = match best {
            Some((m, _)) => m,
            None => return Err(unsatisfiable()),
        };
        let assigned = per_molecule[molecule]
            .iter()
            .filter(|p| remaining.contains(p.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        for p in &assigned {
            remaining.remove(p.as_str());
        }
        assignment.push((molecule.clone(), assigned));
    }

    Ok(assignment
        .into_iter()
        .enumerate()
        .map(|(i, (molecule, assigned))| {
            let mut triples = star
                .triples_with_predicates(&assigned, prefixes)
                .cloned()
                .collect::<Vec<_>>();
            if i == 0 {
                triples.extend(star.variable_predicate_triples().cloned());
            }
            let sub_star = Star {
                key: format!("{}_{}", star.key, molecule),
                subject: star.subject.clone(),
                triples,
            };
            (molecule, sub_star)
        })
        .collect())
}

/// Partition based decomposition of the stars of a basic graph pattern.
///
/// Every molecule is a partition answered by its first wrapper. A triple whose predicate lives
/// in one partition is routed there, triples with several candidate partitions are grouped by
/// their candidate list.
pub(crate) fn decompose_partitioned(
    stars: &[Star],
    catalogue: &Catalogue,
    prefixes: &PrefixMap,
) -> DecomposeResult<Vec<PlanNode>> {
    let all_molecules = catalogue.molecule_names().collect::<Vec<_>>();
    let endpoint_of = |molecule: &str| -> String {
        catalogue
            .molecule(molecule)
            .and_then(|m| m.wrappers.first())
            .map(|w| w.url.clone())
            .unwrap_or_else(|| molecule.to_string())
    };

    let mut results = vec![];
    for star in stars {
        let mut routed = BTreeMap::<String, Vec<Triple>>::new();
        let mut shared = Vec::<(Vec<&str>, Vec<Triple>)>::new();

        for t in &star.triples {
            let candidates = match prefixes.resolve_term(&t.predicate) {
                Some(p) => {
                    let molecules = catalogue.molecules_for_predicate(&p);
                    if molecules.is_empty() {
                        return Err(DecomposeError::UnsatisfiableStar {
                            star: star.key.clone(),
                            predicates: vec![p],
                        });
                    }
                    molecules
                }
                None => all_molecules.clone(),
            };
            if candidates.is_empty() {
                return Err(DecomposeError::UnsatisfiableStar {
                    star: star.key.clone(),
                    predicates: star.constant_predicates(prefixes),
                });
            }

            if let [single] = candidates.as_slice() {
                routed
                    .entry(endpoint_of(single))
                    .or_default()
                    .push(t.clone());
                continue;
            }
            match shared.iter_mut().find(|(c, _)| *c == candidates) {
                Some((_, group)) => group.push(t.clone()),
                None => shared.push((candidates, vec![t.clone()])),
            }
        }

        results.extend(
            routed
                .into_iter()
                .map(|(endpoint, triples)| PlanNode::Service(Service::new(endpoint, triples))),
        );

        for (candidates, triples) in shared {
            let endpoints = candidates
                .iter()
                .map(|m| endpoint_of(m))
                .unique()
                .collect::<Vec<_>>();
            if let [endpoint] = endpoints.as_slice() {
                results.push(PlanNode::Service(Service::new(endpoint.clone(), triples)));
            } else {
                let branches = endpoints.into_iter().map(|endpoint| {
                    PlanNode::JoinBlock(JoinBlock::new(vec![PlanNode::Service(
                        Service::new(endpoint, triples.clone()),
                    )]))
                });
                results.push(PlanNode::UnionBlock(UnionBlock::new(branches)));
            }
        }
    }
    Ok(results)
}

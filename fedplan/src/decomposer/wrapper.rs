//! Covering a star with wrapper calls.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::ast::{JoinBlock, PlanNode, PrefixMap, Service, Triple, UnionBlock, RDF_TYPE};
use crate::catalogue::{Catalogue, Molecule, Wrapper};
use crate::decomposer::star::Star;
use crate::error::{DecomposeError, DecomposeResult};
use crate::session::PlanLog;

/// Wrapper calls answering one star.
///
/// Services are joined with the rest of the basic graph pattern, every union holds alternative
/// ways to answer part of the star.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct StarPlan {
    pub services: Vec<Service>,
    pub unions: Vec<UnionBlock>,
}

impl StarPlan {
    fn service(service: Service) -> Self {
        Self {
            services: vec![service],
            unions: vec![],
        }
    }
}

/// A union with one single service join block per endpoint.
fn alternatives<'a, I>(endpoints: I, triples: &BTreeSet<Triple>) -> UnionBlock
where
    I: IntoIterator<Item = &'a str>,
{
    UnionBlock::new(endpoints.into_iter().map(|url| {
        PlanNode::JoinBlock(JoinBlock::new(vec![PlanNode::Service(Service::new(
            url,
            triples.iter().cloned(),
        ))]))
    }))
}

/// Whether a wrapper of `molecule` answers a triple.
///
/// Type triples naming the molecule are answered by every wrapper of a molecule none of whose
/// wrappers lists the type predicate.
fn answers(molecule: &Molecule, wrapper: &Wrapper, t: &Triple, prefixes: &PrefixMap) -> bool {
    match prefixes.resolve_term(&t.predicate) {
        None => true,
        Some(p) if wrapper.serves(&p) => true,
        Some(p) => {
            p == RDF_TYPE
                && prefixes.resolve_term(&t.object).as_deref() == Some(molecule.root_type.as_str())
                && !molecule.wrappers.iter().any(|w| w.serves(RDF_TYPE))
        }
    }
}

fn unsatisfiable(star: &Star, prefixes: &PrefixMap) -> DecomposeError {
    DecomposeError::UnsatisfiableStar {
        star: star.key.clone(),
        predicates: star.constant_predicates(prefixes),
    }
}

pub(crate) fn decompose_star(
    star: &Star,
    molecules: &BTreeSet<String>,
    catalogue: &Catalogue,
    prefixes: &PrefixMap,
    log: &PlanLog,
) -> DecomposeResult<StarPlan> {
    let mut names = molecules.iter();
    match (names.next(), names.next()) {
        (None, _) => Err(unsatisfiable(star, prefixes)),
        (Some(name), None) => {
            let molecule = catalogue.try_molecule(name)?;
            single_molecule_cover(star, molecule, prefixes, log)
        }
        _ => meta_wrapper_decompose(star, molecules, catalogue, prefixes, log),
    }
}

/// Covers a star answered by one molecule.
///
/// A wrapper serving every predicate answers the whole star. Otherwise predicates served by
/// exactly one wrapper go to that wrapper, predicates served by several wrappers become a union
/// over those wrappers. A type triple served by several wrappers is sent along with the exclusive
/// predicates of those wrappers instead.
fn single_molecule_cover(
    star: &Star,
    molecule: &Molecule,
    prefixes: &PrefixMap,
    log: &PlanLog,
) -> DecomposeResult<StarPlan> {
    let triples = star.triples.iter().cloned().collect::<BTreeSet<_>>();
    let wrappers = &molecule.wrappers;

    if let [wrapper] = wrappers.as_slice() {
        return Ok(StarPlan::service(Service::new(&wrapper.url, triples)));
    }

    let full_cover = wrappers
        .iter()
        .filter(|w| star.triples.iter().all(|t| answers(molecule, w, t, prefixes)))
        .map(|w| w.url.as_str())
        .unique()
        .collect::<Vec<_>>();

    match full_cover.as_slice() {
        [] if wrappers.is_empty() => return Err(unsatisfiable(star, prefixes)),
        [] => {}
        [url] => return Ok(StarPlan::service(Service::new(*url, triples))),
        urls => {
            log.debug(format_args!(
                "Star {} is fully served by {}",
                star.key,
                urls.iter().join(", ")
            ));
            return Ok(StarPlan {
                services: vec![],
                unions: vec![alternatives(urls.iter().copied(), &triples)],
            });
        }
    }

    let mut groups = Vec::<(Vec<&str>, BTreeSet<Triple>, bool)>::new();
    for t in &star.triples {
        let servers = wrappers
            .iter()
            .filter(|w| answers(molecule, w, t, prefixes))
            .map(|w| w.url.as_str())
            .unique()
            .collect::<Vec<_>>();
        if servers.is_empty() {
            return Err(DecomposeError::UnsatisfiableStar {
                star: star.key.clone(),
                predicates: prefixes.resolve_term(&t.predicate).into_iter().collect(),
            });
        }
        let is_type = prefixes.is_type_predicate(&t.predicate);
        match groups.iter_mut().find(|(s, _, _)| *s == servers) {
            Some((_, group, only_type)) => {
                group.insert(t.clone());
                *only_type &= is_type;
            }
            None => groups.push((servers, BTreeSet::from([t.clone()]), is_type)),
        }
    }

    let mut services = Vec::<Service>::new();
    for (servers, group, _) in &groups {
        if let [url] = servers.as_slice() {
            match services.iter_mut().find(|s| s.endpoint == *url) {
                Some(service) => service.triples.extend(group.iter().cloned()),
                None => services.push(Service::new(*url, group.iter().cloned())),
            }
        }
    }

    let mut unions = vec![];
    for (servers, group, only_type) in groups {
        if servers.len() < 2 {
            continue;
        }
        let attachable = only_type
            && servers
                .iter()
                .any(|url| services.iter().any(|s| s.endpoint == *url));
        if attachable {
            for service in services
                .iter_mut()
                .filter(|s| servers.contains(&s.endpoint.as_str()))
            {
                service.triples.extend(group.iter().cloned());
            }
        } else {
            unions.push(alternatives(servers, &group));
        }
    }

    log.debug(format_args!(
        "Star {} is split over wrappers {} with {} shared parts",
        star.key,
        services.iter().map(|s| &s.endpoint).join(", "),
        unions.len()
    ));
    Ok(StarPlan { services, unions })
}

/// Covers a star whose candidates are several molecules.
///
/// Every wrapper of a candidate molecule serving some predicate of the star is relevant, with the
/// variable predicate triples of the star added to what it serves. A wrapper serving the whole
/// star answers it alone. When no two relevant wrappers share a triple, every wrapper is sent the
/// whole star as an alternative.
fn meta_wrapper_decompose(
    star: &Star,
    molecules: &BTreeSet<String>,
    catalogue: &Catalogue,
    prefixes: &PrefixMap,
    log: &PlanLog,
) -> DecomposeResult<StarPlan> {
    let all = star.triples.iter().cloned().collect::<BTreeSet<_>>();
    let only_variable_predicates = star.constant_predicates(prefixes).is_empty();

    let mut index = Vec::<(&str, BTreeSet<Triple>)>::new();
    for name in molecules {
        let molecule = catalogue.try_molecule(name)?;
        for wrapper in &molecule.wrappers {
            let mut served = star
                .triples
                .iter()
                .filter(|t| t.predicate.is_constant() && answers(molecule, wrapper, t, prefixes))
                .cloned()
                .collect::<BTreeSet<_>>();
            if served.is_empty() && !only_variable_predicates {
                continue;
            }
            served.extend(star.variable_predicate_triples().cloned());

            match index.iter_mut().find(|(url, _)| *url == wrapper.url) {
                Some((_, existing)) => existing.extend(served),
                None => index.push((wrapper.url.as_str(), served)),
            }
        }
    }

    match index.as_slice() {
        [] => return Err(unsatisfiable(star, prefixes)),
        [(url, _)] => return Ok(StarPlan::service(Service::new(*url, all))),
        _ => {}
    }

    if let Some(t) = star
        .triples
        .iter()
        .find(|t| index.iter().all(|(_, served)| !served.contains(*t)))
    {
        return Err(DecomposeError::UnsatisfiableStar {
            star: star.key.clone(),
            predicates: prefixes.resolve_term(&t.predicate).into_iter().collect(),
        });
    }

    let full_sources = index
        .iter()
        .filter(|(_, served)| served.len() == all.len())
        .map(|(url, _)| *url)
        .collect::<Vec<_>>();
    match full_sources.as_slice() {
        [] => {}
        [url] => return Ok(StarPlan::service(Service::new(*url, all))),
        urls => {
            log.debug(format_args!(
                "Star {} is fully served by {}",
                star.key,
                urls.iter().join(", ")
            ));
            return Ok(StarPlan {
                services: vec![],
                unions: vec![alternatives(urls.iter().copied(), &all)],
            });
        }
    }

    let overlapping = index
        .iter()
        .tuple_combinations()
        .any(|((_, a), (_, b))| !a.is_disjoint(b));
    if !overlapping {
        log.info(format_args!(
            "Wrappers {} share no triple of star {}, each is asked for the whole star",
            index.iter().map(|(url, _)| url).join(", "),
            star.key
        ));
        return Ok(StarPlan {
            services: vec![],
            unions: vec![alternatives(index.iter().map(|(url, _)| *url), &all)],
        });
    }

    let intersects = index
        .iter()
        .map(|(_, served)| served.clone())
        .reduce(|acc, served| &acc & &served)
        .unwrap_or_default();

    let mut plan = StarPlan::default();
    if intersects.is_empty() {
        let mut groups = Vec::<(Vec<&str>, BTreeSet<Triple>)>::new();
        for t in &star.triples {
            let servers = index
                .iter()
                .filter(|(_, served)| served.contains(t))
                .map(|(url, _)| *url)
                .collect::<Vec<_>>();
            match groups.iter_mut().find(|(s, _)| *s == servers) {
                Some((_, group)) => {
                    group.insert(t.clone());
                }
                None => groups.push((servers, BTreeSet::from([t.clone()]))),
            }
        }
        for (servers, group) in groups {
            match servers.as_slice() {
                [url] => match plan.services.iter_mut().find(|s| s.endpoint == *url) {
                    Some(service) => service.triples.extend(group),
                    None => plan.services.push(Service::new(*url, group)),
                },
                _ => plan.unions.push(alternatives(servers, &group)),
            }
        }
        return Ok(plan);
    }

    for (url, served) in &index {
        let exclusive = served - &intersects;
        if !exclusive.is_empty() {
            plan.services.push(Service::new(*url, exclusive));
        }
    }
    plan.unions.push(alternatives(index.iter().map(|(url, _)| *url), &intersects));
    Ok(plan)
}

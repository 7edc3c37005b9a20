use crate::ast::{PrefixMap, Term, Triple, RDF_TYPE};
use crate::catalogue::{Catalogue, Molecule, PredicateEntry, Wrapper};

pub const EX: &str = "http://ex.org/";

pub fn ex(local: &str) -> String {
    format!("{}{}", EX, local)
}

pub fn prefixes() -> PrefixMap {
    PrefixMap::new().with_prefix("ex", EX)
}

/// Reads a triple pattern written as three whitespace separated terms, `?x` being a variable.
pub fn triple(pattern: &str) -> Triple {
    let terms = pattern
        .split_whitespace()
        .map(|t| match t.strip_prefix('?') {
            Some(name) => Term::var(name),
            None => Term::constant(t),
        })
        .collect::<Vec<_>>();
    assert_eq!(3, terms.len(), "Not a triple pattern: {}", pattern);
    let mut terms = terms.into_iter();
    Triple::new(
        terms.next().unwrap(),
        terms.next().unwrap(),
        terms.next().unwrap(),
    )
}

pub fn triples(patterns: &[&str]) -> Vec<Triple> {
    patterns.iter().map(|p| triple(p)).collect()
}

pub fn wrapper(url: &str, predicates: &[&str]) -> Wrapper {
    Wrapper {
        url: url.to_string(),
        wrapper_type: "SPARQL_Endpoint".to_string(),
        predicates: predicates.iter().map(|p| p.to_string()).collect(),
    }
}

/// Molecule `ex:<name>` with `ex:` predicates, a range is written as `worksAt->Company`.
pub fn molecule(
    name: &str,
    linked_to: &[&str],
    predicates: &[&str],
    wrappers: Vec<Wrapper>,
) -> Molecule {
    Molecule {
        root_type: ex(name),
        linked_to: linked_to.iter().map(|l| ex(l)).collect(),
        predicates: predicates
            .iter()
            .map(|p| {
                let (p, range) = p.split_once("->").unwrap_or((*p, ""));
                PredicateEntry {
                    predicate: if p == "type" { RDF_TYPE.to_string() } else { ex(p) },
                    range: range
                        .split(',')
                        .filter(|r| !r.is_empty())
                        .map(ex)
                        .collect(),
                }
            })
            .collect(),
        wrappers,
    }
}

/// `Person` served by `http://w1`, `Company` served by `http://w2`; both offer `ex:name`.
pub fn company_person_catalogue() -> Catalogue {
    Catalogue::try_new(vec![
        molecule(
            "Person",
            &["Company"],
            &["type", "name", "worksAt->Company"],
            vec![wrapper(
                "http://w1",
                &[RDF_TYPE, ex("name").as_str(), ex("worksAt").as_str()],
            )],
        ),
        molecule(
            "Company",
            &[],
            &["type", "name", "founded"],
            vec![wrapper("http://w2", &[RDF_TYPE, ex("name").as_str(), ex("founded").as_str()])],
        ),
    ])
    .unwrap()
}

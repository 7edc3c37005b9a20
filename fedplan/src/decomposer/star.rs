//! Star shaped sub queries.

use itertools::Itertools;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::ast::{PrefixMap, Term, Triple};

pub type StarId = usize;

/// Triple patterns sharing one subject.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Star {
    /// Unique name of the star, the subject for stars taken from a query.
    pub key: String,
    pub subject: Term,
    pub triples: Vec<Triple>,
}

impl Star {
    /// Distinct expanded constant predicates, in order of first use.
    pub fn constant_predicates(&self, prefixes: &PrefixMap) -> Vec<String> {
        self.triples
            .iter()
            .filter_map(|t| prefixes.resolve_term(&t.predicate))
            .unique()
            .collect()
    }

    /// Triples whose predicate is a variable.
    pub fn variable_predicate_triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter().filter(|t| !t.predicate.is_constant())
    }

    /// Triples whose expanded predicate is one of `predicates`.
    pub fn triples_with_predicates<'a>(
        &'a self,
        predicates: &'a [String],
        prefixes: &'a PrefixMap,
    ) -> impl Iterator<Item = &'a Triple> {
        self.triples.iter().filter(move |t| {
            prefixes
                .resolve_term(&t.predicate)
                .map_or(false, |p| predicates.contains(&p))
        })
    }
}

/// Groups triples by subject, keeping the order in which subjects first appear.
///
/// Two triples with the same constant subject belong to the same star.
pub fn extract_stars(triples: &[Triple]) -> Vec<Star> {
    let mut stars: Vec<Star> = vec![];
    for t in triples {
        match stars.iter_mut().find(|s| s.subject == t.subject) {
            Some(star) => star.triples.push(t.clone()),
            None => stars.push(Star {
                key: t.subject.to_string(),
                subject: t.subject.clone(),
                triples: vec![t.clone()],
            }),
        }
    }
    stars
}

/// Edge `s -> c` when some triple of star `s` has the subject of star `c` as object.
///
/// Stars sharing a subject are never connected to each other.
#[derive(Debug, Default)]
pub struct StarConnections {
    graph: DiGraphMap<StarId, ()>,
}

impl StarConnections {
    pub fn build(stars: &[Star]) -> Self {
        let mut graph = DiGraphMap::new();
        for (id, star) in stars.iter().enumerate() {
            graph.add_node(id);
            for (other_id, other) in stars.iter().enumerate() {
                if other.subject == star.subject {
                    continue;
                }
                if star.triples.iter().any(|t| t.object == other.subject) {
                    graph.add_edge(id, other_id, ());
                }
            }
        }
        Self { graph }
    }

    /// Stars reachable from `star` through its objects.
    pub fn targets(&self, star: StarId) -> impl Iterator<Item = StarId> + '_ {
        self.graph.neighbors_directed(star, Direction::Outgoing)
    }

    /// Stars pointing to `star`.
    pub fn sources(&self, star: StarId) -> impl Iterator<Item = StarId> + '_ {
        self.graph.neighbors_directed(star, Direction::Incoming)
    }

    /// Whether `star` is connected to any other star, in either direction.
    pub fn participates(&self, star: StarId) -> bool {
        self.targets(star).next().is_some() || self.sources(star).next().is_some()
    }

    pub fn edges(&self) -> impl Iterator<Item = (StarId, StarId)> + '_ {
        self.graph.all_edges().map(|(s, c, _)| (s, c))
    }
}

//! Query and plan node model.
//!
//! The same tree is used for the parsed query handed to the decomposer and for the plan it
//! produces. A parsed query only contains [`PlanNode::Triple`] leaves, a decomposed plan only
//! contains [`PlanNode::Service`] leaves.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Debug, Formatter};

use derive_more::From;
use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use strum_macros::AsRefStr;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref WELL_KNOWN_PREFIXES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#");
        m.insert("rdfs", "http://www.w3.org/2000/01/rdf-schema#");
        m.insert("owl", "http://www.w3.org/2002/07/owl#");
        m.insert("xsd", "http://www.w3.org/2001/XMLSchema#");
        m
    };
}

/// A subject, predicate or object position of a triple pattern.
///
/// Variable names are stored without the leading `?`.
#[derive(
    Clone, Debug, derive_more::Display, PartialEq, Eq, Hash, PartialOrd, Ord, EnumAsInner,
)]
pub enum Term {
    #[display(fmt = "?{}", _0)]
    Variable(String),
    #[display(fmt = "{}", _0)]
    Constant(String),
}

impl Term {
    pub fn var<S: Into<String>>(name: S) -> Self {
        Term::Variable(name.into())
    }

    pub fn constant<S: Into<String>>(value: S) -> Self {
        Term::Constant(value.into())
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Term::Variable(name) => Some(name),
            Term::Constant(_) => None,
        }
    }
}

/// A triple pattern.
///
/// Equality and hashing are structural over the three positions. Triples never carry filters,
/// filters live on the [`Service`], [`JoinBlock`] and [`UnionBlock`] nodes they are placed on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter_map(Term::variable_name)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A filter expression together with its free variables.
///
/// The expression itself is opaque to planning.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Filter {
    pub expression: String,
    pub variables: BTreeSet<String>,
}

impl Filter {
    pub fn new<S, I, V>(expression: S, variables: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            expression: expression.into(),
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether all free variables of this filter are in `bound`.
    pub fn is_covered_by(&self, bound: &BTreeSet<String>) -> bool {
        self.variables.is_subset(bound)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "FILTER({})", self.expression)
    }
}

/// Send `triples` to the remote source at `endpoint`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Service {
    pub endpoint: String,
    pub triples: BTreeSet<Triple>,
    pub filters: Vec<Filter>,
}

impl Service {
    pub fn new<S, I>(endpoint: S, triples: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = Triple>,
    {
        Self {
            endpoint: endpoint.into(),
            triples: triples.into_iter().collect(),
            filters: vec![],
        }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        self.triples
            .iter()
            .flat_map(Triple::variables)
            .map(str::to_string)
            .collect()
    }
}

/// All children must be satisfied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct JoinBlock {
    pub children: Vec<PlanNode>,
    pub filters: Vec<Filter>,
}

impl JoinBlock {
    pub fn new<I: IntoIterator<Item = PlanNode>>(children: I) -> Self {
        Self {
            children: children.into_iter().collect(),
            filters: vec![],
        }
    }

    pub fn with_filters<I: IntoIterator<Item = Filter>>(mut self, filters: I) -> Self {
        self.filters.extend(filters);
        self
    }
}

/// Alternative ways of satisfying the same sub pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct UnionBlock {
    pub branches: Vec<PlanNode>,
    pub filters: Vec<Filter>,
}

impl UnionBlock {
    pub fn new<I: IntoIterator<Item = PlanNode>>(branches: I) -> Self {
        Self {
            branches: branches.into_iter().collect(),
            filters: vec![],
        }
    }

    pub fn with_filters<I: IntoIterator<Item = Filter>>(mut self, filters: I) -> Self {
        self.filters.extend(filters);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Optional {
    pub body: UnionBlock,
}

impl Optional {
    pub fn new(body: UnionBlock) -> Self {
        Self { body }
    }
}

/// One node of a query or plan tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumAsInner, AsRefStr, From)]
pub enum PlanNode {
    Triple(Triple),
    Optional(Optional),
    UnionBlock(UnionBlock),
    JoinBlock(JoinBlock),
    Service(Service),
}

impl PlanNode {
    /// Every variable mentioned anywhere below this node.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            PlanNode::Triple(t) => vars.extend(t.variables().map(str::to_string)),
            PlanNode::Service(s) => vars.extend(s.variables()),
            PlanNode::Optional(o) => o
                .body
                .branches
                .iter()
                .for_each(|b| b.collect_variables(vars)),
            PlanNode::UnionBlock(u) => {
                u.branches.iter().for_each(|b| b.collect_variables(vars))
            }
            PlanNode::JoinBlock(j) => {
                j.children.iter().for_each(|c| c.collect_variables(vars))
            }
        }
    }

    /// Filters attached to this node, `None` for nodes that can't carry filters.
    pub fn filters_mut(&mut self) -> Option<&mut Vec<Filter>> {
        match self {
            PlanNode::Service(s) => Some(&mut s.filters),
            PlanNode::JoinBlock(j) => Some(&mut j.filters),
            PlanNode::UnionBlock(u) => Some(&mut u.filters),
            PlanNode::Optional(_) | PlanNode::Triple(_) => None,
        }
    }

    pub fn filters(&self) -> &[Filter] {
        match self {
            PlanNode::Service(s) => &s.filters,
            PlanNode::JoinBlock(j) => &j.filters,
            PlanNode::UnionBlock(u) => &u.filters,
            PlanNode::Optional(o) => &o.body.filters,
            PlanNode::Triple(_) => &[],
        }
    }

    /// Leaf triples of this node, either query triples or triples routed to services.
    pub fn leaf_triples(&self) -> Vec<&Triple> {
        let mut triples = vec![];
        self.collect_triples(&mut triples);
        triples
    }

    fn collect_triples<'a>(&'a self, out: &mut Vec<&'a Triple>) {
        match self {
            PlanNode::Triple(t) => out.push(t),
            PlanNode::Service(s) => out.extend(s.triples.iter()),
            PlanNode::Optional(o) => o.body.branches.iter().for_each(|b| b.collect_triples(out)),
            PlanNode::UnionBlock(u) => u.branches.iter().for_each(|b| b.collect_triples(out)),
            PlanNode::JoinBlock(j) => j.children.iter().for_each(|c| c.collect_triples(out)),
        }
    }

    /// All service leaves, depth first.
    pub fn services(&self) -> Vec<&Service> {
        match self {
            PlanNode::Service(s) => vec![s],
            PlanNode::Triple(_) => vec![],
            PlanNode::Optional(o) => o.body.branches.iter().flat_map(Self::services).collect(),
            PlanNode::UnionBlock(u) => u.branches.iter().flat_map(Self::services).collect(),
            PlanNode::JoinBlock(j) => j.children.iter().flat_map(Self::services).collect(),
        }
    }
}

/// Renders an iterator of displayable items as `[a, b, c]` inside debug structs.
pub(crate) struct DisplayList<'a, T>(pub &'a [T]);

impl<'a, T: fmt::Display> Debug for DisplayList<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.as_ref());
        let filters = match self {
            PlanNode::Triple(t) => {
                s.field("triple", &format_args!("{}", t));
                &[][..]
            }
            PlanNode::Service(service) => {
                let triples = service.triples.iter().collect::<Vec<_>>();
                s.field("endpoint", &service.endpoint);
                s.field("triples", &DisplayList(&triples));
                &service.filters[..]
            }
            PlanNode::Optional(o) => &o.body.filters[..],
            PlanNode::UnionBlock(u) => &u.filters[..],
            PlanNode::JoinBlock(j) => &j.filters[..],
        };
        if !filters.is_empty() {
            s.field("filters", &DisplayList(filters));
        }
        s.finish()
    }
}

/// Prefix declarations of a query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefixMap {
    prefixes: HashMap<String, String>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix<P: Into<String>, N: Into<String>>(
        mut self,
        prefix: P,
        namespace: N,
    ) -> Self {
        self.insert(prefix, namespace);
        self
    }

    pub fn insert<P: Into<String>, N: Into<String>>(&mut self, prefix: P, namespace: N) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    /// Expands a constant written as `<iri>`, `prefix:local` or the keyword `a` into a bare IRI.
    ///
    /// Names with an undeclared prefix are returned unchanged.
    pub fn resolve(&self, name: &str) -> String {
        if name == "a" {
            return RDF_TYPE.to_string();
        }
        if let Some(iri) = name.strip_prefix('<').and_then(|n| n.strip_suffix('>')) {
            return iri.to_string();
        }
        if let Some((prefix, local)) = name.split_once(':') {
            if let Some(ns) = self.prefixes.get(prefix) {
                return format!("{}{}", ns, local);
            }
            if let Some(ns) = WELL_KNOWN_PREFIXES.get(prefix) {
                return format!("{}{}", ns, local);
            }
        }
        name.to_string()
    }

    /// Expanded IRI of a constant term, `None` for variables.
    pub fn resolve_term(&self, term: &Term) -> Option<String> {
        match term {
            Term::Constant(name) => Some(self.resolve(name)),
            Term::Variable(_) => None,
        }
    }

    pub fn is_type_predicate(&self, term: &Term) -> bool {
        self.resolve_term(term).as_deref() == Some(RDF_TYPE)
    }
}

/// A parsed query: its prefixes and a union of join blocks as body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub prefixes: PrefixMap,
    pub body: UnionBlock,
}

impl Query {
    pub fn new(prefixes: PrefixMap, body: UnionBlock) -> Self {
        Self { prefixes, body }
    }

    /// A query consisting of a single basic graph pattern.
    pub fn from_triples<I: IntoIterator<Item = Triple>>(prefixes: PrefixMap, triples: I) -> Self {
        let join = JoinBlock::new(triples.into_iter().map(PlanNode::Triple));
        Self::new(prefixes, UnionBlock::new(vec![PlanNode::JoinBlock(join)]))
    }
}

use anyhow::Context;
use fedplan::ast::{
    Filter, JoinBlock, Optional, PlanNode, PrefixMap, Query, Term, Triple, UnionBlock,
};
use fedplan::catalogue::Catalogue;
use fedplan::explain::explain_to_string;
use fedplan::{decompose, DecomposerOptions};
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::File;
use std::path::{Path, PathBuf};

pub const EX: &str = "http://ex.org/";

pub fn fixture_catalogue() -> Catalogue {
    Catalogue::from_json_file("resources/catalogue.json").unwrap()
}

pub fn prefixes() -> PrefixMap {
    PrefixMap::new().with_prefix("ex", EX)
}

/// Reads `s p o`, terms starting with `?` are variables.
pub fn triple(pattern: &str) -> Triple {
    let terms = pattern
        .split_whitespace()
        .map(|t| match t.strip_prefix('?') {
            Some(name) => Term::var(name),
            None => Term::constant(t),
        })
        .collect::<Vec<_>>();
    match <[Term; 3]>::try_from(terms) {
        Ok([s, p, o]) => Triple::new(s, p, o),
        Err(_) => panic!("Not a triple pattern: {}", pattern),
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterCase {
    pub expression: String,
    pub variables: Vec<String>,
}

/// One alternative of the query body.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BranchCase {
    pub triples: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default)]
    pub filters: Vec<FilterCase>,
}

impl BranchCase {
    fn to_join_block(&self) -> JoinBlock {
        let mut children = self
            .triples
            .iter()
            .map(|t| PlanNode::Triple(triple(t)))
            .collect::<Vec<_>>();
        if !self.optional.is_empty() {
            let body = JoinBlock::new(self.optional.iter().map(|t| PlanNode::Triple(triple(t))));
            children.push(PlanNode::Optional(Optional::new(UnionBlock::new(vec![
                PlanNode::JoinBlock(body),
            ]))));
        }
        JoinBlock::new(children).with_filters(
            self.filters
                .iter()
                .map(|f| Filter::new(f.expression.clone(), f.variables.clone())),
        )
    }
}

#[derive(Deserialize)]
pub struct TestCase {
    pub name: String,
    pub branches: Vec<BranchCase>,
    #[serde(default)]
    pub options: Option<DecomposerOptions>,
    #[serde(default)]
    pub expected_plan: Option<String>,
    #[serde(default)]
    pub expected_error: Option<String>,
}

impl TestCase {
    pub fn to_query(&self) -> Query {
        let body = UnionBlock::new(
            self.branches
                .iter()
                .map(|b| PlanNode::JoinBlock(b.to_join_block())),
        );
        Query::new(prefixes(), body)
    }
}

pub struct TestCaseRunner {
    /// Input file path.
    pub paths: Vec<PathBuf>,
    pub catalogue: Catalogue,
}

impl TestCaseRunner {
    pub fn run(self) {
        for path in &self.paths {
            let file = File::options()
                .read(true)
                .open(&path)
                .with_context(|| format!("Failed to open test case file: {:?}", &path))
                .unwrap();

            let test_cases: Vec<TestCase> = serde_yaml::from_reader(file)
                .with_context(|| format!("Failed to load test cases from file: {:?}", &path))
                .unwrap();

            for test_case in test_cases {
                self.run_case(&path, test_case);
            }
        }
    }

    fn run_case<P: AsRef<Path> + Debug>(&self, path: &P, test_case: TestCase) {
        let options = test_case.options.clone().unwrap_or_default();
        let result = decompose(&test_case.to_query(), &self.catalogue, &options);

        match (&test_case.expected_error, result) {
            (Some(expected), Err(e)) => assert!(
                format!("{:?}", e).starts_with(expected.as_str()),
                "Case {} in {:?} failed with {:?} instead of {}",
                test_case.name,
                path,
                e,
                expected
            ),
            (Some(expected), Ok(plan)) => panic!(
                "Case {} in {:?} should fail with {} but planned {:?}",
                test_case.name, path, expected, plan
            ),
            (None, Err(e)) => panic!("Case {} in {:?} failed: {:?}", test_case.name, path, e),
            (None, Ok(plan)) => {
                let plan_string = plan
                    .as_ref()
                    .map(|p| explain_to_string(p).unwrap());
                assert_eq!(
                    test_case.expected_plan, plan_string,
                    "Plan for {} in {:?} is different.",
                    test_case.name, path
                );
            }
        }
    }
}

//! Placement of filters on decomposed plan fragments.

use std::collections::BTreeSet;

use crate::ast::{Filter, PlanNode};

/// Variables bound by every answer of `node`.
///
/// Optional parts never count as bound, a union only binds what all of its branches bind.
pub fn bound_variables(node: &PlanNode) -> BTreeSet<String> {
    match node {
        PlanNode::Triple(t) => t.variables().map(str::to_string).collect(),
        PlanNode::Service(s) => s.variables(),
        PlanNode::Optional(_) => BTreeSet::new(),
        PlanNode::JoinBlock(j) => j
            .children
            .iter()
            .filter(|c| !matches!(c, PlanNode::Optional(_)))
            .flat_map(bound_variables)
            .collect(),
        PlanNode::UnionBlock(u) => u
            .branches
            .iter()
            .map(bound_variables)
            .reduce(|acc, b| &acc & &b)
            .unwrap_or_default(),
    }
}

/// Attaches `filter` to the smallest node under `node` binding all of its variables.
///
/// The filter is handed back when no node qualifies. Filters are never pushed into optional
/// parts, nor into a single branch of a union with several branches.
fn place(node: &mut PlanNode, filter: Filter) -> Result<(), Filter> {
    let bound = bound_variables(node);
    if !filter.is_covered_by(&bound) {
        return Err(filter);
    }

    match node {
        PlanNode::Service(s) => {
            s.filters.push(filter);
            Ok(())
        }
        PlanNode::JoinBlock(j) => {
            let mut filter = filter;
            for child in j.children.iter_mut() {
                match place(child, filter) {
                    Ok(()) => return Ok(()),
                    Err(f) => filter = f,
                }
            }
            j.filters.push(filter);
            Ok(())
        }
        PlanNode::UnionBlock(u) => {
            let filter = match u.branches.as_mut_slice() {
                [branch] => match place(branch, filter) {
                    Ok(()) => return Ok(()),
                    Err(f) => f,
                },
                _ => filter,
            };
            u.filters.push(filter);
            Ok(())
        }
        PlanNode::Optional(_) | PlanNode::Triple(_) => Err(filter),
    }
}

/// Places each filter on the first fragment able to take it, smallest covering node first.
///
/// Returns the filters no fragment binds all variables of, in their original order.
pub fn place_filters(fragments: &mut [PlanNode], filters: Vec<Filter>) -> Vec<Filter> {
    let mut unplaced = vec![];
    'filters: for filter in filters {
        let mut filter = filter;
        for fragment in fragments.iter_mut() {
            match place(fragment, filter) {
                Ok(()) => continue 'filters,
                Err(f) => filter = f,
            }
        }
        unplaced.push(filter);
    }
    unplaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{JoinBlock, Optional, Service, UnionBlock};
    use crate::test_utils::triples;
    use maplit::btreeset;

    fn service(url: &str, patterns: &[&str]) -> PlanNode {
        PlanNode::Service(Service::new(url, triples(patterns)))
    }

    fn filter(expression: &str, variables: &[&str]) -> Filter {
        Filter::new(expression, variables.iter().copied())
    }

    #[test]
    fn test_bound_variables() {
        let node = PlanNode::JoinBlock(JoinBlock::new(vec![
            service("http://w1", &["?s ex:name ?n"]),
            PlanNode::UnionBlock(UnionBlock::new(vec![
                service("http://w1", &["?s ex:age ?a", "?s ex:mail ?m"]),
                service("http://w2", &["?s ex:age ?a"]),
            ])),
            PlanNode::Optional(Optional::new(UnionBlock::new(vec![service(
                "http://w3",
                &["?s ex:phone ?p"],
            )]))),
        ]));

        assert_eq!(
            btreeset!["a".to_string(), "n".to_string(), "s".to_string()],
            bound_variables(&node)
        );
    }

    #[test]
    fn test_place_on_smallest_node() {
        let mut fragments = vec![
            service("http://w1", &["?s ex:name ?n"]),
            service("http://w2", &["?c ex:name ?cn"]),
        ];

        let unplaced = place_filters(
            &mut fragments,
            vec![filter("?cn != ?n", &["cn", "n"]), filter("?cn = \"x\"", &["cn"])],
        );

        assert_eq!(vec![filter("?cn != ?n", &["cn", "n"])], unplaced);
        assert!(fragments[0].filters().is_empty());
        assert_eq!(&[filter("?cn = \"x\"", &["cn"])], fragments[1].filters());
    }

    #[test]
    fn test_place_on_join() {
        let mut fragments = vec![PlanNode::JoinBlock(JoinBlock::new(vec![
            service("http://w1", &["?s ex:name ?n"]),
            service("http://w2", &["?s ex:age ?a"]),
        ]))];

        let unplaced = place_filters(&mut fragments, vec![filter("?a > ?n", &["a", "n"])]);

        assert!(unplaced.is_empty());
        let join = fragments[0].as_join_block().unwrap();
        assert_eq!(vec![filter("?a > ?n", &["a", "n"])], join.filters);
        assert!(join.children.iter().all(|c| c.filters().is_empty()));
    }

    #[test]
    fn test_place_on_union() {
        let mut fragments = vec![PlanNode::UnionBlock(UnionBlock::new(vec![
            PlanNode::JoinBlock(JoinBlock::new(vec![service("http://w1", &["?s ex:age ?a"])])),
            PlanNode::JoinBlock(JoinBlock::new(vec![service("http://w2", &["?s ex:age ?a"])])),
        ]))];

        let unplaced = place_filters(&mut fragments, vec![filter("?a > 3", &["a"])]);

        assert!(unplaced.is_empty());
        assert_eq!(&[filter("?a > 3", &["a"])], fragments[0].filters());
        assert!(fragments[0]
            .services()
            .iter()
            .all(|s| s.filters.is_empty()));
    }

    #[test]
    fn test_never_place_in_optional() {
        let mut fragments = vec![PlanNode::Optional(Optional::new(UnionBlock::new(vec![
            service("http://w1", &["?s ex:age ?a"]),
        ])))];

        let unplaced = place_filters(&mut fragments, vec![filter("?a > 3", &["a"])]);

        assert_eq!(1, unplaced.len());
    }
}

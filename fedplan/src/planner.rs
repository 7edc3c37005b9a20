//! Plan assembly.
//!
//! Decomposed join blocks are turned into join trees by a [`JoinTreeBuilder`]. Optional parts
//! stay outside of the tree and are joined with it afterwards, union branches are planned one by
//! one and never reordered.

use std::collections::BTreeSet;

use itertools::Itertools;

use crate::ast::{Filter, JoinBlock, Optional, PlanNode, UnionBlock};
use crate::filter::bound_variables;

/// Orders the fragments of a join block.
///
/// Implementations must keep every fragment and every filter exactly once.
pub trait JoinTreeBuilder {
    fn build_join_tree(&self, fragments: Vec<PlanNode>, filters: Vec<Filter>) -> JoinBlock;
}

/// Repeatedly joins the two fragments sharing the most variables.
#[derive(Copy, Clone, Debug, Default)]
pub struct BushyTreeBuilder;

impl JoinTreeBuilder for BushyTreeBuilder {
    fn build_join_tree(&self, fragments: Vec<PlanNode>, filters: Vec<Filter>) -> JoinBlock {
        let mut fragments = fragments;
        while fragments.len() > 2 {
            let variables = fragments.iter().map(PlanNode::variables).collect::<Vec<_>>();
            let mut best = (0, 1, 0);
            for (i, j) in (0..fragments.len()).tuple_combinations() {
                let shared = variables[i].intersection(&variables[j]).count();
                if shared > best.2 {
                    best = (i, j, shared);
                }
            }

            let (i, j, _) = best;
            let right = fragments.remove(j);
            let left = fragments.remove(i);
            fragments.insert(i, PlanNode::JoinBlock(JoinBlock::new(vec![left, right])));
        }
        JoinBlock::new(fragments).with_filters(filters)
    }
}

pub struct PlanAssembler<'b> {
    builder: &'b dyn JoinTreeBuilder,
}

impl<'b> PlanAssembler<'b> {
    pub fn new(builder: &'b dyn JoinTreeBuilder) -> Self {
        Self { builder }
    }

    pub fn plan_union_block(&self, union: UnionBlock) -> UnionBlock {
        let UnionBlock {
            mut branches,
            mut filters,
        } = union;

        if let [branch] = branches.as_mut_slice() {
            if let Some(target) = branch.filters_mut() {
                target.append(&mut filters);
            }
        }

        let branches = branches
            .into_iter()
            .map(|branch| {
                let join = match branch {
                    PlanNode::JoinBlock(j) => j,
                    other => JoinBlock::new(vec![other]),
                };
                PlanNode::JoinBlock(self.plan_join_block(join))
            })
            .collect::<Vec<_>>();

        UnionBlock { branches, filters }
    }

    pub fn plan_join_block(&self, join: JoinBlock) -> JoinBlock {
        let JoinBlock {
            mut children,
            filters,
        } = join;

        let mut remaining = vec![];
        for filter in filters {
            let target = children.iter().position(|c| {
                !matches!(c, PlanNode::Optional(_) | PlanNode::Triple(_))
                    && filter.is_covered_by(&bound_variables(c))
            });
            let target = match target {
                Some(i) => children[i].filters_mut(),
                None => None,
            };
            match target {
                Some(target) => target.push(filter),
                None => remaining.push(filter),
            }
        }

        let mut fragments = vec![];
        let mut optionals = vec![];
        for child in children {
            match child {
                PlanNode::Optional(o) => optionals.push(PlanNode::Optional(Optional::new(
                    self.plan_union_block(o.body),
                ))),
                PlanNode::UnionBlock(u) => {
                    fragments.push(PlanNode::UnionBlock(self.plan_union_block(u)))
                }
                PlanNode::JoinBlock(j) => {
                    fragments.push(PlanNode::JoinBlock(self.plan_join_block(j)))
                }
                leaf @ (PlanNode::Service(_) | PlanNode::Triple(_)) => fragments.push(leaf),
            }
        }

        if optionals.is_empty() {
            return self.builder.build_join_tree(fragments, remaining);
        }

        let bound = fragments
            .iter()
            .flat_map(bound_variables)
            .collect::<BTreeSet<_>>();
        let (inner, outer): (Vec<_>, Vec<_>) = if fragments.is_empty() {
            (vec![], remaining)
        } else {
            remaining.into_iter().partition(|f| f.is_covered_by(&bound))
        };

        let mut children = vec![];
        if !fragments.is_empty() {
            children.push(PlanNode::JoinBlock(
                self.builder.build_join_tree(fragments, inner),
            ));
        }
        children.extend(optionals);
        JoinBlock::new(children).with_filters(outer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Service;
    use crate::test_utils::triples;

    fn service(url: &str, patterns: &[&str]) -> PlanNode {
        PlanNode::Service(Service::new(url, triples(patterns)))
    }

    fn filter(expression: &str, variables: &[&str]) -> Filter {
        Filter::new(expression, variables.iter().copied())
    }

    #[test]
    fn test_bushy_tree_joins_connected_fragments_first() {
        let a = service("http://w1", &["?s ex:name ?n"]);
        let b = service("http://w2", &["?x ex:label ?l"]);
        let c = service("http://w3", &["?s ex:knows ?x", "?s ex:mail ?n"]);

        let tree = BushyTreeBuilder.build_join_tree(
            vec![a.clone(), b.clone(), c.clone()],
            vec![filter("?n != ?l", &["n", "l"])],
        );

        assert_eq!(
            JoinBlock::new(vec![
                PlanNode::JoinBlock(JoinBlock::new(vec![a, c])),
                b,
            ])
            .with_filters(vec![filter("?n != ?l", &["n", "l"])]),
            tree
        );
    }

    #[test]
    fn test_bushy_tree_keeps_small_blocks() {
        let a = service("http://w1", &["?s ex:name ?n"]);
        let b = service("http://w2", &["?x ex:label ?l"]);

        let tree = BushyTreeBuilder.build_join_tree(vec![a.clone(), b.clone()], vec![]);

        assert_eq!(JoinBlock::new(vec![a, b]), tree);
    }

    #[test]
    fn test_filters_stay_outside_optionals() {
        let required = service("http://w1", &["?s ex:name ?n"]);
        let optional = PlanNode::Optional(Optional::new(UnionBlock::new(vec![
            PlanNode::JoinBlock(JoinBlock::new(vec![service("http://w2", &["?s ex:age ?a"])])),
        ])));
        let join = JoinBlock::new(vec![required.clone(), optional.clone()]).with_filters(vec![
            filter("?n = \"x\"", &["n"]),
            filter("!bound(?a)", &["a"]),
        ]);

        let planned = PlanAssembler::new(&BushyTreeBuilder).plan_join_block(join);

        let mut filtered = Service::new("http://w1", triples(&["?s ex:name ?n"]));
        filtered.filters.push(filter("?n = \"x\"", &["n"]));
        assert_eq!(
            JoinBlock::new(vec![
                PlanNode::JoinBlock(JoinBlock::new(vec![PlanNode::Service(filtered)])),
                optional,
            ])
            .with_filters(vec![filter("!bound(?a)", &["a"])]),
            planned
        );
    }

    #[test]
    fn test_single_branch_union_hands_filters_down() {
        let union = UnionBlock::new(vec![PlanNode::JoinBlock(JoinBlock::new(vec![
            service("http://w1", &["?s ex:name ?n"]),
            service("http://w2", &["?s ex:age ?a"]),
        ]))])
        .with_filters(vec![filter("?a > 3", &["a"])]);

        let planned = PlanAssembler::new(&BushyTreeBuilder).plan_union_block(union);

        assert!(planned.filters.is_empty());
        let services = PlanNode::UnionBlock(planned.clone())
            .services()
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(vec![filter("?a > 3", &["a"])], services[1].filters);
        assert!(services[0].filters.is_empty());
    }
}

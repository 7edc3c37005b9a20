//! Decomposition of query blocks into service calls.
//!
//! Each basic graph pattern is split into stars, every star gets candidate molecules which are
//! then narrowed through the connections between stars, and finally each star is covered by calls
//! to the wrappers of its molecules.

mod merge;
mod prune;
mod selection;
pub mod star;
mod wrapper;

use std::collections::BTreeSet;

use crate::ast::{JoinBlock, Optional, PlanNode, PrefixMap, Triple, UnionBlock};
use crate::catalogue::Catalogue;
use crate::error::DecomposeResult;
use crate::filter::{bound_variables, place_filters};
use crate::options::{DecomposerOptions, SourceSelectionMode};
use crate::session::PlanLog;

use merge::merge_same_endpoint;
use prune::prune_molecules;
use selection::{decompose_partitioned, select_sources, SourceSelection};
use star::{extract_stars, StarConnections};
use wrapper::decompose_star;

pub(crate) struct Decomposer<'a> {
    catalogue: &'a Catalogue,
    prefixes: &'a PrefixMap,
    options: &'a DecomposerOptions,
    log: &'a PlanLog,
}

impl<'a> Decomposer<'a> {
    pub fn new(
        catalogue: &'a Catalogue,
        prefixes: &'a PrefixMap,
        options: &'a DecomposerOptions,
        log: &'a PlanLog,
    ) -> Self {
        Self {
            catalogue,
            prefixes,
            options,
            log,
        }
    }

    /// Decomposes every branch, `None` when no branch has anything left.
    pub fn decompose_union_block(&self, union: &UnionBlock) -> DecomposeResult<Option<UnionBlock>> {
        let mut branches = vec![];
        for branch in &union.branches {
            let decomposed = match branch {
                PlanNode::JoinBlock(j) => self.decompose_join_block(j)?,
                other => self.decompose_join_block(&JoinBlock::new(vec![other.clone()]))?,
            };
            if let Some(join) = decomposed {
                branches.push(PlanNode::JoinBlock(join));
            }
        }

        if branches.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            UnionBlock::new(branches).with_filters(union.filters.iter().cloned()),
        ))
    }

    /// Decomposes the triples of a join block and its nested blocks, then places its filters.
    ///
    /// Services written in the query are kept as they are.
    pub fn decompose_join_block(&self, join: &JoinBlock) -> DecomposeResult<Option<JoinBlock>> {
        let mut triples = vec![];
        let mut nested = vec![];
        for child in &join.children {
            match child {
                PlanNode::Triple(t) => triples.push(t.clone()),
                PlanNode::Service(s) => nested.push(PlanNode::Service(s.clone())),
                PlanNode::Optional(o) => {
                    if let Some(body) = self.decompose_union_block(&o.body)? {
                        nested.push(PlanNode::Optional(Optional::new(body)));
                    }
                }
                PlanNode::UnionBlock(u) => {
                    if let Some(u) = self.decompose_union_block(u)? {
                        nested.push(PlanNode::UnionBlock(u));
                    }
                }
                PlanNode::JoinBlock(j) => {
                    if let Some(j) = self.decompose_join_block(j)? {
                        nested.push(PlanNode::JoinBlock(j));
                    }
                }
            }
        }

        let mut fragments = if triples.is_empty() {
            vec![]
        } else {
            self.decompose_bgp(&triples)?
        };
        fragments.extend(nested);
        if fragments.is_empty() {
            return Ok(None);
        }

        let unplaced = place_filters(&mut fragments, join.filters.clone());
        if !unplaced.is_empty() {
            let bound = fragments
                .iter()
                .flat_map(bound_variables)
                .collect::<BTreeSet<_>>();
            for filter in unplaced.iter().filter(|f| !f.is_covered_by(&bound)) {
                self.log.warn(format_args!(
                    "{} uses variables not bound by its block, it is kept on the enclosing join",
                    filter
                ));
            }
        }

        if let [PlanNode::UnionBlock(u)] = fragments.as_mut_slice() {
            u.filters.extend(unplaced);
            return Ok(Some(JoinBlock::new(fragments)));
        }
        Ok(Some(JoinBlock::new(fragments).with_filters(unplaced)))
    }

    /// Decomposes a basic graph pattern into services followed by unions of alternatives.
    pub fn decompose_bgp(&self, triples: &[Triple]) -> DecomposeResult<Vec<PlanNode>> {
        let stars = extract_stars(triples);

        if self.options.source_selection_mode == SourceSelectionMode::PartitionBased {
            let fragments = decompose_partitioned(&stars, self.catalogue, self.prefixes)?;
            self.log.debug(format_args!(
                "Partitioned {} stars into {} fragments",
                stars.len(),
                fragments.len()
            ));
            return Ok(fragments);
        }

        let SourceSelection { stars, candidates } =
            select_sources(stars, self.catalogue, self.prefixes, self.log)?;
        let connections = StarConnections::build(&stars);
        let molecules = prune_molecules(
            &stars,
            &connections,
            &candidates,
            self.catalogue,
            self.prefixes,
            self.log,
        );

        let mut services = vec![];
        let mut unions = vec![];
        for (star, molecules) in stars.iter().zip(&molecules) {
            let plan = decompose_star(star, molecules, self.catalogue, self.prefixes, self.log)?;
            services.extend(plan.services);
            unions.extend(plan.unions);
        }

        if !self.options.join_locally {
            let before = services.len();
            services = merge_same_endpoint(services);
            self.log.debug(format_args!(
                "Merged {} services into {} endpoint calls",
                before,
                services.len()
            ));
        }

        Ok(services
            .into_iter()
            .map(PlanNode::Service)
            .chain(unions.into_iter().map(PlanNode::UnionBlock))
            .collect())
    }
}

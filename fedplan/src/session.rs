//! Decomposition entry point.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

use crate::ast::{PlanNode, Query};
use crate::catalogue::Catalogue;
use crate::decomposer::Decomposer;
use crate::error::DecomposeResult;
use crate::explain::explain_to_string;
use crate::options::DecomposerOptions;
use crate::planner::{BushyTreeBuilder, JoinTreeBuilder, PlanAssembler};

pub const LOG_TARGET: &str = "fedplan::decomposer";

/// Where a session writes its records.
#[derive(Clone, Default)]
pub enum PlanLog {
    /// The process wide logger installed through the `log` crate.
    #[default]
    Global,
    Sink(Arc<dyn Log>),
}

impl Debug for PlanLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PlanLog::Global => write!(f, "Global"),
            PlanLog::Sink(_) => write!(f, "Sink"),
        }
    }
}

impl PlanLog {
    pub fn enabled(&self, level: Level) -> bool {
        let metadata = Metadata::builder().level(level).target(LOG_TARGET).build();
        match self {
            PlanLog::Global => level <= log::max_level() && log::logger().enabled(&metadata),
            PlanLog::Sink(sink) => sink.enabled(&metadata),
        }
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        let record = Record::builder()
            .level(level)
            .target(LOG_TARGET)
            .module_path_static(Some(module_path!()))
            .args(args)
            .build();
        match self {
            PlanLog::Global => log::logger().log(&record),
            PlanLog::Sink(sink) => sink.log(&record),
        }
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args)
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args)
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args)
    }
}

/// Decomposes queries against one catalogue.
///
/// The catalogue is borrowed for the lifetime of the session, a reload never affects a running
/// session.
pub struct DecompositionSession<'c> {
    catalogue: &'c Catalogue,
    options: DecomposerOptions,
    join_tree_builder: Box<dyn JoinTreeBuilder + Send + Sync>,
    log: PlanLog,
}

impl<'c> DecompositionSession<'c> {
    pub fn new(catalogue: &'c Catalogue, options: DecomposerOptions) -> Self {
        Self {
            catalogue,
            options,
            join_tree_builder: Box::new(BushyTreeBuilder),
            log: PlanLog::Global,
        }
    }

    pub fn with_join_tree_builder<B>(mut self, builder: B) -> Self
    where
        B: JoinTreeBuilder + Send + Sync + 'static,
    {
        self.join_tree_builder = Box::new(builder);
        self
    }

    /// Sends the records of this session to `logger` instead of the global logger.
    pub fn with_logger(mut self, logger: Arc<dyn Log>) -> Self {
        self.log = PlanLog::Sink(logger);
        self
    }

    pub fn options(&self) -> &DecomposerOptions {
        &self.options
    }

    /// Decomposes and plans `query`.
    ///
    /// Returns `Ok(None)` when the query body decomposes to nothing, which is an empty answer and
    /// not a failure. Any failing star fails the whole query.
    pub fn decompose(&self, query: &Query) -> DecomposeResult<Option<PlanNode>> {
        let decomposer = Decomposer::new(self.catalogue, &query.prefixes, &self.options, &self.log);
        let decomposed = match decomposer.decompose_union_block(&query.body)? {
            Some(union) => union,
            None => {
                self.log
                    .info(format_args!("Query body decomposed to no fragments"));
                return Ok(None);
            }
        };

        let assembler = PlanAssembler::new(self.join_tree_builder.as_ref());
        let plan = PlanNode::UnionBlock(assembler.plan_union_block(decomposed));

        if self.log.enabled(Level::Debug) {
            match explain_to_string(&plan) {
                Ok(explained) => self.log.debug(format_args!("Decomposed plan:\n{}", explained)),
                Err(e) => self.log.warn(format_args!("Failed to explain plan: {}", e)),
            }
        }
        Ok(Some(plan))
    }
}

/// Decomposes `query` with the default join tree builder and the global logger.
pub fn decompose(
    query: &Query,
    catalogue: &Catalogue,
    options: &DecomposerOptions,
) -> DecomposeResult<Option<PlanNode>> {
    DecompositionSession::new(catalogue, options.clone()).decompose(query)
}

use std::sync::Arc;

use super::constant_pool::ConstantPools;
use super::event_array::EventArrays;
use super::repository::RepositoryBuilder;
use super::sink::{EventSinkFactory, ParserExtension};
use super::stats::{ParserStats, StatsSnapshot};

/// State shared by every chunk of one parse session.
///
/// Extensions are chained in front of the repository so that
/// `extensions[0]` sees decoded rows first and the repository last.
pub struct LoaderContext {
    extension_names: Vec<String>,
    hide_experimentals: bool,
    repository: Arc<RepositoryBuilder>,
    sink_factory: Box<dyn EventSinkFactory>,
    stats: ParserStats,
    constant_pools: ConstantPools,
}

impl LoaderContext {
    pub fn new(extensions: &[Arc<dyn ParserExtension>], hide_experimentals: bool) -> Self {
        let repository = Arc::new(RepositoryBuilder::new());
        let mut sink_factory: Box<dyn EventSinkFactory> = Box::new(repository.clone());
        for extension in extensions.iter().rev() {
            sink_factory = extension.wrap(sink_factory);
        }
        Self {
            extension_names: extensions.iter().map(|e| e.name().to_string()).collect(),
            hide_experimentals,
            repository,
            sink_factory,
            stats: ParserStats::new(),
            constant_pools: ConstantPools::new(),
        }
    }

    pub fn sink_factory(&self) -> &dyn EventSinkFactory {
        self.sink_factory.as_ref()
    }

    pub fn repository(&self) -> &RepositoryBuilder {
        &self.repository
    }

    pub fn hide_experimentals(&self) -> bool {
        self.hide_experimentals
    }

    pub fn extension_names(&self) -> &[String] {
        &self.extension_names
    }

    pub fn stats(&self) -> &ParserStats {
        &self.stats
    }

    pub fn constant_pools(&self) -> &ConstantPools {
        &self.constant_pools
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot(self.constant_pools.sizes())
    }

    /// Flush the extension chain and finalize every schema, empty ones
    /// included. Calling this again returns the same arrays.
    pub fn build_event_arrays(&self) -> EventArrays {
        self.sink_factory.flush();
        self.repository.build_event_arrays()
    }
}

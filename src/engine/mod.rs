//! Asynchronous gather-apply-scatter engine.
//!
//! The engine borrows an immutable graph, seeds an active set, and drives a
//! fixed worker pool to quiescence. Each execution holds exclusive access to
//! the vertex's closed neighbourhood, so user code never observes concurrent
//! mutation of data it can reach.

pub(crate) mod context;
mod executor;
mod scheduler;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, error};

use crate::error::{EngineError, Result};
use crate::graph::Graph;
use crate::model::VertexId;
use crate::program::VertexProgram;
use crate::spm::{Scratchpad, SpmManager};

pub use context::{Context, EdgeView, VertexView};
use scheduler::Scheduler;

/// Default scratchpad capacity in bytes.
pub const DEFAULT_SPM_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size.
    pub num_threads: usize,
    /// How many iterations ahead of the current GAS step data is prefetched.
    pub load_ahead_distance: usize,
    /// Enables the gather cache and the `post_delta` path.
    pub enable_caching: bool,
    /// Scratchpad capacity in bytes; must be a multiple of the word size.
    pub spm_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_threads: 2,
            load_ahead_distance: 8,
            enable_caching: false,
            spm_size: DEFAULT_SPM_SIZE,
        }
    }
}

/// Monotonic counter snapshot for tests and observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub spm_hits: u64,
    pub spm_misses: u64,
    pub num_failed_loads: u64,
}

pub(crate) struct CacheSlot<G> {
    pub value: G,
    pub valid: bool,
}

/// The engine. Generic over the vertex program; the graph's data types are
/// fixed by the program's associated types.
pub struct Engine<'g, P: VertexProgram> {
    pub(crate) graph: &'g Graph<P::VertexData, P::EdgeData>,
    pub(crate) config: EngineConfig,
    pub(crate) sched: Scheduler,
    pub(crate) spm: SpmManager,
    pub(crate) cache: Box<[Mutex<CacheSlot<P::Gather>>]>,
    pub(crate) spm_hits: AtomicU64,
    pub(crate) spm_misses: AtomicU64,
    first_error: Mutex<Option<EngineError>>,
}

impl<'g, P: VertexProgram> Engine<'g, P> {
    pub fn new(graph: &'g Graph<P::VertexData, P::EdgeData>, config: EngineConfig) -> Result<Self> {
        if config.num_threads == 0 {
            return Err(EngineError::InvalidArgument("num_threads must be at least 1"));
        }
        let spm = SpmManager::new(Scratchpad::new(config.spm_size)?)?;
        let cache = (0..graph.num_vertices())
            .map(|_| {
                Mutex::new(CacheSlot {
                    value: P::Gather::default(),
                    valid: false,
                })
            })
            .collect();
        let sched = Scheduler::new(graph.num_vertices(), config.num_threads);
        Ok(Self {
            graph,
            config,
            sched,
            spm,
            cache,
            spm_hits: AtomicU64::new(0),
            spm_misses: AtomicU64::new(0),
            first_error: Mutex::new(None),
        })
    }

    /// Seeds one vertex into the active set. Returns false for an unbound id.
    pub fn signal(&mut self, vid: VertexId) -> bool {
        if self.graph.vertex(vid).is_none() {
            return false;
        }
        self.sched.signal(vid);
        true
    }

    /// Seeds every bound vertex into the active set. Only valid before
    /// `start`, which the exclusive borrow enforces.
    pub fn signal_all(&mut self) {
        for vid in self.graph.vertex_ids() {
            self.sched.signal(vid);
        }
    }

    /// Spawns the worker pool and blocks until quiescence: all workers idle
    /// and the active set empty.
    pub fn start(&self) -> Result<()> {
        self.sched.begin_run();
        debug!(
            num_threads = self.config.num_threads,
            load_ahead = self.config.load_ahead_distance,
            caching = self.config.enable_caching,
            "starting engine"
        );
        std::thread::scope(|scope| {
            for _ in 0..self.config.num_threads {
                scope.spawn(|| self.worker_loop());
            }
        });
        if let Some(err) = self.first_error.lock().take() {
            return Err(err);
        }
        debug_assert!(self.sched.is_quiescent());
        debug!("engine finished");
        Ok(())
    }

    /// Current counter values.
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            spm_hits: self.spm_hits.load(Ordering::Relaxed),
            spm_misses: self.spm_misses.load(Ordering::Relaxed),
            num_failed_loads: self.spm.num_failed_loads(),
        }
    }

    fn worker_loop(&self) {
        while let Some(vid) = self.sched.next_job() {
            let neighbourhood = self.neighbourhood(vid);
            if !self.sched.acquire(vid, &neighbourhood) {
                break;
            }
            let result = self
                .prefetch_neighbourhood(vid)
                .and_then(|_| self.execute_vertex(vid));
            self.sched.release(vid, &neighbourhood);
            if let Err(err) = result {
                error!(%err, vid, "worker stopping on fatal scratchpad error");
                let mut slot = self.first_error.lock();
                if slot.is_none() {
                    *slot = Some(err);
                }
                self.sched.abort();
                break;
            }
        }
    }

    /// The closed neighbourhood of `vid`: the vertex itself plus every
    /// in-neighbour and out-neighbour. Repeats from parallel edges are
    /// harmless to the exclusion protocol.
    fn neighbourhood(&self, vid: VertexId) -> SmallVec<[VertexId; 16]> {
        let v = self.graph.vertex_raw(vid);
        let mut n = SmallVec::with_capacity(1 + v.in_edges.len() + v.out_edges.len());
        n.push(vid);
        for &e in &v.in_edges {
            n.push(self.graph.edge_raw(e).source());
        }
        for &e in &v.out_edges {
            n.push(self.graph.edge_raw(e).target());
        }
        n
    }
}

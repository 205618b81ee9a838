//! `gasket` is an asynchronous, multi-threaded gather-apply-scatter (GAS)
//! graph processing engine with a software-managed scratchpad prefetch layer.
//!
//! Applications define a [`VertexProgram`] over a directed [`Graph`], seed the
//! [`Engine`] with signals, and run it to quiescence. The engine guarantees
//! that no two programs whose closed neighbourhoods intersect execute
//! concurrently, and interleaves scratchpad prefetch and eviction with each
//! program's edge iteration to hide main-memory latency.

pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod program;
pub mod spm;

pub use crate::engine::{
    Context, EdgeView, Engine, EngineConfig, EngineMetrics, VertexView, DEFAULT_SPM_SIZE,
};
pub use crate::error::{EngineError, Result};
pub use crate::graph::{Edge, Graph, Vertex};
pub use crate::model::{DataCell, MemTag, SpmPayload, VertexId, Word, WORD_BYTES};
pub use crate::program::{EdgeDirection, VertexProgram};

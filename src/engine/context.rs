use tracing::error;

use crate::engine::Engine;
use crate::model::{EdgeIdx, MemTag, SpmPayload, VertexId};
use crate::program::VertexProgram;

/// Mediates between a running vertex program and the engine.
///
/// One context serves every program execution; it carries no per-vertex state.
pub struct Context<'e, 'g, P: VertexProgram> {
    pub(crate) engine: &'e Engine<'g, P>,
}

impl<'e, 'g, P: VertexProgram> Context<'e, 'g, P> {
    /// Schedules `vid` for (re-)execution. Signals carry no payload; a signal
    /// for an unknown or already-pending vertex is a no-op.
    pub fn signal(&self, vid: VertexId) {
        if self.engine.graph.vertex(vid).is_none() {
            return;
        }
        self.engine.sched.signal(vid);
    }

    /// Adds `delta` to `vid`'s gather cache, if caching is enabled and the
    /// cache holds a value.
    pub fn post_delta(&self, vid: VertexId, delta: P::Gather) {
        if !self.engine.config.enable_caching || self.engine.graph.vertex(vid).is_none() {
            return;
        }
        let mut slot = self.engine.cache[vid].lock();
        if slot.valid {
            slot.value += delta;
        }
    }

    /// Invalidates `vid`'s gather cache, forcing a full gather on its next
    /// execution.
    pub fn clear_gather_cache(&self, vid: VertexId) {
        if !self.engine.config.enable_caching || self.engine.graph.vertex(vid).is_none() {
            return;
        }
        self.engine.cache[vid].lock().valid = false;
    }
}

/// Handle to one vertex, scoped to a program execution.
pub struct VertexView<'e, 'g, P: VertexProgram> {
    engine: &'e Engine<'g, P>,
    vid: VertexId,
}

impl<'e, 'g, P: VertexProgram> VertexView<'e, 'g, P> {
    pub(crate) fn new(engine: &'e Engine<'g, P>, vid: VertexId) -> Self {
        Self { engine, vid }
    }

    pub fn id(&self) -> VertexId {
        self.vid
    }

    pub fn data(&self) -> P::VertexData {
        self.engine.graph.vertex_raw(self.vid).data.get()
    }

    /// Writes the vertex datum. A resident scratchpad copy is updated in
    /// place so a later eviction cannot write back a stale value.
    pub fn set_data(&self, value: P::VertexData) {
        self.engine.graph.vertex_raw(self.vid).data.set(value);
        if !P::VertexData::TRIVIAL {
            if let Err(err) = self
                .engine
                .spm
                .write_vdata(MemTag::for_vertex(self.vid), value.to_word())
            {
                error!(%err, vid = self.vid, "scratchpad write-through failed");
            }
        }
    }

    pub fn num_in_edges(&self) -> usize {
        self.engine.graph.vertex_raw(self.vid).num_in_edges()
    }

    pub fn num_out_edges(&self) -> usize {
        self.engine.graph.vertex_raw(self.vid).num_out_edges()
    }
}

/// Handle to one edge, scoped to a program execution.
pub struct EdgeView<'e, 'g, P: VertexProgram> {
    engine: &'e Engine<'g, P>,
    eidx: EdgeIdx,
}

impl<'e, 'g, P: VertexProgram> EdgeView<'e, 'g, P> {
    pub(crate) fn new(engine: &'e Engine<'g, P>, eidx: EdgeIdx) -> Self {
        Self { engine, eidx }
    }

    pub fn source(&self) -> VertexView<'e, 'g, P> {
        VertexView::new(self.engine, self.engine.graph.edge_raw(self.eidx).source())
    }

    pub fn target(&self) -> VertexView<'e, 'g, P> {
        VertexView::new(self.engine, self.engine.graph.edge_raw(self.eidx).target())
    }

    pub fn data(&self) -> P::EdgeData {
        self.engine.graph.edge_raw(self.eidx).data.get()
    }

    /// Writes the edge datum, keeping a resident scratchpad copy coherent.
    pub fn set_data(&self, value: P::EdgeData) {
        self.engine.graph.edge_raw(self.eidx).data.set(value);
        if !P::EdgeData::TRIVIAL {
            if let Err(err) = self
                .engine
                .spm
                .write_edata(MemTag::for_edge(self.eidx), value.to_word())
            {
                error!(%err, eidx = self.eidx, "scratchpad write-through failed");
            }
        }
    }
}

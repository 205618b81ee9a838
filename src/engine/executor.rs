//! Per-vertex gather/apply/scatter driver.
//!
//! Scratchpad traffic is interleaved with the user program: each iteration
//! prefetches the slot `load_ahead_distance` positions ahead and evicts the
//! slot it just consumed. Loads that fail for lack of space are tolerated;
//! user reads always go to main memory, the scratchpad probes only feed the
//! hit/miss counters the way a compiler-directed build would consult them.

use std::sync::atomic::Ordering;

use smallvec::SmallVec;

use crate::engine::{Context, EdgeView, Engine, VertexView};
use crate::error::Result;
use crate::graph::Vertex;
use crate::model::{EdgeIdx, MemTag, SpmPayload, VertexId};
use crate::program::VertexProgram;

impl<'g, P: VertexProgram> Engine<'g, P> {
    /// Pre-phase look-ahead: before gather starts, stage the first
    /// `load_ahead_distance` edges' data, in-edges first. A barrier would
    /// follow on a real device; the synchronous model completes immediately.
    pub(crate) fn prefetch_neighbourhood(&self, vid: VertexId) -> Result<()> {
        let vertex = self.graph.vertex_raw(vid);
        let la = self.config.load_ahead_distance;
        for i in 0..la.min(vertex.in_edges.len()) {
            self.preload_in_edge(vertex, i)?;
        }
        let out_budget = la.saturating_sub(vertex.in_edges.len());
        for i in 0..out_budget.min(vertex.out_edges.len()) {
            self.preload_out_edge(vertex, i)?;
        }
        self.spm.barrier();
        Ok(())
    }

    pub(crate) fn execute_vertex(&self, vid: VertexId) -> Result<()> {
        let ctx = Context { engine: self };
        let vv = VertexView::new(self, vid);
        let mut vprog = P::default();
        let vertex = self.graph.vertex_raw(vid);
        let la = self.config.load_ahead_distance;

        // doubly-connected neighbours stay resident until the end of scatter
        let mut doubcon: SmallVec<[VertexId; 8]> = SmallVec::new();

        let mut accum = P::Gather::default();
        let mut accum_is_set = false;

        let cached = self.config.enable_caching && {
            let slot = self.cache[vid].lock();
            if slot.valid {
                accum = slot.value.clone();
                true
            } else {
                false
            }
        };

        if cached {
            accum_is_set = true;
        } else {
            let gather_dir = vprog.gather_edges(&ctx, &vv);

            if gather_dir.includes_in() {
                for i in 0..vertex.in_edges.len() {
                    let ahead = i + la;
                    if la > 0 {
                        if ahead < vertex.in_edges.len() {
                            self.preload_in_edge(vertex, ahead)?;
                        } else if ahead - vertex.in_edges.len() < vertex.out_edges.len() {
                            // out-edge data is staged even for an in-only gather:
                            // scatter usually starts with the out list
                            self.preload_out_edge(vertex, ahead - vertex.in_edges.len())?;
                        }
                    }

                    let eidx = vertex.in_edges[i];
                    let edge = self.graph.edge_raw(eidx);
                    self.check_spm_hit(eidx, edge.source())?;

                    let g = vprog.gather(&ctx, &vv, &EdgeView::new(self, eidx));
                    if accum_is_set {
                        accum += g;
                    } else {
                        accum = g;
                        accum_is_set = true;
                    }

                    self.evict_edata(eidx)?;
                    if edge.has_opposite() {
                        doubcon.push(edge.source());
                    } else {
                        self.evict_vdata(edge.source())?;
                    }
                }
            } else {
                // gather skips in-edges: drop what the pre-phase staged for them
                for i in 0..la.min(vertex.in_edges.len()) {
                    self.evict_in_edge(vertex, i)?;
                }
            }

            if gather_dir.includes_out() {
                for i in 0..vertex.out_edges.len() {
                    let ahead = i + la;
                    if la > 0 && ahead < vertex.out_edges.len() {
                        self.preload_out_edge(vertex, ahead)?;
                    }

                    let eidx = vertex.out_edges[i];
                    let edge = self.graph.edge_raw(eidx);
                    self.check_spm_hit(eidx, edge.target())?;

                    let g = vprog.gather(&ctx, &vv, &EdgeView::new(self, eidx));
                    if accum_is_set {
                        accum += g;
                    } else {
                        accum = g;
                        accum_is_set = true;
                    }

                    // the first `la` slots are kept: scatter's out loop is
                    // likely to touch them first
                    if i >= la {
                        self.evict_out_edge(vertex, i)?;
                    }
                }
            }

            // an accumulator that was never set would only zero out the cache
            if self.config.enable_caching && accum_is_set {
                let mut slot = self.cache[vid].lock();
                slot.value = accum.clone();
                slot.valid = true;
            }
        }

        vprog.apply(&ctx, &vv, &accum);

        let scatter_dir = vprog.scatter_edges(&ctx, &vv);

        if scatter_dir.includes_out() {
            for i in 0..vertex.out_edges.len() {
                let ahead = i + la;
                if la > 0 {
                    if ahead < vertex.out_edges.len() {
                        self.preload_out_edge(vertex, ahead)?;
                    } else if scatter_dir.includes_in()
                        && ahead - vertex.out_edges.len() < vertex.in_edges.len()
                    {
                        // fall over into the in list only when scatter will use it
                        self.preload_in_edge(vertex, ahead - vertex.out_edges.len())?;
                    }
                }

                let eidx = vertex.out_edges[i];
                let edge = self.graph.edge_raw(eidx);
                self.check_spm_hit(eidx, edge.target())?;

                vprog.scatter(&ctx, &vv, &EdgeView::new(self, eidx));

                self.evict_out_edge(vertex, i)?;
            }
        } else {
            // scatter skips out-edges: drop what gather kept staged for them
            for i in 0..la.min(vertex.out_edges.len()) {
                self.evict_out_edge(vertex, i)?;
            }
        }

        if scatter_dir.includes_in() {
            for i in 0..vertex.in_edges.len() {
                let ahead = i + la;
                if la > 0 && ahead < vertex.in_edges.len() {
                    self.preload_in_edge(vertex, ahead)?;
                }

                let eidx = vertex.in_edges[i];
                let edge = self.graph.edge_raw(eidx);
                self.check_spm_hit(eidx, edge.source())?;

                vprog.scatter(&ctx, &vv, &EdgeView::new(self, eidx));

                self.evict_in_edge(vertex, i)?;
            }
        } else {
            // mirror of the out-side cleanup; also reclaims pre-phase loads
            // left untouched when gather was served from the cache
            for i in 0..la.min(vertex.in_edges.len()) {
                self.evict_in_edge(vertex, i)?;
            }
        }

        for neigh in doubcon {
            self.evict_vdata(neigh)?;
        }
        Ok(())
    }

    /// Probes the scratchpad for the data the next user call touches and
    /// counts hits and misses per non-trivial payload.
    fn check_spm_hit(&self, eidx: EdgeIdx, far: VertexId) -> Result<()> {
        if !P::EdgeData::TRIVIAL {
            match self.spm.read_edata(MemTag::for_edge(eidx))? {
                Some(_) => self.spm_hits.fetch_add(1, Ordering::Relaxed),
                None => self.spm_misses.fetch_add(1, Ordering::Relaxed),
            };
        }
        if !P::VertexData::TRIVIAL {
            match self.spm.read_vdata(MemTag::for_vertex(far))? {
                Some(_) => self.spm_hits.fetch_add(1, Ordering::Relaxed),
                None => self.spm_misses.fetch_add(1, Ordering::Relaxed),
            };
        }
        Ok(())
    }

    fn preload_in_edge(&self, vertex: &Vertex<P::VertexData>, i: usize) -> Result<()> {
        let eidx = vertex.in_edges[i];
        let edge = self.graph.edge_raw(eidx);
        if !P::EdgeData::TRIVIAL {
            self.spm.load_edata(MemTag::for_edge(eidx), edge.data.word())?;
        }
        if !P::VertexData::TRIVIAL {
            let source = edge.source();
            self.spm.load_vdata(
                MemTag::for_vertex(source),
                self.graph.vertex_raw(source).data.word(),
            )?;
        }
        Ok(())
    }

    fn preload_out_edge(&self, vertex: &Vertex<P::VertexData>, i: usize) -> Result<()> {
        let eidx = vertex.out_edges[i];
        let edge = self.graph.edge_raw(eidx);
        if !P::EdgeData::TRIVIAL {
            self.spm.load_edata(MemTag::for_edge(eidx), edge.data.word())?;
        }
        if !P::VertexData::TRIVIAL {
            let target = edge.target();
            self.spm.load_vdata(
                MemTag::for_vertex(target),
                self.graph.vertex_raw(target).data.word(),
            )?;
        }
        Ok(())
    }

    /// Evicts a vertex payload, writing the returned copy back to its cell.
    fn evict_vdata(&self, vid: VertexId) -> Result<()> {
        if P::VertexData::TRIVIAL {
            return Ok(());
        }
        if let Some(word) = self.spm.remove_vdata(MemTag::for_vertex(vid))? {
            self.graph.vertex_raw(vid).data.set_word(word);
        }
        Ok(())
    }

    fn evict_edata(&self, eidx: EdgeIdx) -> Result<()> {
        if P::EdgeData::TRIVIAL {
            return Ok(());
        }
        if let Some(word) = self.spm.remove_edata(MemTag::for_edge(eidx))? {
            self.graph.edge_raw(eidx).data.set_word(word);
        }
        Ok(())
    }

    fn evict_in_edge(&self, vertex: &Vertex<P::VertexData>, i: usize) -> Result<()> {
        let eidx = vertex.in_edges[i];
        self.evict_edata(eidx)?;
        self.evict_vdata(self.graph.edge_raw(eidx).source())
    }

    fn evict_out_edge(&self, vertex: &Vertex<P::VertexData>, i: usize) -> Result<()> {
        let eidx = vertex.out_edges[i];
        self.evict_edata(eidx)?;
        self.evict_vdata(self.graph.edge_raw(eidx).target())
    }
}

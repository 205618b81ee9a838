use std::ops::AddAssign;

use crate::engine::{Context, EdgeView, VertexView};
use crate::model::SpmPayload;

/// Edge set selected by a vertex program for its gather or scatter phase.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EdgeDirection {
    None,
    In,
    Out,
    All,
}

impl EdgeDirection {
    pub fn includes_in(self) -> bool {
        matches!(self, EdgeDirection::In | EdgeDirection::All)
    }

    pub fn includes_out(self) -> bool {
        matches!(self, EdgeDirection::Out | EdgeDirection::All)
    }
}

/// A user vertex program.
///
/// A fresh instance is default-constructed for every execution of a vertex, so
/// fields on the implementing type carry private state from `apply` to
/// `scatter` within one execution only. Vertex data may be mutated in `apply`
/// alone; `scatter` may mutate edge data and signal neighbours through the
/// context.
///
/// `Gather` is combined with `+=`, which must be commutative and associative;
/// the engine assigns the first gathered value and folds the rest in
/// arbitrary-direction order.
pub trait VertexProgram: Default + Sized {
    type VertexData: SpmPayload;
    type EdgeData: SpmPayload;
    type Gather: Default + Clone + AddAssign + Send;

    /// Edge set the gather phase runs over. Defaults to in-edges.
    fn gather_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &VertexView<'_, '_, Self>) -> EdgeDirection {
        EdgeDirection::In
    }

    fn gather(
        &self,
        ctx: &Context<'_, '_, Self>,
        vertex: &VertexView<'_, '_, Self>,
        edge: &EdgeView<'_, '_, Self>,
    ) -> Self::Gather;

    fn apply(
        &mut self,
        ctx: &Context<'_, '_, Self>,
        vertex: &VertexView<'_, '_, Self>,
        total: &Self::Gather,
    );

    /// Edge set the scatter phase runs over. Defaults to out-edges.
    fn scatter_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &VertexView<'_, '_, Self>) -> EdgeDirection {
        EdgeDirection::Out
    }

    fn scatter(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
        _edge: &EdgeView<'_, '_, Self>,
    ) {
    }
}

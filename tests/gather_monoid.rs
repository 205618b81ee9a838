//! The gather accumulator is a commutative monoid, so permuting edge
//! insertion order (and with it iteration order) must not change results.

use gasket::{Context, EdgeView, Engine, EngineConfig, Graph, VertexProgram, VertexView};
use proptest::prelude::*;

const NUM_VERTICES: usize = 8;

#[derive(Default)]
struct WeightSum;

impl VertexProgram for WeightSum {
    type VertexData = i64;
    type EdgeData = i64;
    type Gather = i64;

    fn gather(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
        edge: &EdgeView<'_, '_, Self>,
    ) -> i64 {
        edge.data()
    }

    fn apply(
        &mut self,
        _ctx: &Context<'_, '_, Self>,
        vertex: &VertexView<'_, '_, Self>,
        total: &i64,
    ) {
        vertex.set_data(*total);
    }

    fn scatter_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
    ) -> gasket::EdgeDirection {
        gasket::EdgeDirection::None
    }
}

fn run_with_edges(edges: &[(usize, usize, i64)]) -> Vec<i64> {
    let mut g = Graph::new();
    for vid in 0..NUM_VERTICES {
        g.add_vertex(vid, 0);
    }
    for &(source, target, weight) in edges {
        assert!(g.add_edge(source, target, weight));
    }
    let mut engine = Engine::<WeightSum>::new(&g, EngineConfig::default()).unwrap();
    engine.signal_all();
    engine.start().unwrap();
    (0..NUM_VERTICES)
        .map(|v| g.vertex(v).unwrap().data())
        .collect()
}

proptest! {
    #[test]
    fn gather_sum_is_invariant_under_edge_order(
        raw in prop::collection::vec(
            (0..NUM_VERTICES, 0..NUM_VERTICES, -100i64..100),
            0..24,
        )
    ) {
        let edges: Vec<_> = raw.into_iter().filter(|&(s, t, _)| s != t).collect();

        let forward = run_with_edges(&edges);

        let mut shuffled = edges.clone();
        shuffled.reverse();
        let backward = run_with_edges(&shuffled);

        let mut expected = vec![0i64; NUM_VERTICES];
        for &(_, target, weight) in &edges {
            expected[target] += weight;
        }

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(&forward, &expected);
    }
}

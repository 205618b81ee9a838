use std::ops::AddAssign;

use gasket::{
    Context, EdgeDirection, EdgeView, Engine, EngineConfig, Graph, VertexProgram, VertexView,
};

/// Distance accumulator. Negative means "no path seen"; `+=` keeps the
/// smallest positive distance.
#[derive(Clone, Copy, Default)]
struct MinDist(i64);

impl AddAssign for MinDist {
    fn add_assign(&mut self, rhs: Self) {
        if self.0 < 0 || (rhs.0 > 0 && rhs.0 < self.0) {
            self.0 = rhs.0;
        }
    }
}

#[derive(Default)]
struct ShortestPaths {
    relaxed: bool,
}

impl VertexProgram for ShortestPaths {
    type VertexData = i64;
    type EdgeData = i64;
    type Gather = MinDist;

    fn gather(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
        edge: &EdgeView<'_, '_, Self>,
    ) -> MinDist {
        let source_dist = edge.source().data();
        if source_dist >= 0 {
            MinDist(source_dist + edge.data())
        } else {
            MinDist(-1)
        }
    }

    fn apply(
        &mut self,
        _ctx: &Context<'_, '_, Self>,
        vertex: &VertexView<'_, '_, Self>,
        total: &MinDist,
    ) {
        if total.0 > 0 && (vertex.data() < 0 || vertex.data() > total.0) {
            vertex.set_data(total.0);
            self.relaxed = true;
        } else {
            self.relaxed = false;
        }
    }

    fn scatter_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
    ) -> EdgeDirection {
        if self.relaxed {
            EdgeDirection::Out
        } else {
            EdgeDirection::None
        }
    }

    fn scatter(
        &self,
        ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
        edge: &EdgeView<'_, '_, Self>,
    ) {
        ctx.signal(edge.target().id());
    }
}

/// source = 0 with distance 0, everything else unreached (-1).
fn chain_graph() -> Graph<i64, i64> {
    let mut g = Graph::new();
    for vid in 0..4 {
        g.add_vertex(vid, if vid == 0 { 0 } else { -1 });
    }
    g.add_edge(0, 1, 2);
    g.add_edge(1, 2, 3);
    g.add_edge(2, 3, 4);
    g
}

fn run(g: &Graph<i64, i64>, config: EngineConfig) -> Engine<'_, ShortestPaths> {
    let mut engine = Engine::<ShortestPaths>::new(g, config).unwrap();
    engine.signal_all();
    engine.start().unwrap();
    engine
}

fn distances(g: &Graph<i64, i64>) -> Vec<i64> {
    (0..g.num_vertices())
        .map(|v| g.vertex(v).unwrap().data())
        .collect()
}

#[test]
fn four_node_chain() {
    let g = chain_graph();
    run(&g, EngineConfig::default());
    assert_eq!(distances(&g), vec![0, 2, 5, 9]);
}

#[test]
fn single_thread_matches_the_chain() {
    let g = chain_graph();
    run(
        &g,
        EngineConfig {
            num_threads: 1,
            ..Default::default()
        },
    );
    assert_eq!(distances(&g), vec![0, 2, 5, 9]);
}

#[test]
fn re_relaxation_through_a_cheaper_detour() {
    let mut g = Graph::new();
    for vid in 0..3 {
        g.add_vertex(vid, if vid == 0 { 0 } else { -1 });
    }
    g.add_edge(0, 1, 10);
    g.add_edge(0, 2, 1);
    g.add_edge(2, 1, 1);
    run(&g, EngineConfig::default());
    assert_eq!(distances(&g), vec![0, 2, 1]);
}

#[test]
fn zero_look_ahead_disables_prefetch_without_changing_results() {
    let g = chain_graph();
    let engine = run(
        &g,
        EngineConfig {
            load_ahead_distance: 0,
            ..Default::default()
        },
    );
    assert_eq!(distances(&g), vec![0, 2, 5, 9]);
    let metrics = engine.metrics();
    assert_eq!(metrics.spm_hits, 0);
    assert_eq!(metrics.num_failed_loads, 0);
}

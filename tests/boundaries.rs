use gasket::{
    Context, EdgeView, EngineError, Engine, EngineConfig, Graph, VertexProgram, VertexView,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Default)]
struct MarkSeven;

impl VertexProgram for MarkSeven {
    type VertexData = f64;
    type EdgeData = ();
    type Gather = f64;

    fn gather(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
        _edge: &EdgeView<'_, '_, Self>,
    ) -> f64 {
        0.0
    }

    fn apply(
        &mut self,
        _ctx: &Context<'_, '_, Self>,
        vertex: &VertexView<'_, '_, Self>,
        _total: &f64,
    ) {
        vertex.set_data(7.0);
    }
}

#[test]
fn empty_graph_returns_immediately() {
    let g: Graph<f64, ()> = Graph::new();
    let mut engine = Engine::<MarkSeven>::new(&g, EngineConfig::default()).unwrap();
    engine.signal_all();
    engine.start().unwrap();
}

#[test]
fn isolated_vertex_acquires_and_releases_trivially() {
    let mut g: Graph<f64, ()> = Graph::new();
    g.add_vertex(0, 0.0);
    let mut engine = Engine::<MarkSeven>::new(&g, EngineConfig::default()).unwrap();
    engine.signal_all();
    engine.start().unwrap();
    assert_eq!(g.vertex(0).unwrap().data(), 7.0);
}

#[test]
fn signalling_an_unbound_vertex_is_rejected() {
    let mut g: Graph<f64, ()> = Graph::new();
    g.add_vertex(2, 0.0); // 0 and 1 stay placeholders
    let mut engine = Engine::<MarkSeven>::new(&g, EngineConfig::default()).unwrap();
    assert!(!engine.signal(0));
    assert!(!engine.signal(9));
    assert!(engine.signal(2));
    engine.start().unwrap();
    assert_eq!(g.vertex(2).unwrap().data(), 7.0);
}

#[test]
fn construction_rejects_bad_configuration() {
    let g: Graph<f64, ()> = Graph::new();
    assert!(matches!(
        Engine::<MarkSeven>::new(
            &g,
            EngineConfig {
                num_threads: 0,
                ..Default::default()
            }
        ),
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        Engine::<MarkSeven>::new(
            &g,
            EngineConfig {
                spm_size: 12, // not a word multiple
                ..Default::default()
            }
        ),
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        Engine::<MarkSeven>::new(
            &g,
            EngineConfig {
                spm_size: 16, // too small for the slab metadata
                ..Default::default()
            }
        ),
        Err(EngineError::InvalidArgument(_))
    ));
}

#[derive(Default)]
struct DampedRank {
    delta: f64,
}

impl VertexProgram for DampedRank {
    type VertexData = f64;
    type EdgeData = ();
    type Gather = f64;

    fn gather(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
        edge: &EdgeView<'_, '_, Self>,
    ) -> f64 {
        edge.source().data() / edge.source().num_out_edges() as f64
    }

    fn apply(
        &mut self,
        _ctx: &Context<'_, '_, Self>,
        vertex: &VertexView<'_, '_, Self>,
        total: &f64,
    ) {
        let new_rank = *total * 0.85 + 0.15;
        self.delta = new_rank - vertex.data();
        vertex.set_data(new_rank);
    }

    fn scatter(
        &self,
        ctx: &Context<'_, '_, Self>,
        _vertex: &VertexView<'_, '_, Self>,
        edge: &EdgeView<'_, '_, Self>,
    ) {
        // halting program: only propagate meaningful changes
        if self.delta.abs() > 1e-3 {
            ctx.signal(edge.target().id());
        }
    }
}

#[test]
fn random_graph_runs_to_quiescence() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut g: Graph<f64, ()> = Graph::new();
    for vid in 0..100 {
        g.add_vertex(vid, 1.0);
    }
    for vid in 0..100 {
        for _ in 0..rng.gen_range(1..=3) {
            let target = rng.gen_range(0..100);
            if target != vid {
                g.add_edge(vid, target, ());
            }
        }
    }

    let mut engine = Engine::<DampedRank>::new(
        &g,
        EngineConfig {
            num_threads: 4,
            ..Default::default()
        },
    )
    .unwrap();
    engine.signal_all();
    engine.start().unwrap();

    for vid in 0..100 {
        let rank = g.vertex(vid).unwrap().data();
        assert!(rank.is_finite());
        assert!(rank >= 0.15 - 1e-9, "vertex {vid} rank {rank}");
    }
}

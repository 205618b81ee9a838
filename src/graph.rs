use crate::model::{DataCell, EdgeIdx, SpmPayload, VertexId};

/// A vertex in the adjacency-list store.
///
/// `id` is `None` for placeholder slots created to fill id gaps; placeholders
/// carry no edges and are never scheduled.
pub struct Vertex<V: SpmPayload> {
    id: Option<VertexId>,
    pub(crate) in_edges: Vec<EdgeIdx>,
    pub(crate) out_edges: Vec<EdgeIdx>,
    pub(crate) data: DataCell<V>,
}

impl<V: SpmPayload + Default> Vertex<V> {
    fn placeholder() -> Self {
        Self {
            id: None,
            in_edges: Vec::new(),
            out_edges: Vec::new(),
            data: DataCell::new(V::default()),
        }
    }
}

impl<V: SpmPayload> Vertex<V> {
    pub fn id(&self) -> Option<VertexId> {
        self.id
    }

    pub fn data(&self) -> V {
        self.data.get()
    }

    pub fn set_data(&self, value: V) {
        self.data.set(value);
    }

    pub fn num_in_edges(&self) -> usize {
        self.in_edges.len()
    }

    pub fn num_out_edges(&self) -> usize {
        self.out_edges.len()
    }
}

/// A directed edge. Endpoints are vertex-table indices; `has_opposite` is true
/// iff the reverse edge also exists in the graph.
pub struct Edge<E: SpmPayload> {
    pub(crate) source: VertexId,
    pub(crate) target: VertexId,
    pub(crate) has_opposite: bool,
    pub(crate) data: DataCell<E>,
}

impl<E: SpmPayload> Edge<E> {
    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn target(&self) -> VertexId {
        self.target
    }

    pub fn has_opposite(&self) -> bool {
        self.has_opposite
    }

    pub fn data(&self) -> E {
        self.data.get()
    }
}

/// Adjacency-list directed multigraph with dense vertex ids.
///
/// Structure is fixed once execution begins: the engine takes a shared borrow,
/// and all mutating operations require `&mut self`.
pub struct Graph<V: SpmPayload, E: SpmPayload> {
    vertices: Vec<Vertex<V>>,
    edges: Vec<Edge<E>>,
}

impl<V: SpmPayload + Default, E: SpmPayload> Default for Graph<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: SpmPayload + Default, E: SpmPayload> Graph<V, E> {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Binds `vid` to a new vertex holding `data`.
    ///
    /// Returns false if the id is already bound. Gaps below `vid` are filled
    /// with placeholder slots.
    pub fn add_vertex(&mut self, vid: VertexId, data: V) -> bool {
        if vid >= self.vertices.len() {
            self.vertices.resize_with(vid + 1, Vertex::placeholder);
        }
        if self.vertices[vid].id.is_some() {
            return false;
        }
        self.vertices[vid] = Vertex {
            id: Some(vid),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
            data: DataCell::new(data),
        };
        true
    }

    /// Adds a directed edge `source -> target` carrying `data`.
    ///
    /// Returns false for self-edges and for unbound endpoints. If the reverse
    /// edge already exists, both edges are marked as having an opposite.
    pub fn add_edge(&mut self, source: VertexId, target: VertexId, data: E) -> bool {
        if source == target || !self.is_bound(source) || !self.is_bound(target) {
            return false;
        }
        let eidx = self.edges.len();
        let mut has_opposite = false;
        for &rev in &self.vertices[target].out_edges {
            if self.edges[rev].target == source {
                has_opposite = true;
                self.edges[rev].has_opposite = true;
            }
        }
        self.edges.push(Edge {
            source,
            target,
            has_opposite,
            data: DataCell::new(data),
        });
        self.vertices[source].out_edges.push(eidx);
        self.vertices[target].in_edges.push(eidx);
        true
    }

    fn is_bound(&self, vid: VertexId) -> bool {
        self.vertices.get(vid).is_some_and(|v| v.id.is_some())
    }
}

impl<V: SpmPayload, E: SpmPayload> Graph<V, E> {
    pub fn vertex(&self, vid: VertexId) -> Option<&Vertex<V>> {
        self.vertices.get(vid).filter(|v| v.id.is_some())
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn vertex_raw(&self, vid: VertexId) -> &Vertex<V> {
        &self.vertices[vid]
    }

    pub(crate) fn edge_raw(&self, eidx: EdgeIdx) -> &Edge<E> {
        &self.edges[eidx]
    }

    /// Ids of bound (non-placeholder) vertices, in table order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(vid, v)| v.id.map(|_| vid))
    }
}

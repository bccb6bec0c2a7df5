use parking_lot::Mutex;
use petgraph::{
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
    Direction::{Incoming, Outgoing},
};

use crate::factor_types::unary_factor::UnaryFactor;

// The per-vertex state of a variable in the pairwise Markov random field.
// The potential is immutable after construction; the belief is mutated only
// by the update running for this vertex, and read out after convergence.
pub struct VertexData {
    potential: UnaryFactor,
    belief: Mutex<UnaryFactor>,
}

impl VertexData {
    pub fn potential(&self) -> &UnaryFactor {
        &self.potential
    }

    pub fn belief(&self) -> &Mutex<UnaryFactor> {
        &self.belief
    }
}

// The per-directed-edge message state. `message` holds the most recently
// sent value; `old_message` holds the value as of the start of the most
// recent update of the receiving vertex. The double buffering is what lets
// adjacent vertices update concurrently: a belief recomputation always reads
// the snapshot it took itself, never a message a neighbor is rewriting.
pub struct EdgeMessages {
    pub message: UnaryFactor,
    pub old_message: UnaryFactor,
}

type MrfGraph = DiGraph<VertexData, Mutex<EdgeMessages>, usize>;

// A pairwise Markov random field with a fixed topology: dense vertex and
// edge arenas indexed by small integer ids assigned at construction. Each
// undirected adjacency is represented by two independent directed edges,
// one per message direction.
pub struct PairwiseMarkovRandomField {
    graph: MrfGraph,
    finalized: bool,
}

impl PairwiseMarkovRandomField {
    pub fn new() -> Self {
        PairwiseMarkovRandomField::with_capacity(0, 0)
    }

    pub fn with_capacity(num_vertices: usize, num_edges: usize) -> Self {
        PairwiseMarkovRandomField {
            graph: MrfGraph::with_capacity(num_vertices, num_edges),
            finalized: false,
        }
    }

    // Adds a variable with the given potential; its belief starts uniform.
    // Returns the vertex id, which the caller may rely on being sequential.
    pub fn add_vertex(&mut self, potential: UnaryFactor) -> usize {
        assert!(
            !self.finalized,
            "Cannot add vertices to a finalized pairwise MRF."
        );
        let belief = UnaryFactor::uniform(potential.var(), potential.arity());
        let vertex = self.graph.add_node(VertexData {
            potential,
            belief: Mutex::new(belief),
        });
        vertex.index()
    }

    // Adds a directed edge with uniform initial messages over the target variable
    pub fn add_edge(&mut self, source: usize, target: usize) -> usize {
        assert!(
            !self.finalized,
            "Cannot add edges to a finalized pairwise MRF."
        );
        assert_ne!(source, target, "Self-loops are not allowed.");
        let message = UnaryFactor::uniform(target, self.arity(target));
        let edge = self.graph.add_edge(
            NodeIndex::new(source),
            NodeIndex::new(target),
            Mutex::new(EdgeMessages {
                old_message: message.clone(),
                message,
            }),
        );
        edge.index()
    }

    // Freezes the topology. The edge-consistency guarantees assumed by the
    // scheduler require that no vertices or edges are added once updates begin.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn num_vertices(&self) -> usize {
        self.graph.node_count()
    }

    pub fn num_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn vertex_data(&self, vertex: usize) -> &VertexData {
        &self.graph[NodeIndex::new(vertex)]
    }

    pub fn potential(&self, vertex: usize) -> &UnaryFactor {
        self.vertex_data(vertex).potential()
    }

    // Returns a snapshot of the vertex's current belief
    pub fn belief(&self, vertex: usize) -> UnaryFactor {
        self.vertex_data(vertex).belief().lock().clone()
    }

    pub fn arity(&self, vertex: usize) -> usize {
        self.potential(vertex).arity()
    }

    // Returns (edge id, source vertex id) for every incoming directed edge
    pub fn in_edges(&self, vertex: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph
            .edges_directed(NodeIndex::new(vertex), Incoming)
            .map(|edge| (edge.id().index(), edge.source().index()))
    }

    // Returns (edge id, target vertex id) for every outgoing directed edge
    pub fn out_edges(&self, vertex: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph
            .edges_directed(NodeIndex::new(vertex), Outgoing)
            .map(|edge| (edge.id().index(), edge.target().index()))
    }

    pub fn edge_messages(&self, edge: usize) -> &Mutex<EdgeMessages> {
        &self.graph[EdgeIndex::new(edge)]
    }
}

impl Default for PairwiseMarkovRandomField {
    fn default() -> Self {
        PairwiseMarkovRandomField::new()
    }
}

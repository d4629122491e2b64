//! Pipeline graph structure using daggy.
//!
//! The graph is the single owner of every processing node: the engine's
//! opaque handles live inside the arena for their entire lifetime, and all
//! other components refer to nodes through copyable [`NodeId`]s. Besides
//! topology, each node entry tracks its lifecycle (created, added to the
//! running graph, linked, current state), which is what the assembly-time
//! invariants are checked against.

use std::collections::HashMap;
use std::fmt::Write as _;

use daggy::{Dag, NodeIndex};

use crate::caps::Caps;
use crate::config::{NodeConfig, NodeKind};
use crate::engine::{EngineEvents, MediaEngine, NodeState, SeekRequest};
use crate::error::{Error, Result};
use crate::pipeline::factory::ElementFactory;

/// Unique identifier for a node in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// A node entry in the graph arena.
struct NodeEntry<N> {
    name: String,
    kind: NodeKind,
    input_caps: Option<Caps>,
    output_caps: Option<Caps>,
    /// The engine's opaque handle.
    node: N,
    /// Whether the node has been added to the engine's running graph.
    added: bool,
    /// Whether the node has at least one link.
    linked: bool,
    state: NodeState,
}

/// A link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Label of the upstream connection point.
    pub src_pad: String,
    /// Label of the downstream connection point.
    pub sink_pad: String,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            src_pad: "src".to_string(),
            sink_pad: "sink".to_string(),
        }
    }
}

impl Link {
    /// Create a link with specific pad labels.
    pub fn with_pads(src_pad: impl Into<String>, sink_pad: impl Into<String>) -> Self {
        Self {
            src_pad: src_pad.into(),
            sink_pad: sink_pad.into(),
        }
    }
}

/// The aggregate of all processing nodes and their link topology.
///
/// Wraps the engine backend: every mutation is applied to the engine first
/// and mirrored in the arena, so the arena is an accurate control-plane view
/// of what the engine is running.
pub struct PipelineGraph<E: MediaEngine> {
    engine: E,
    dag: Dag<NodeEntry<E::Node>, Link>,
    by_name: HashMap<String, NodeId>,
    state: NodeState,
}

impl<E: MediaEngine> PipelineGraph<E> {
    /// Create an empty graph over an engine backend.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            dag: Dag::new(),
            by_name: HashMap::new(),
            state: NodeState::Null,
        }
    }

    /// Create a node and take ownership of it.
    ///
    /// The node is not yet part of the running graph; call
    /// [`add_node`](Self::add_node) when its chain is attached. Creation
    /// failures are fatal by contract: the caller is expected to abort
    /// startup, and no teardown is needed because nothing runs yet.
    pub fn create_node(&mut self, name: &str, config: NodeConfig) -> Result<NodeId> {
        if self.by_name.contains_key(name) {
            return Err(Error::PipelineConstruction(format!(
                "duplicate node name '{name}'"
            )));
        }
        let node = ElementFactory::make(&mut self.engine, name, &config)?;
        let entry = NodeEntry {
            name: name.to_string(),
            kind: config.kind(),
            input_caps: config.input_caps(),
            output_caps: config.output_caps(),
            node,
            added: false,
            linked: false,
            state: NodeState::Null,
        };
        let id = NodeId(self.dag.add_node(entry));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Add a created node to the running graph.
    pub fn add_node(&mut self, id: NodeId) -> Result<()> {
        let entry = Self::entry_of(&self.dag, id)?;
        if entry.added {
            return Err(Error::AlreadyAdded(entry.name.clone()));
        }
        self.engine.add(&entry.node)?;
        self.entry_mut(id)?.added = true;
        Ok(())
    }

    /// Add several nodes to the running graph.
    pub fn add_nodes(&mut self, ids: &[NodeId]) -> Result<()> {
        for &id in ids {
            self.add_node(id)?;
        }
        Ok(())
    }

    /// Link two nodes in dataflow order.
    ///
    /// Both nodes must already be part of the running graph, the upstream
    /// node must produce something the downstream node accepts, and the
    /// link must not close a cycle.
    pub fn link(&mut self, upstream: NodeId, downstream: NodeId) -> Result<()> {
        let up = Self::entry_of(&self.dag, upstream)?;
        let down = Self::entry_of(&self.dag, downstream)?;
        if !up.added {
            return Err(Error::NotAdded(up.name.clone()));
        }
        if !down.added {
            return Err(Error::NotAdded(down.name.clone()));
        }

        let offered = up.output_caps.ok_or_else(|| Error::IncompatibleLink {
            from: up.name.clone(),
            to: down.name.clone(),
            reason: format!("'{}' produces no output", up.name),
        })?;
        let accepted = down.input_caps.ok_or_else(|| Error::IncompatibleLink {
            from: up.name.clone(),
            to: down.name.clone(),
            reason: format!("'{}' accepts no input", down.name),
        })?;
        if !accepted.accepts(offered) {
            return Err(Error::IncompatibleLink {
                from: up.name.clone(),
                to: down.name.clone(),
                reason: format!("{offered} output does not match {accepted} input"),
            });
        }

        let (from_name, to_name) = (up.name.clone(), down.name.clone());
        self.engine.link(&up.node, &down.node)?;

        self.dag
            .add_edge(upstream.0, downstream.0, Link::default())
            .map_err(|_| Error::IncompatibleLink {
                from: from_name,
                to: to_name,
                reason: "linking would create a cycle".to_string(),
            })?;

        self.entry_mut(upstream)?.linked = true;
        self.entry_mut(downstream)?.linked = true;
        Ok(())
    }

    /// Link a sequence of nodes in order.
    pub fn link_chain(&mut self, ids: &[NodeId]) -> Result<()> {
        for pair in ids.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Link a dynamically announced pad to a node's input.
    ///
    /// `from` is the node that announced the pad (the demultiplexer) and is
    /// recorded as the edge's origin so the topology stays complete.
    pub fn link_pad(
        &mut self,
        pad: &E::Pad,
        from: NodeId,
        to: NodeId,
        media_type: &str,
    ) -> Result<()> {
        let down = Self::entry_of(&self.dag, to)?;
        if !down.added {
            return Err(Error::NotAdded(down.name.clone()));
        }
        let from_name = Self::entry_of(&self.dag, from)?.name.clone();
        let to_name = down.name.clone();
        self.engine.link_pad(pad, &down.node)?;

        self.dag
            .add_edge(from.0, to.0, Link::with_pads(media_type, "sink"))
            .map_err(|_| Error::IncompatibleLink {
                from: from_name,
                to: to_name,
                reason: "linking would create a cycle".to_string(),
            })?;

        self.entry_mut(from)?.linked = true;
        self.entry_mut(to)?.linked = true;
        Ok(())
    }

    /// Change the lifecycle state of a single node.
    ///
    /// Asking for the playing state before the node is linked into the
    /// graph is a programming error and fails loudly instead of letting the
    /// engine silently drop data.
    pub fn set_node_state(&mut self, id: NodeId, state: NodeState) -> Result<()> {
        let entry = Self::entry_of(&self.dag, id)?;
        if !entry.added {
            return Err(Error::NotAdded(entry.name.clone()));
        }
        if state == NodeState::Playing && !entry.linked {
            return Err(Error::NotLinked(entry.name.clone()));
        }
        self.engine.set_state(&entry.node, state)?;
        self.entry_mut(id)?.state = state;
        Ok(())
    }

    /// Change the lifecycle state of the whole graph.
    pub fn set_state(&mut self, state: NodeState) -> Result<()> {
        self.engine.set_pipeline_state(state)?;
        self.state = state;
        // The engine propagates graph transitions to every contained node.
        let indices: Vec<_> = self.dag.graph().node_indices().collect();
        for idx in indices {
            if let Some(entry) = self.dag.node_weight_mut(idx) {
                if entry.added {
                    entry.state = state;
                }
            }
        }
        Ok(())
    }

    /// Issue a seek on the whole graph.
    pub fn seek(&mut self, request: &SeekRequest) -> Result<()> {
        self.engine.seek(request)
    }

    /// Start watching the demultiplexer's signals and the bus.
    pub fn watch(&mut self, demuxer: NodeId) -> Result<EngineEvents<E::Pad>> {
        let entry = Self::entry_of(&self.dag, demuxer)?;
        self.engine.watch(&entry.node)
    }

    /// The current graph-level state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Look up a node by name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Whether a node with this name exists in the arena.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// The name of a node.
    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        self.dag.node_weight(id.0).map(|e| e.name.as_str())
    }

    /// The current state of a node.
    pub fn node_state(&self, id: NodeId) -> Option<NodeState> {
        self.dag.node_weight(id.0).map(|e| e.state)
    }

    /// Whether a node has been added to the running graph.
    pub fn is_added(&self, id: NodeId) -> bool {
        self.dag.node_weight(id.0).is_some_and(|e| e.added)
    }

    /// Number of nodes in the arena (added or not).
    pub fn node_count(&self) -> usize {
        self.dag.node_count()
    }

    /// Number of nodes in the running graph.
    pub fn added_count(&self) -> usize {
        self.dag
            .graph()
            .node_indices()
            .filter(|&idx| self.dag.node_weight(idx).is_some_and(|e| e.added))
            .count()
    }

    /// Number of links.
    pub fn link_count(&self) -> usize {
        self.dag.edge_count()
    }

    /// Render the running topology in GraphViz DOT format.
    ///
    /// Nodes that were created but never added are omitted; the output is
    /// purely diagnostic and is never read back.
    pub fn to_dot(&self) -> String {
        use daggy::petgraph::visit::EdgeRef;

        let mut out = String::from("digraph pipeline {\n  rankdir=LR;\n");
        for idx in self.dag.graph().node_indices() {
            let Some(entry) = self.dag.node_weight(idx) else {
                continue;
            };
            if !entry.added {
                continue;
            }
            let _ = writeln!(
                out,
                "  \"{}\" [label=\"{}\\n{} [{}]\"];",
                entry.name,
                entry.name,
                entry.kind.capability(),
                entry.state
            );
        }
        for edge in self.dag.graph().edge_references() {
            let (Some(up), Some(down)) = (
                self.dag.node_weight(edge.source()),
                self.dag.node_weight(edge.target()),
            ) else {
                continue;
            };
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [label=\"{}\"];",
                up.name,
                down.name,
                edge.weight().src_pad
            );
        }
        out.push_str("}\n");
        out
    }

    // Field-scoped lookup so callers can hold an entry borrow while using
    // the engine through a disjoint field borrow.
    fn entry_of(dag: &Dag<NodeEntry<E::Node>, Link>, id: NodeId) -> Result<&NodeEntry<E::Node>> {
        dag.node_weight(id.0)
            .ok_or_else(|| Error::UnknownNode(format!("#{}", id.index())))
    }

    fn entry_mut(&mut self, id: NodeId) -> Result<&mut NodeEntry<E::Node>> {
        self.dag
            .node_weight_mut(id.0)
            .ok_or_else(|| Error::UnknownNode(format!("#{}", id.index())))
    }
}

impl<E: MediaEngine> std::fmt::Debug for PipelineGraph<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("nodes", &self.node_count())
            .field("links", &self.link_count())
            .field("state", &self.state)
            .finish()
    }
}

//! Per-kind processing chain templates.
//!
//! A chain is the ordered processing path for one elementary stream,
//! bracketed by bounded queues so the engine's execution contexts stay
//! decoupled. Exactly two stream templates exist (video and audio) plus the
//! shared sink chain that carries the multiplexed output to the network.
//!
//! Building a chain only creates its nodes; they are added to the running
//! graph and linked later, when the matching stream pad is actually
//! discovered.

use smallvec::SmallVec;

use crate::config::{
    H264ParseConfig, IdentityConfig, NodeConfig, QueueConfig, RtmpSinkConfig,
};
use crate::engine::MediaEngine;
use crate::error::Result;
use crate::pipeline::graph::{NodeId, PipelineGraph};

/// An ordered sequence of nodes forming one processing path.
#[derive(Debug, Clone)]
pub struct Chain {
    nodes: SmallVec<[NodeId; 4]>,
}

impl Chain {
    fn new(nodes: SmallVec<[NodeId; 4]>) -> Self {
        debug_assert!(!nodes.is_empty());
        Self { nodes }
    }

    /// All nodes in dataflow order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The entry node, which a discovered pad links to.
    pub fn head(&self) -> NodeId {
        self.nodes[0]
    }

    /// The exit node, which links to the next stage.
    pub fn tail(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }
}

/// Build the video chain: queue in, H.264 parser, identity, queue out.
///
/// The identity node runs in single-segment mode so every loop iteration
/// lands on one continuous output timeline.
pub fn video_chain<E: MediaEngine>(graph: &mut PipelineGraph<E>) -> Result<Chain> {
    let mut nodes = SmallVec::new();
    nodes.push(graph.create_node("video-queue-in", NodeConfig::Queue(QueueConfig::default()))?);
    nodes.push(graph.create_node(
        "h264-parser",
        NodeConfig::H264Parse(H264ParseConfig::default()),
    )?);
    nodes.push(graph.create_node("identity", NodeConfig::Identity(IdentityConfig::default()))?);
    nodes.push(graph.create_node("video-queue-out", NodeConfig::Queue(QueueConfig::default()))?);
    Ok(Chain::new(nodes))
}

/// Build the audio chain: queue in, AAC parser, queue out.
pub fn audio_chain<E: MediaEngine>(graph: &mut PipelineGraph<E>) -> Result<Chain> {
    let mut nodes = SmallVec::new();
    nodes.push(graph.create_node("audio-queue-in", NodeConfig::Queue(QueueConfig::default()))?);
    nodes.push(graph.create_node("aac-parser", NodeConfig::AacParse)?);
    nodes.push(graph.create_node("audio-queue-out", NodeConfig::Queue(QueueConfig::default()))?);
    Ok(Chain::new(nodes))
}

/// Build the sink chain: queue, network sink.
pub fn sink_chain<E: MediaEngine>(
    graph: &mut PipelineGraph<E>,
    destination: RtmpSinkConfig,
) -> Result<Chain> {
    let mut nodes = SmallVec::new();
    nodes.push(graph.create_node("sink-queue", NodeConfig::Queue(QueueConfig::default()))?);
    nodes.push(graph.create_node("rtmp-sink", NodeConfig::RtmpSink(destination))?);
    Ok(Chain::new(nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedEngine;

    #[test]
    fn test_video_chain_shape() {
        let (engine, _script) = ScriptedEngine::new();
        let mut graph = PipelineGraph::new(engine);
        let chain = video_chain(&mut graph).unwrap();

        assert_eq!(chain.nodes().len(), 4);
        assert_eq!(graph.name_of(chain.head()), Some("video-queue-in"));
        assert_eq!(graph.name_of(chain.tail()), Some("video-queue-out"));
        // Created, not yet part of the running graph.
        assert_eq!(graph.added_count(), 0);
    }

    #[test]
    fn test_audio_chain_shape() {
        let (engine, _script) = ScriptedEngine::new();
        let mut graph = PipelineGraph::new(engine);
        let chain = audio_chain(&mut graph).unwrap();

        assert_eq!(chain.nodes().len(), 3);
        assert_eq!(graph.name_of(chain.head()), Some("audio-queue-in"));
        assert_eq!(graph.name_of(chain.tail()), Some("audio-queue-out"));
    }

    #[test]
    fn test_sink_chain_shape() {
        let (engine, _script) = ScriptedEngine::new();
        let mut graph = PipelineGraph::new(engine);
        let dest = RtmpSinkConfig::parse("rtmp://host/app/stream").unwrap();
        let chain = sink_chain(&mut graph, dest).unwrap();

        assert_eq!(chain.nodes().len(), 2);
        assert_eq!(graph.name_of(chain.tail()), Some("rtmp-sink"));
    }
}

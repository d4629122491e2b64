//! Pipeline construction: the node arena, the element factory, and the
//! per-stream chain templates.
//!
//! # Example
//!
//! ```rust
//! use loopcast::config::NodeConfig;
//! use loopcast::engine::testing::ScriptedEngine;
//! use loopcast::pipeline::PipelineGraph;
//!
//! let (engine, _script) = ScriptedEngine::new();
//! let mut graph = PipelineGraph::new(engine);
//!
//! let src = graph.create_node("file-source", NodeConfig::FileSource(
//!     loopcast::config::FileSourceConfig { path: "input.mp4".into() },
//! ))?;
//! let demux = graph.create_node("demuxer", NodeConfig::Demux)?;
//!
//! graph.add_nodes(&[src, demux])?;
//! graph.link(src, demux)?;
//! # Ok::<(), loopcast::Error>(())
//! ```

pub mod chain;
pub mod factory;
pub mod graph;

pub use chain::{audio_chain, sink_chain, video_chain, Chain};
pub use factory::ElementFactory;
pub use graph::{Link, NodeId, PipelineGraph};

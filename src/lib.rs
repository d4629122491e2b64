//! # Loopcast
//!
//! Turns a finite local media file into an unbounded live stream: the file
//! is demultiplexed into its elementary streams, repackaged into a
//! streaming container and pushed to an RTMP sink, with the bounded play
//! segment re-armed forever so the output never ends.
//!
//! The heavy lifting (demultiplexing, bitstream parsing, multiplexing,
//! network streaming) is done by a media engine behind the
//! [`MediaEngine`](engine::MediaEngine) trait; this crate is the control
//! plane that assembles the engine's opaque processing nodes into a graph
//! at runtime and steers their lifecycle:
//!
//! - streams are discovered asynchronously, and each announcement attaches
//!   the matching processing chain while everything is held paused;
//! - once all streams are known the sink side is wired, a bounded segment
//!   seek is armed and the whole graph starts playing;
//! - every segment completion re-arms the same segment without flushing,
//!   which is what makes the loop seamless;
//! - one single-threaded event loop serializes discovery signals, bus
//!   messages and operator commands until a terminal event, after which a
//!   single teardown pass releases everything.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loopcast::config::LoopConfig;
//! use loopcast::control::ControlLoop;
//! use loopcast::engine::gst::GstEngine;
//!
//! let config = LoopConfig::new("movie.mp4", "rtmp://host/live/stream")?;
//! let engine = GstEngine::new("file-looper")?;
//! let (session, commands) = ControlLoop::build(engine, &config)?;
//! let reason = session.run().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod caps;
pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod pipeline;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::LoopConfig;
    pub use crate::control::{ControlLoop, Shutdown};
    pub use crate::engine::{BusMessage, MediaEngine, NodeState};
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{NodeId, PipelineGraph};
}

pub use error::{Error, Result};

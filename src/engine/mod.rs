//! The media engine boundary.
//!
//! The engine supplies the actual container demultiplexing, bitstream
//! parsing, multiplexing and network streaming as opaque processing nodes.
//! Loopcast only assembles those nodes into a graph and steers their
//! lifecycle, so the whole control plane is written against the
//! [`MediaEngine`] trait:
//!
//! - [`engine::testing`](testing) provides a scripted backend that records
//!   every operation and lets tests inject pad and bus events.
//! - `engine::gst` (behind the `gst` cargo feature) drives a real GStreamer
//!   pipeline and is what the `loopcast` binary runs.
//!
//! Event delivery is channel-based: backends push demultiplexer signals and
//! bus messages into unbounded channels from whatever threads they use
//! internally, and the single control task consumes both ends. No handler
//! ever blocks, and all topology mutation stays on the control task.

use std::fmt;

use tokio::sync::mpsc;

use crate::clock::ClockTime;
use crate::config::NodeConfig;
use crate::error::Result;

pub mod testing;

#[cfg(feature = "gst")]
pub mod gst;

/// Lifecycle state of a node or of the whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeState {
    /// Deactivated, resources released.
    #[default]
    Null,
    /// Allocated but not processing.
    Ready,
    /// Prerolled and holding data, clock stopped.
    Paused,
    /// Actively processing data.
    Playing,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Null => "null",
            NodeState::Ready => "ready",
            NodeState::Paused => "paused",
            NodeState::Playing => "playing",
        };
        write!(f, "{}", name)
    }
}

/// Flags for seek requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeekFlags(u32);

impl SeekFlags {
    /// No special flags.
    pub const NONE: Self = Self(0);
    /// Flush pending data before the seek takes effect.
    pub const FLUSH: Self = Self(1 << 0);
    /// Bounded segment playback: reaching the stop position produces a
    /// [`BusMessage::SegmentDone`] notification instead of end of stream.
    pub const SEGMENT: Self = Self(1 << 1);

    /// Create empty flags.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if contains a flag.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Union of flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A bounded playback request over the source timeline.
#[derive(Debug, Clone)]
pub struct SeekRequest {
    /// Playback rate (1.0 = normal).
    pub rate: f64,
    /// Start of the range.
    pub start: ClockTime,
    /// End of the range, `None` meaning the end of the stream.
    pub stop: Option<ClockTime>,
    /// Seek flags.
    pub flags: SeekFlags,
}

impl SeekRequest {
    /// The initial segment seek: play `[0, end)` in segment mode, flushing
    /// whatever the preroll buffered so playback starts clean.
    pub fn flushing_segment() -> Self {
        Self {
            rate: 1.0,
            start: ClockTime::ZERO,
            stop: None,
            flags: SeekFlags::FLUSH.union(SeekFlags::SEGMENT),
        }
    }

    /// The loop re-arm seek: play `[0, end)` in segment mode without
    /// flushing, so the restart is frame-accurate and downstream never sees
    /// a discontinuity.
    pub fn seamless_segment() -> Self {
        Self {
            rate: 1.0,
            start: ClockTime::ZERO,
            stop: None,
            flags: SeekFlags::SEGMENT,
        }
    }
}

/// A status notification posted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// All data has been played out.
    EndOfStream,
    /// The engine hit an unrecoverable runtime condition.
    Error {
        /// Name of the node that reported the error, if known.
        source: Option<String>,
        /// Human-readable diagnostic.
        message: String,
    },
    /// A bounded segment finished playing.
    SegmentDone,
    /// Anything the dispatcher does not act on.
    Other {
        /// Message kind, for trace logging.
        kind: String,
    },
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusMessage::EndOfStream => write!(f, "end of stream"),
            BusMessage::Error { source, message } => match source {
                Some(node) => write!(f, "error from {}: {}", node, message),
                None => write!(f, "error: {}", message),
            },
            BusMessage::SegmentDone => write!(f, "segment done"),
            BusMessage::Other { kind } => write!(f, "{}", kind),
        }
    }
}

/// A signal from the demultiplexer about stream discovery.
#[derive(Debug)]
pub enum DemuxSignal<P> {
    /// A new elementary stream pad was announced.
    PadAdded {
        /// The engine's opaque pad handle.
        pad: P,
        /// The pad's declared media type, captured at announcement time.
        media_type: String,
    },
    /// Every stream the demultiplexer intends to announce has been announced.
    NoMorePads,
}

/// The receiving ends of an engine's event channels.
pub struct EngineEvents<P> {
    /// Demultiplexer discovery signals.
    pub signals: mpsc::UnboundedReceiver<DemuxSignal<P>>,
    /// Bus messages.
    pub bus: mpsc::UnboundedReceiver<BusMessage>,
}

/// The contract an engine backend fulfils.
///
/// All methods are synchronous and must not block; backends that need their
/// own threads (bus pumping, streaming) keep them internal and communicate
/// through the channels returned by [`MediaEngine::watch`].
pub trait MediaEngine {
    /// Opaque handle to a processing node owned by the engine.
    type Node;
    /// Opaque handle to a dynamically announced stream pad.
    type Pad: Send + 'static;

    /// Create a node for the given configuration.
    ///
    /// Backends report a missing capability as
    /// [`Error::UnavailableCapability`](crate::Error::UnavailableCapability).
    fn create(&mut self, name: &str, config: &NodeConfig) -> Result<Self::Node>;

    /// Add a previously created node to the running graph.
    fn add(&mut self, node: &Self::Node) -> Result<()>;

    /// Link two nodes in dataflow order.
    fn link(&mut self, upstream: &Self::Node, downstream: &Self::Node) -> Result<()>;

    /// Link a dynamically announced pad to a node's input.
    fn link_pad(&mut self, pad: &Self::Pad, downstream: &Self::Node) -> Result<()>;

    /// Change the lifecycle state of one node.
    fn set_state(&mut self, node: &Self::Node, state: NodeState) -> Result<()>;

    /// Change the lifecycle state of the whole graph.
    fn set_pipeline_state(&mut self, state: NodeState) -> Result<()>;

    /// Issue a seek on the whole graph.
    fn seek(&mut self, request: &SeekRequest) -> Result<()>;

    /// Start watching the demultiplexer's discovery signals and the bus.
    ///
    /// Must be called once, before the graph leaves the null state, so no
    /// announcement can be missed.
    fn watch(&mut self, demuxer: &Self::Node) -> Result<EngineEvents<Self::Pad>>;
}

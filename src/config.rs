//! Typed node and session configuration.
//!
//! Every processing node is configured through a strongly-typed struct that
//! is validated when it is constructed, not when individual properties are
//! applied. The engine backend translates a [`NodeConfig`] into whatever
//! declarative property interface its elements expose.

use std::fmt;
use std::path::PathBuf;

use crate::caps::Caps;
use crate::error::{Error, Result};

/// Configuration for the file source node.
#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    /// Path of the container file to read.
    pub path: PathBuf,
}

/// Configuration for a bounded buffering queue.
///
/// Queues decouple the engine's internal execution contexts; their capacity
/// is the only place backpressure is applied, bounding end-to-end memory
/// growth per stream.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of buffers held before upstream is throttled.
    pub max_buffers: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_buffers: 200 }
    }
}

/// Configuration for the H.264 bitstream parser.
#[derive(Debug, Clone)]
pub struct H264ParseConfig {
    /// Interval in seconds at which SPS/PPS headers are re-injected into the
    /// stream (0 disables, -1 re-injects on every IDR frame). Live sinks
    /// need periodic parameter sets so late joiners can decode.
    pub config_interval: i32,
}

impl Default for H264ParseConfig {
    fn default() -> Self {
        Self { config_interval: 1 }
    }
}

/// Configuration for the identity pass-through node.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Collapse all upstream segments into one continuous output segment so
    /// repeated segment playback presents a single unbroken timeline.
    pub single_segment: bool,
    /// Synchronize buffers against the clock before passing them on.
    pub sync: bool,
    /// Suppress per-buffer notifications.
    pub silent: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            single_segment: true,
            sync: true,
            silent: false,
        }
    }
}

/// Configuration for the stream multiplexer.
#[derive(Debug, Clone)]
pub struct FlvMuxConfig {
    /// Emit a streamable output (no seekable index header).
    pub streamable: bool,
}

impl Default for FlvMuxConfig {
    fn default() -> Self {
        Self { streamable: true }
    }
}

/// Configuration for the network sink node.
#[derive(Debug, Clone)]
pub struct RtmpSinkConfig {
    /// Destination address, e.g. `rtmp://host/app/stream`.
    pub location: String,
}

impl RtmpSinkConfig {
    /// Validate and wrap a destination address.
    ///
    /// The address must use the `rtmp://` or `rtmps://` scheme; anything
    /// else is rejected here, before any node exists.
    pub fn parse(location: impl Into<String>) -> Result<Self> {
        let location = location.into();
        if location.starts_with("rtmp://") || location.starts_with("rtmps://") {
            Ok(Self { location })
        } else {
            Err(Error::InvalidConfig(format!(
                "destination '{}' is not an rtmp:// or rtmps:// address",
                location
            )))
        }
    }
}

/// Typed configuration for one processing node.
#[derive(Debug, Clone)]
pub enum NodeConfig {
    /// File source reader.
    FileSource(FileSourceConfig),
    /// Bounded buffering queue.
    Queue(QueueConfig),
    /// Container demultiplexer (MP4/QuickTime).
    Demux,
    /// H.264 bitstream parser.
    H264Parse(H264ParseConfig),
    /// AAC bitstream parser.
    AacParse,
    /// Identity pass-through.
    Identity(IdentityConfig),
    /// FLV stream multiplexer.
    FlvMux(FlvMuxConfig),
    /// RTMP network sink.
    RtmpSink(RtmpSinkConfig),
}

impl NodeConfig {
    /// The kind of node this configuration describes.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::FileSource(_) => NodeKind::FileSource,
            NodeConfig::Queue(_) => NodeKind::Queue,
            NodeConfig::Demux => NodeKind::Demux,
            NodeConfig::H264Parse(_) => NodeKind::H264Parse,
            NodeConfig::AacParse => NodeKind::AacParse,
            NodeConfig::Identity(_) => NodeKind::Identity,
            NodeConfig::FlvMux(_) => NodeKind::FlvMux,
            NodeConfig::RtmpSink(_) => NodeKind::RtmpSink,
        }
    }

    /// The engine capability name used to create this node.
    pub fn capability(&self) -> &'static str {
        self.kind().capability()
    }

    /// The capability class this node accepts, or `None` for sources.
    pub fn input_caps(&self) -> Option<Caps> {
        match self.kind() {
            NodeKind::FileSource => None,
            NodeKind::Queue | NodeKind::Identity => Some(Caps::Any),
            NodeKind::Demux => Some(Caps::Bytes),
            NodeKind::H264Parse => Some(Caps::Video),
            NodeKind::AacParse => Some(Caps::Audio),
            NodeKind::FlvMux => Some(Caps::Elementary),
            NodeKind::RtmpSink => Some(Caps::Muxed),
        }
    }

    /// The capability class this node produces, or `None` for sinks.
    pub fn output_caps(&self) -> Option<Caps> {
        match self.kind() {
            NodeKind::FileSource => Some(Caps::Bytes),
            NodeKind::Queue | NodeKind::Identity => Some(Caps::Any),
            NodeKind::Demux => Some(Caps::Elementary),
            NodeKind::H264Parse => Some(Caps::Video),
            NodeKind::AacParse => Some(Caps::Audio),
            NodeKind::FlvMux => Some(Caps::Muxed),
            NodeKind::RtmpSink => None,
        }
    }
}

/// The kind of a processing node, independent of its configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// File source reader.
    FileSource,
    /// Bounded buffering queue.
    Queue,
    /// Container demultiplexer.
    Demux,
    /// H.264 bitstream parser.
    H264Parse,
    /// AAC bitstream parser.
    AacParse,
    /// Identity pass-through.
    Identity,
    /// FLV stream multiplexer.
    FlvMux,
    /// RTMP network sink.
    RtmpSink,
}

impl NodeKind {
    /// The engine capability name for this kind.
    pub fn capability(self) -> &'static str {
        match self {
            NodeKind::FileSource => "filesrc",
            NodeKind::Queue => "queue",
            NodeKind::Demux => "qtdemux",
            NodeKind::H264Parse => "h264parse",
            NodeKind::AacParse => "aacparse",
            NodeKind::Identity => "identity",
            NodeKind::FlvMux => "flvmux",
            NodeKind::RtmpSink => "rtmpsink",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.capability())
    }
}

/// Configuration for one looping session.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Path of the source container file.
    pub input: PathBuf,
    /// Validated network destination.
    pub destination: RtmpSinkConfig,
    /// Where to write the one-shot topology snapshot after finalization.
    pub dot_snapshot: Option<PathBuf>,
}

impl LoopConfig {
    /// Build a session configuration, validating the destination address.
    pub fn new(input: impl Into<PathBuf>, destination: impl Into<String>) -> Result<Self> {
        Ok(Self {
            input: input.into(),
            destination: RtmpSinkConfig::parse(destination)?,
            dot_snapshot: None,
        })
    }

    /// Request a DOT topology snapshot after finalization.
    pub fn with_dot_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.dot_snapshot = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_schemes() {
        assert!(RtmpSinkConfig::parse("rtmp://example.com/live/stream").is_ok());
        assert!(RtmpSinkConfig::parse("rtmps://example.com/live/stream").is_ok());
        assert!(RtmpSinkConfig::parse("http://example.com/live").is_err());
        assert!(RtmpSinkConfig::parse("").is_err());
    }

    #[test]
    fn test_capability_names() {
        let cfg = NodeConfig::Queue(QueueConfig::default());
        assert_eq!(cfg.capability(), "queue");
        assert_eq!(NodeKind::Demux.capability(), "qtdemux");
    }

    #[test]
    fn test_source_and_sink_caps() {
        let src = NodeConfig::FileSource(FileSourceConfig {
            path: PathBuf::from("a.mp4"),
        });
        assert!(src.input_caps().is_none());
        assert_eq!(src.output_caps(), Some(Caps::Bytes));

        let sink = NodeConfig::RtmpSink(RtmpSinkConfig {
            location: "rtmp://host/app".into(),
        });
        assert!(sink.output_caps().is_none());
        assert_eq!(sink.input_caps(), Some(Caps::Muxed));
    }

    #[test]
    fn test_loop_config_rejects_bad_destination() {
        assert!(LoopConfig::new("in.mp4", "udp://host:1234").is_err());
    }
}

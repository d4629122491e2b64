//! Stream classification and link-compatibility classes.
//!
//! Two closely related concerns live here:
//!
//! - [`StreamKind`]: a closed classification of the media type announced on a
//!   discovered stream pad, produced by [`classify`]. Callers branch
//!   exhaustively over the variants instead of inspecting type strings.
//! - [`Caps`]: the coarse capability class a node accepts or produces, used
//!   to validate links at assembly time.

use std::fmt;

/// Classification of a discovered elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// An H.264 video elementary stream.
    Video,
    /// An audio elementary stream.
    Audio,
    /// Anything the chain templates cannot handle.
    Unsupported,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Classify a pad's declared media type.
///
/// Any `audio/*` type maps to [`StreamKind::Audio`]; the `video/x-h264`
/// family maps to [`StreamKind::Video`]. Everything else is
/// [`StreamKind::Unsupported`] and is left unlinked by the assembler.
pub fn classify(media_type: &str) -> StreamKind {
    if media_type.starts_with("audio/") {
        StreamKind::Audio
    } else if media_type.starts_with("video/x-h264") {
        StreamKind::Video
    } else {
        StreamKind::Unsupported
    }
}

/// Coarse capability class for link validation.
///
/// Each node declares what it accepts and produces; linking checks that the
/// downstream input class accepts the upstream output class. This is a
/// deliberately closed, coarse model: fine-grained format negotiation is the
/// engine's job, the graph only rejects links that can never make sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caps {
    /// Accepts or produces anything (queues, identity).
    Any,
    /// Raw byte stream from a source.
    Bytes,
    /// An H.264 video elementary stream.
    Video,
    /// An audio elementary stream.
    Audio,
    /// Any elementary stream (a muxer input).
    Elementary,
    /// A multiplexed output stream.
    Muxed,
}

impl Caps {
    /// Check whether a downstream input of this class accepts an upstream
    /// output of class `offered`.
    pub fn accepts(self, offered: Caps) -> bool {
        match (self, offered) {
            (Caps::Any, _) | (_, Caps::Any) => true,
            (Caps::Elementary, Caps::Video) | (Caps::Elementary, Caps::Audio) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Caps::Any => "any",
            Caps::Bytes => "bytes",
            Caps::Video => "video",
            Caps::Audio => "audio",
            Caps::Elementary => "elementary",
            Caps::Muxed => "muxed",
        };
        write!(f, "{}", name)
    }
}

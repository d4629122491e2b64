//! Error types for Loopcast.

use thiserror::Error;

/// Result type alias using Loopcast's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Loopcast operations.
///
/// Only [`Error::UnavailableCapability`] and [`Error::PipelineConstruction`]
/// abort the process. Every condition that arises after the graph exists
/// either degrades locally or routes through the single orderly shutdown
/// path.
#[derive(Error, Debug)]
pub enum Error {
    /// The media engine cannot supply a required processing capability.
    #[error("capability '{capability}' is not available in the media engine")]
    UnavailableCapability {
        /// Name of the missing capability.
        capability: String,
    },

    /// The pipeline root (or another load-bearing object) could not be created.
    #[error("pipeline could not be constructed: {0}")]
    PipelineConstruction(String),

    /// A configuration value was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A node handle does not resolve to a node in the graph.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A node was added to the running graph twice.
    #[error("node '{0}' is already part of the running graph")]
    AlreadyAdded(String),

    /// The operation requires the node to be in the running graph.
    #[error("node '{0}' has not been added to the running graph")]
    NotAdded(String),

    /// Two nodes cannot be linked.
    #[error("cannot link '{from}' to '{to}': {reason}")]
    IncompatibleLink {
        /// Upstream node name.
        from: String,
        /// Downstream node name.
        to: String,
        /// Why the link was refused.
        reason: String,
    },

    /// A node was asked to play before it was linked into the graph.
    #[error("node '{0}' cannot reach the playing state before it is linked")]
    NotLinked(String),

    /// The engine rejected a seek request.
    #[error("seek rejected by the media engine: {0}")]
    SeekFailed(String),

    /// An error reported by the engine backend.
    #[error("media engine error: {0}")]
    Engine(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

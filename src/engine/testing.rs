//! A scripted engine backend for tests.
//!
//! [`ScriptedEngine`] performs no media processing at all: it records every
//! control operation in an ordered trace and exposes a paired
//! [`EngineScript`] handle through which a test injects pad announcements,
//! bus messages and seek failures. Assertions are then made against the
//! trace, which captures the exact order of graph mutations and state
//! transitions.
//!
//! # Example
//!
//! ```rust
//! use loopcast::engine::testing::{EngineOp, ScriptedEngine};
//! use loopcast::engine::MediaEngine;
//! use loopcast::config::NodeConfig;
//!
//! let (mut engine, script) = ScriptedEngine::new();
//! let demux = engine.create("demuxer", &NodeConfig::Demux).unwrap();
//! engine.add(&demux).unwrap();
//!
//! assert_eq!(
//!     script.ops(),
//!     vec![
//!         EngineOp::Create { name: "demuxer".into(), capability: "qtdemux".into() },
//!         EngineOp::Add { name: "demuxer".into() },
//!     ]
//! );
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::config::{NodeConfig, NodeKind};
use crate::error::{Error, Result};
use super::{
    BusMessage, DemuxSignal, EngineEvents, MediaEngine, NodeState, SeekFlags, SeekRequest,
};

/// One recorded control operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    /// A node was created.
    Create {
        /// Node name.
        name: String,
        /// Requested capability.
        capability: String,
    },
    /// A node was added to the running graph.
    Add {
        /// Node name.
        name: String,
    },
    /// Two nodes were linked.
    Link {
        /// Upstream node name.
        from: String,
        /// Downstream node name.
        to: String,
    },
    /// A discovered pad was linked to a node.
    LinkPad {
        /// Media type declared on the pad.
        media_type: String,
        /// Downstream node name.
        to: String,
    },
    /// A single node changed state.
    SetState {
        /// Node name.
        name: String,
        /// Target state.
        state: NodeState,
    },
    /// The whole graph changed state.
    SetPipelineState {
        /// Target state.
        state: NodeState,
    },
    /// A seek was accepted.
    Seek {
        /// Whether the FLUSH flag was set.
        flushing: bool,
        /// Whether the SEGMENT flag was set.
        segment: bool,
        /// Start of the range in nanoseconds.
        start_ns: u64,
        /// End of the range in nanoseconds, `None` meaning stream end.
        stop_ns: Option<u64>,
    },
}

/// A node handle produced by the scripted engine.
#[derive(Debug, Clone)]
pub struct ScriptedNode {
    name: String,
    kind: NodeKind,
}

impl ScriptedNode {
    /// The node's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
}

/// A pad handle produced by the scripted engine.
#[derive(Debug, Clone)]
pub struct ScriptedPad {
    media_type: String,
}

impl ScriptedPad {
    /// Create a free-standing pad handle, for tests that call assembly
    /// entry points directly instead of going through the signal channel.
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
        }
    }

    /// The media type this pad was injected with.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }
}

#[derive(Default)]
struct Shared {
    ops: Mutex<Vec<EngineOp>>,
    seek_failures: AtomicUsize,
}

impl Shared {
    fn snapshot(&self) -> Vec<EngineOp> {
        self.ops.lock().expect("ops lock poisoned").clone()
    }
}

/// Scripted engine backend. See the module documentation.
pub struct ScriptedEngine {
    shared: Arc<Shared>,
    refuse: HashSet<NodeKind>,
    events: Option<EngineEvents<ScriptedPad>>,
}

/// Test-side handle paired with a [`ScriptedEngine`].
///
/// Keeps the event channels open for injection; dropping it closes them.
pub struct EngineScript {
    shared: Arc<Shared>,
    signals: mpsc::UnboundedSender<DemuxSignal<ScriptedPad>>,
    bus: mpsc::UnboundedSender<BusMessage>,
}

impl ScriptedEngine {
    /// Create an engine and its paired script handle.
    pub fn new() -> (Self, EngineScript) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let engine = Self {
            shared: Arc::clone(&shared),
            refuse: HashSet::new(),
            events: Some(EngineEvents {
                signals: signal_rx,
                bus: bus_rx,
            }),
        };
        let script = EngineScript {
            shared,
            signals: signal_tx,
            bus: bus_tx,
        };
        (engine, script)
    }

    /// Refuse to create nodes of the given kind, as an engine missing that
    /// capability would.
    pub fn refuse(mut self, kind: NodeKind) -> Self {
        self.refuse.insert(kind);
        self
    }

    fn record(&self, op: EngineOp) {
        self.shared.ops.lock().expect("ops lock poisoned").push(op);
    }
}

impl MediaEngine for ScriptedEngine {
    type Node = ScriptedNode;
    type Pad = ScriptedPad;

    fn create(&mut self, name: &str, config: &NodeConfig) -> Result<Self::Node> {
        let kind = config.kind();
        if self.refuse.contains(&kind) {
            return Err(Error::UnavailableCapability {
                capability: config.capability().to_string(),
            });
        }
        self.record(EngineOp::Create {
            name: name.to_string(),
            capability: config.capability().to_string(),
        });
        Ok(ScriptedNode {
            name: name.to_string(),
            kind,
        })
    }

    fn add(&mut self, node: &Self::Node) -> Result<()> {
        self.record(EngineOp::Add {
            name: node.name.clone(),
        });
        Ok(())
    }

    fn link(&mut self, upstream: &Self::Node, downstream: &Self::Node) -> Result<()> {
        self.record(EngineOp::Link {
            from: upstream.name.clone(),
            to: downstream.name.clone(),
        });
        Ok(())
    }

    fn link_pad(&mut self, pad: &Self::Pad, downstream: &Self::Node) -> Result<()> {
        self.record(EngineOp::LinkPad {
            media_type: pad.media_type.clone(),
            to: downstream.name.clone(),
        });
        Ok(())
    }

    fn set_state(&mut self, node: &Self::Node, state: NodeState) -> Result<()> {
        self.record(EngineOp::SetState {
            name: node.name.clone(),
            state,
        });
        Ok(())
    }

    fn set_pipeline_state(&mut self, state: NodeState) -> Result<()> {
        self.record(EngineOp::SetPipelineState { state });
        Ok(())
    }

    fn seek(&mut self, request: &SeekRequest) -> Result<()> {
        let failures = &self.shared.seek_failures;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::SeekFailed("scripted seek failure".into()));
        }
        self.record(EngineOp::Seek {
            flushing: request.flags.contains(SeekFlags::FLUSH),
            segment: request.flags.contains(SeekFlags::SEGMENT),
            start_ns: request.start.nanos(),
            stop_ns: request.stop.map(|t| t.nanos()),
        });
        Ok(())
    }

    fn watch(&mut self, _demuxer: &Self::Node) -> Result<EngineEvents<Self::Pad>> {
        self.events
            .take()
            .ok_or_else(|| Error::Engine("engine events already taken".into()))
    }
}

impl EngineScript {
    /// Announce a new stream pad with the given media type.
    pub fn add_pad(&self, media_type: &str) {
        let _ = self.signals.send(DemuxSignal::PadAdded {
            pad: ScriptedPad {
                media_type: media_type.to_string(),
            },
            media_type: media_type.to_string(),
        });
    }

    /// Signal that all pads have been announced.
    pub fn no_more_pads(&self) {
        let _ = self.signals.send(DemuxSignal::NoMorePads);
    }

    /// Post a bus message.
    pub fn post(&self, message: BusMessage) {
        let _ = self.bus.send(message);
    }

    /// Make the next `n` seek requests fail.
    pub fn fail_next_seeks(&self, n: usize) {
        self.shared.seek_failures.store(n, Ordering::SeqCst);
    }

    /// Snapshot of the recorded operation trace.
    pub fn ops(&self) -> Vec<EngineOp> {
        self.shared.snapshot()
    }

    /// Give up the injection channels, keeping only the operation trace.
    ///
    /// Closing the channels this way simulates an engine whose event
    /// sources vanish while the trace stays observable.
    pub fn into_trace(self) -> EngineTrace {
        EngineTrace {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Trace-only view of a scripted engine, with the event channels closed.
pub struct EngineTrace {
    shared: Arc<Shared>,
}

impl EngineTrace {
    /// Snapshot of the recorded operation trace.
    pub fn ops(&self) -> Vec<EngineOp> {
        self.shared.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;

    #[test]
    fn test_records_operations_in_order() {
        let (mut engine, script) = ScriptedEngine::new();
        let q = engine
            .create("source-queue", &NodeConfig::Queue(QueueConfig::default()))
            .unwrap();
        engine.add(&q).unwrap();
        engine.set_state(&q, NodeState::Paused).unwrap();

        let ops = script.ops();
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[2], EngineOp::SetState { state: NodeState::Paused, .. }));
    }

    #[test]
    fn test_refused_capability() {
        let (engine, script) = ScriptedEngine::new();
        let mut engine = engine.refuse(NodeKind::Demux);
        let err = engine.create("demuxer", &NodeConfig::Demux).unwrap_err();
        match err {
            Error::UnavailableCapability { capability } => assert_eq!(capability, "qtdemux"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(script.ops().is_empty());
    }

    #[test]
    fn test_seek_failure_injection() {
        let (mut engine, script) = ScriptedEngine::new();
        script.fail_next_seeks(1);
        assert!(engine.seek(&SeekRequest::seamless_segment()).is_err());
        assert!(engine.seek(&SeekRequest::seamless_segment()).is_ok());
        assert_eq!(script.ops().len(), 1);
    }

    #[test]
    fn test_watch_is_single_shot() {
        let (mut engine, _script) = ScriptedEngine::new();
        let demux = engine.create("demuxer", &NodeConfig::Demux).unwrap();
        assert!(engine.watch(&demux).is_ok());
        assert!(engine.watch(&demux).is_err());
    }
}

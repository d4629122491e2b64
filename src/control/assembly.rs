//! Incremental graph assembly driven by stream discovery.
//!
//! The demultiplexer announces elementary streams at unpredictable times
//! after preroll begins. The [`StreamAssembler`] reacts to each
//! announcement by attaching the matching processing chain, and to the
//! final "no more pads" signal by wiring the sink side, arming the first
//! segment and releasing the whole graph into playback.
//!
//! Everything new is brought up paused and only the finalizer transitions
//! the graph to playing. Elements start exchanging data as soon as they are
//! playing with a complete link path, so assembling while paused is what
//! guarantees no data is dropped or misrouted mid-wiring, and that the
//! multiplexer never sees a stream whose chain is still being built.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::caps::{classify, StreamKind};
use crate::engine::{MediaEngine, NodeState, SeekRequest};
use crate::error::Result;
use crate::pipeline::{Chain, NodeId, PipelineGraph};

/// Assembly progress of one stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    /// No pad of this kind seen yet.
    Unknown,
    /// A pad was classified but its chain is not (or could not be) wired.
    Discovered,
    /// The chain is wired end to end.
    Linked,
}

#[derive(Debug)]
struct StreamSlot {
    chain: Chain,
    state: LinkState,
}

impl StreamSlot {
    fn new(chain: Chain) -> Self {
        Self {
            chain,
            state: LinkState::Unknown,
        }
    }
}

/// Reacts to stream discovery and completes the graph.
#[derive(Debug)]
pub struct StreamAssembler {
    demux: NodeId,
    mux: NodeId,
    video: StreamSlot,
    audio: StreamSlot,
    sink: Chain,
    mux_added: bool,
    finalized: bool,
    dot_snapshot: Option<PathBuf>,
}

impl StreamAssembler {
    /// Build an assembler over pre-created (not yet added) nodes.
    pub fn new(
        demux: NodeId,
        mux: NodeId,
        video: Chain,
        audio: Chain,
        sink: Chain,
        dot_snapshot: Option<PathBuf>,
    ) -> Self {
        Self {
            demux,
            mux,
            video: StreamSlot::new(video),
            audio: StreamSlot::new(audio),
            sink,
            mux_added: false,
            finalized: false,
            dot_snapshot,
        }
    }

    /// Whether the finalizer has run.
    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Handle one announced stream pad.
    ///
    /// Never fails: an unsupported or unlinkable pad is logged and left
    /// unlinked while every other stream keeps going.
    pub fn handle_pad<E: MediaEngine>(
        &mut self,
        graph: &mut PipelineGraph<E>,
        pad: &E::Pad,
        media_type: &str,
    ) {
        if let Err(err) = self.ensure_muxer(graph) {
            warn!(%err, media_type, "could not insert the muxer; abandoning pad");
            return;
        }

        let slot = match classify(media_type) {
            StreamKind::Video => &mut self.video,
            StreamKind::Audio => &mut self.audio,
            StreamKind::Unsupported => {
                warn!(media_type, "unsupported stream kind; pad left unlinked");
                return;
            }
        };

        if slot.state == LinkState::Linked {
            debug!(media_type, "chain already linked; ignoring duplicate pad");
            return;
        }
        slot.state = LinkState::Discovered;

        let chain = slot.chain.clone();
        match Self::attach(graph, pad, self.demux, &chain, self.mux, media_type) {
            Ok(()) => {
                slot.state = LinkState::Linked;
                info!(media_type, "stream chain linked");
            }
            Err(err) => {
                warn!(%err, media_type, "failed to attach stream chain; abandoning pad");
            }
        }
    }

    /// Handle the "all streams announced" signal.
    ///
    /// Wires the sink side, arms the first bounded segment and releases the
    /// graph into playback. Failures here are fatal for the session and are
    /// propagated to the dispatcher.
    pub fn finalize<E: MediaEngine>(&mut self, graph: &mut PipelineGraph<E>) -> Result<()> {
        if self.finalized {
            warn!("all-streams signal received again after finalization; ignoring");
            return Ok(());
        }

        // A container with zero supported streams still gets a complete
        // muxer-to-sink path; the bus will report the empty playback.
        self.ensure_muxer(graph)?;

        graph.add_nodes(self.sink.nodes())?;
        for &id in self.sink.nodes() {
            graph.set_node_state(id, NodeState::Paused)?;
        }
        graph.link(self.mux, self.sink.head())?;
        graph.link_chain(self.sink.nodes())?;

        graph.seek(&SeekRequest::flushing_segment())?;
        graph.set_state(NodeState::Playing)?;
        self.finalized = true;
        info!("pipeline playing");

        if let Some(path) = self.dot_snapshot.take() {
            match std::fs::write(&path, graph.to_dot()) {
                Ok(()) => debug!(path = %path.display(), "wrote topology snapshot"),
                Err(err) => warn!(%err, path = %path.display(), "could not write topology snapshot"),
            }
        }
        Ok(())
    }

    /// Insert the muxer into the running graph exactly once.
    fn ensure_muxer<E: MediaEngine>(&mut self, graph: &mut PipelineGraph<E>) -> Result<()> {
        if self.mux_added {
            return Ok(());
        }
        graph.add_node(self.mux)?;
        graph.set_node_state(self.mux, NodeState::Paused)?;
        self.mux_added = true;
        Ok(())
    }

    fn attach<E: MediaEngine>(
        graph: &mut PipelineGraph<E>,
        pad: &E::Pad,
        demux: NodeId,
        chain: &Chain,
        mux: NodeId,
        media_type: &str,
    ) -> Result<()> {
        graph.add_nodes(chain.nodes())?;
        graph.link_chain(chain.nodes())?;
        graph.link(chain.tail(), mux)?;
        graph.link_pad(pad, demux, chain.head(), media_type)?;
        for &id in chain.nodes() {
            graph.set_node_state(id, NodeState::Paused)?;
        }
        Ok(())
    }
}

//! The single-threaded control loop.
//!
//! One cooperative task multiplexes the three event sources of a session:
//! demultiplexer discovery signals, bus messages and operator commands.
//! Handlers never block and all graph topology mutation happens from this
//! one task, which is exactly the serialization the engine's own state
//! locking requires.
//!
//! Shutdown is cooperative: a terminal event makes the loop exit after the
//! current handler returns, and teardown then drives the graph to the null
//! state in one pass regardless of which event ended the session.

pub mod assembly;
pub mod looper;

pub use assembly::StreamAssembler;
pub use looper::LoopController;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::{FileSourceConfig, FlvMuxConfig, LoopConfig, NodeConfig, QueueConfig};
use crate::engine::{BusMessage, DemuxSignal, EngineEvents, MediaEngine, NodeState};
use crate::error::Result;
use crate::pipeline::{audio_chain, sink_chain, video_chain, PipelineGraph};

/// Why the control loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The operator asked to quit.
    Operator,
    /// The engine played all data out.
    EndOfStream,
    /// The engine reported an unrecoverable runtime error.
    EngineError,
}

/// What to do after handling one event.
enum Flow {
    Continue,
    Stop(Shutdown),
}

/// A fully wired looping session, ready to run.
pub struct ControlLoop<E: MediaEngine> {
    graph: PipelineGraph<E>,
    assembler: StreamAssembler,
    looper: LoopController,
    events: EngineEvents<E::Pad>,
    commands: mpsc::UnboundedReceiver<String>,
}

impl<E: MediaEngine> std::fmt::Debug for ControlLoop<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlLoop").finish_non_exhaustive()
    }
}

impl<E: MediaEngine> ControlLoop<E> {
    /// Construct the static part of the pipeline and wire all event sources.
    ///
    /// Every node is created up front so a missing capability fails the
    /// session before anything runs. Only the source side (file source,
    /// queue, demultiplexer) joins the running graph here; the chains, the
    /// muxer and the sink side wait for stream discovery. Returns the
    /// session and the sender for operator command lines.
    pub fn build(
        engine: E,
        config: &LoopConfig,
    ) -> Result<(Self, mpsc::UnboundedSender<String>)> {
        let mut graph = PipelineGraph::new(engine);

        let source = graph.create_node(
            "file-source",
            NodeConfig::FileSource(FileSourceConfig {
                path: config.input.clone(),
            }),
        )?;
        let source_queue =
            graph.create_node("source-queue", NodeConfig::Queue(QueueConfig::default()))?;
        let demux = graph.create_node("demuxer", NodeConfig::Demux)?;
        let mux = graph.create_node("muxer", NodeConfig::FlvMux(FlvMuxConfig::default()))?;
        let video = video_chain(&mut graph)?;
        let audio = audio_chain(&mut graph)?;
        let sink = sink_chain(&mut graph, config.destination.clone())?;

        graph.add_nodes(&[source, source_queue, demux])?;
        graph.link_chain(&[source, source_queue, demux])?;

        // Watch before leaving the null state so no announcement is missed,
        // then pause the graph to start preroll and discovery.
        let events = graph.watch(demux)?;
        graph.set_state(NodeState::Paused)?;

        let assembler = StreamAssembler::new(
            demux,
            mux,
            video,
            audio,
            sink,
            config.dot_snapshot.clone(),
        );
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                graph,
                assembler,
                looper: LoopController::new(),
                events,
                commands: commands_rx,
            },
            commands_tx,
        ))
    }

    /// Run until a terminal event, then tear the graph down.
    ///
    /// Returns the shutdown reason; the engine error path and the clean
    /// paths release resources identically.
    pub async fn run(self) -> Result<Shutdown> {
        let ControlLoop {
            mut graph,
            mut assembler,
            mut looper,
            mut events,
            mut commands,
        } = self;

        info!("running");
        let mut signals_open = true;
        let mut bus_open = true;
        let mut commands_open = true;

        let reason = loop {
            if !signals_open && !bus_open && !commands_open {
                error!("all event sources closed; shutting down");
                break Shutdown::EngineError;
            }
            tokio::select! {
                // Deterministic priority: wire announced streams before
                // acting on anything that arrived later.
                biased;

                signal = events.signals.recv(), if signals_open => match signal {
                    Some(DemuxSignal::PadAdded { pad, media_type }) => {
                        assembler.handle_pad(&mut graph, &pad, &media_type);
                    }
                    Some(DemuxSignal::NoMorePads) => {
                        if let Err(err) = assembler.finalize(&mut graph) {
                            error!(%err, "could not finalize the graph");
                            break Shutdown::EngineError;
                        }
                    }
                    None => signals_open = false,
                },
                message = events.bus.recv(), if bus_open => match message {
                    Some(message) => match dispatch(&mut graph, &mut looper, message) {
                        Flow::Continue => {}
                        Flow::Stop(reason) => break reason,
                    },
                    None => bus_open = false,
                },
                line = commands.recv(), if commands_open => match line {
                    Some(line) => match operator_flow(&line) {
                        Flow::Continue => {}
                        Flow::Stop(reason) => break reason,
                    },
                    None => commands_open = false,
                },
            }
        };

        teardown(&mut graph);
        Ok(reason)
    }
}

/// Turn one bus message into a control action.
fn dispatch<E: MediaEngine>(
    graph: &mut PipelineGraph<E>,
    looper: &mut LoopController,
    message: BusMessage,
) -> Flow {
    match message {
        BusMessage::EndOfStream => {
            info!("end of stream received");
            Flow::Stop(Shutdown::EndOfStream)
        }
        BusMessage::Error { source, message } => {
            error!(source = ?source, detail = %message, "engine reported an error");
            Flow::Stop(Shutdown::EngineError)
        }
        BusMessage::SegmentDone => {
            debug!("segment done received");
            looper.on_segment_done(graph);
            Flow::Continue
        }
        BusMessage::Other { kind } => {
            trace!(kind = %kind, "ignoring bus message");
            Flow::Continue
        }
    }
}

/// Turn one operator input line into a control action.
///
/// Only the first character matters, case-folded; everything else is a
/// no-op so stray input never disturbs a running session.
fn operator_flow(line: &str) -> Flow {
    match line.chars().next() {
        Some(c) if c.eq_ignore_ascii_case(&'q') => {
            info!("shutdown requested by operator");
            Flow::Stop(Shutdown::Operator)
        }
        _ => Flow::Continue,
    }
}

/// Drive every node to the null state and release the graph.
fn teardown<E: MediaEngine>(graph: &mut PipelineGraph<E>) {
    info!("stopping pipeline");
    if let Err(err) = graph.set_state(NodeState::Null) {
        warn!(%err, "pipeline did not reach the null state cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineOp, ScriptedEngine};

    fn config() -> LoopConfig {
        LoopConfig::new("input.mp4", "rtmp://host/app/stream").unwrap()
    }

    #[test]
    fn test_operator_flow_parsing() {
        assert!(matches!(operator_flow("q"), Flow::Stop(Shutdown::Operator)));
        assert!(matches!(
            operator_flow("Quit now"),
            Flow::Stop(Shutdown::Operator)
        ));
        assert!(matches!(operator_flow(""), Flow::Continue));
        assert!(matches!(operator_flow("pause"), Flow::Continue));
        assert!(matches!(operator_flow(" q"), Flow::Continue));
    }

    #[test]
    fn test_dispatch_table() {
        let (engine, _script) = ScriptedEngine::new();
        let mut graph = PipelineGraph::new(engine);
        let mut looper = LoopController::new();

        assert!(matches!(
            dispatch(&mut graph, &mut looper, BusMessage::EndOfStream),
            Flow::Stop(Shutdown::EndOfStream)
        ));
        assert!(matches!(
            dispatch(
                &mut graph,
                &mut looper,
                BusMessage::Error {
                    source: None,
                    message: "boom".into()
                }
            ),
            Flow::Stop(Shutdown::EngineError)
        ));
        assert!(matches!(
            dispatch(&mut graph, &mut looper, BusMessage::SegmentDone),
            Flow::Continue
        ));
        assert_eq!(looper.cycles(), 1);
        assert!(matches!(
            dispatch(
                &mut graph,
                &mut looper,
                BusMessage::Other {
                    kind: "state-changed".into()
                }
            ),
            Flow::Continue
        ));
    }

    #[test]
    fn test_build_wires_source_side_only() {
        let (engine, script) = ScriptedEngine::new();
        let (_control, _commands) = ControlLoop::build(engine, &config()).unwrap();

        let ops = script.ops();
        // Thirteen nodes exist up front so capability failures are caught
        // before anything runs.
        let creates = ops
            .iter()
            .filter(|op| matches!(op, EngineOp::Create { .. }))
            .count();
        assert_eq!(creates, 13);

        // Only the source side joined the running graph.
        let added: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                EngineOp::Add { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec!["file-source", "source-queue", "demuxer"]);

        // Preroll was requested.
        assert!(ops.contains(&EngineOp::SetPipelineState {
            state: NodeState::Paused
        }));
    }

    #[test]
    fn test_build_fails_fast_on_missing_capability() {
        let (engine, script) = ScriptedEngine::new();
        let engine = engine.refuse(crate::config::NodeKind::FlvMux);
        let err = ControlLoop::build(engine, &config()).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::UnavailableCapability { .. }
        ));
        // Nothing joined the running graph and nothing changed state.
        assert!(!script.ops().iter().any(|op| matches!(
            op,
            EngineOp::Add { .. } | EngineOp::SetPipelineState { .. }
        )));
    }

    #[tokio::test]
    async fn test_operator_quit_ends_session() {
        let (engine, script) = ScriptedEngine::new();
        let (control, commands) = ControlLoop::build(engine, &config()).unwrap();
        let session = tokio::spawn(control.run());

        script.add_pad("video/x-h264");
        script.no_more_pads();
        commands.send("q".to_string()).unwrap();

        let reason = session.await.unwrap().unwrap();
        assert_eq!(reason, Shutdown::Operator);

        // Teardown ran exactly once.
        let nulls = script
            .ops()
            .iter()
            .filter(|op| matches!(
                op,
                EngineOp::SetPipelineState {
                    state: NodeState::Null
                }
            ))
            .count();
        assert_eq!(nulls, 1);
    }
}

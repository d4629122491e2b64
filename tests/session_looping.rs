//! Integration tests for the looping policy and shutdown paths.

use std::time::Duration;

use loopcast::config::LoopConfig;
use loopcast::control::{ControlLoop, Shutdown};
use loopcast::engine::testing::{EngineOp, EngineScript, ScriptedEngine};
use loopcast::engine::{BusMessage, NodeState};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::timeout;

type Session = JoinHandle<loopcast::Result<Shutdown>>;

fn start() -> (Session, EngineScript, UnboundedSender<String>) {
    let (engine, script) = ScriptedEngine::new();
    let config = LoopConfig::new("movie.mp4", "rtmp://host/live/stream").unwrap();
    let (session, commands) = ControlLoop::build(engine, &config).unwrap();
    (tokio::spawn(session.run()), script, commands)
}

async fn finish(session: Session) -> Shutdown {
    timeout(Duration::from_secs(5), session)
        .await
        .expect("session did not end in time")
        .expect("session task panicked")
        .expect("session returned an error")
}

/// Announce both streams and bring the session into playback.
async fn play(script: &EngineScript) {
    script.add_pad("video/x-h264");
    script.add_pad("audio/mpeg");
    script.no_more_pads();
    // Let the session drain the discovery signals before anything else is
    // injected.
    tokio::task::yield_now().await;
}

fn seeks(ops: &[EngineOp]) -> Vec<&EngineOp> {
    ops.iter()
        .filter(|op| matches!(op, EngineOp::Seek { .. }))
        .collect()
}

/// N segment completions produce exactly N re-arms, each targeting the
/// same whole-file range without flushing.
#[tokio::test]
async fn test_each_segment_done_rearms_the_same_range() {
    let (session, script, commands) = start();
    play(&script).await;

    const LOOPS: usize = 5;
    for _ in 0..LOOPS {
        script.post(BusMessage::SegmentDone);
    }
    commands.send("q".to_string()).unwrap();
    finish(session).await;

    let ops = script.ops();
    let seeks = seeks(&ops);
    assert_eq!(seeks.len(), 1 + LOOPS);
    for seek in &seeks[1..] {
        assert_eq!(
            **seek,
            EngineOp::Seek {
                flushing: false,
                segment: true,
                start_ns: 0,
                stop_ns: None,
            }
        );
    }
}

/// Looping does not grow the graph: after finalization no node is created,
/// added or linked again no matter how many cycles pass.
#[tokio::test]
async fn test_looping_does_not_grow_the_graph() {
    let (session, script, commands) = start();
    play(&script).await;
    let ops_after_finalize = script.ops().len();

    for _ in 0..25 {
        script.post(BusMessage::SegmentDone);
    }
    commands.send("q".to_string()).unwrap();
    finish(session).await;

    let ops = script.ops();
    // One op per cycle (the re-arm seek) plus the final teardown.
    assert_eq!(ops.len(), ops_after_finalize + 25 + 1);
    assert!(!ops[ops_after_finalize..].iter().any(|op| matches!(
        op,
        EngineOp::Create { .. } | EngineOp::Add { .. } | EngineOp::Link { .. }
    )));
}

/// A rejected re-arm is tolerated; the next segment boundary retries it.
#[tokio::test]
async fn test_rejected_rearm_retries_at_next_boundary() {
    let (session, script, commands) = start();
    play(&script).await;

    script.fail_next_seeks(1);
    script.post(BusMessage::SegmentDone);
    script.post(BusMessage::SegmentDone);
    commands.send("q".to_string()).unwrap();

    assert_eq!(finish(session).await, Shutdown::Operator);
    let ops = script.ops();
    // The failed re-arm never reached the trace: one initial seek plus the
    // single successful retry.
    assert_eq!(seeks(&ops).len(), 2);
}

/// An engine error ends the loop and the graph reaches null exactly once.
#[tokio::test]
async fn test_engine_error_tears_down_once() {
    let (session, script, _commands) = start();
    play(&script).await;

    script.post(BusMessage::SegmentDone);
    script.post(BusMessage::Error {
        source: Some("rtmp-sink".into()),
        message: "connection reset".into(),
    });

    assert_eq!(finish(session).await, Shutdown::EngineError);
    let ops = script.ops();
    let nulls: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter_map(|(i, op)| {
            matches!(
                op,
                EngineOp::SetPipelineState {
                    state: NodeState::Null
                }
            )
            .then_some(i)
        })
        .collect();
    assert_eq!(nulls.len(), 1);
    assert_eq!(nulls[0], ops.len() - 1);
}

/// End of stream uses the same orderly shutdown path.
#[tokio::test]
async fn test_end_of_stream_shuts_down_cleanly() {
    let (session, script, _commands) = start();
    play(&script).await;

    script.post(BusMessage::EndOfStream);

    assert_eq!(finish(session).await, Shutdown::EndOfStream);
    assert!(script.ops().iter().any(|op| matches!(
        op,
        EngineOp::SetPipelineState {
            state: NodeState::Null
        }
    )));
}

/// Bus messages outside the dispatch table are ignored.
#[tokio::test]
async fn test_unhandled_bus_messages_are_ignored() {
    let (session, script, commands) = start();
    play(&script).await;
    let ops_after_finalize = script.ops().len();

    script.post(BusMessage::Other {
        kind: "state-changed".into(),
    });
    script.post(BusMessage::Other {
        kind: "stream-status".into(),
    });
    commands.send("q".to_string()).unwrap();

    assert_eq!(finish(session).await, Shutdown::Operator);
    // Nothing but the teardown was added to the trace.
    assert_eq!(script.ops().len(), ops_after_finalize + 1);
}

/// Only lines starting with q (case-folded) shut the session down.
#[tokio::test]
async fn test_non_quit_lines_are_ignored() {
    let (session, script, commands) = start();
    play(&script).await;

    commands.send("status".to_string()).unwrap();
    commands.send("".to_string()).unwrap();
    commands.send("Quit".to_string()).unwrap();

    assert_eq!(finish(session).await, Shutdown::Operator);
    drop(script);
}

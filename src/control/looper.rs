//! The looping policy over bounded segment playback.
//!
//! Because the graph plays under the segment flag, reaching the end of the
//! range produces a segment-done notification instead of end of stream.
//! Re-arming the same range on every notification turns the finite file
//! into an unbounded live stream; skipping the flush on re-arms keeps the
//! restart frame-accurate with no decoder re-initialization gap.

use metrics::counter;
use tracing::{debug, warn};

use crate::engine::{MediaEngine, SeekRequest};
use crate::pipeline::PipelineGraph;

const LOOP_CYCLES: &str = "loopcast_loop_cycles";
const SEEK_FAILURES: &str = "loopcast_seek_failures";

/// Re-arms the play segment on every segment completion, indefinitely.
#[derive(Debug, Default)]
pub struct LoopController {
    cycles: u64,
    failures: u64,
}

impl LoopController {
    /// Create a controller with no completed cycles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful re-arms so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Number of rejected re-arms so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// React to a segment completion by re-arming the same range.
    ///
    /// A rejected seek is not fatal: the current segment simply plays out
    /// and the next segment boundary retries. No timer-driven backoff is
    /// needed because the retry cadence is the segment length itself.
    pub fn on_segment_done<E: MediaEngine>(&mut self, graph: &mut PipelineGraph<E>) {
        match graph.seek(&SeekRequest::seamless_segment()) {
            Ok(()) => {
                self.cycles += 1;
                counter!(LOOP_CYCLES).increment(1);
                debug!(cycle = self.cycles, "segment re-armed");
            }
            Err(err) => {
                self.failures += 1;
                counter!(SEEK_FAILURES).increment(1);
                warn!(%err, "loop seek rejected; the current segment will play out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineOp, ScriptedEngine};

    #[test]
    fn test_rearm_per_segment_done() {
        let (engine, script) = ScriptedEngine::new();
        let mut graph = PipelineGraph::new(engine);
        let mut looper = LoopController::new();

        for _ in 0..3 {
            looper.on_segment_done(&mut graph);
        }

        assert_eq!(looper.cycles(), 3);
        let seeks: Vec<_> = script.ops();
        assert_eq!(seeks.len(), 3);
        for op in seeks {
            assert_eq!(
                op,
                EngineOp::Seek {
                    flushing: false,
                    segment: true,
                    start_ns: 0,
                    stop_ns: None,
                }
            );
        }
    }

    #[test]
    fn test_seek_failure_is_tolerated() {
        let (engine, script) = ScriptedEngine::new();
        let mut graph = PipelineGraph::new(engine);
        let mut looper = LoopController::new();

        script.fail_next_seeks(1);
        looper.on_segment_done(&mut graph);
        assert_eq!(looper.cycles(), 0);
        assert_eq!(looper.failures(), 1);

        // The next natural boundary retries and succeeds.
        looper.on_segment_done(&mut graph);
        assert_eq!(looper.cycles(), 1);
        assert_eq!(script.ops().len(), 1);
    }
}

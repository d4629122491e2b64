//! Element factory: fail-fast node creation.

use tracing::error;

use crate::config::NodeConfig;
use crate::engine::MediaEngine;
use crate::error::{Error, Result};

/// Creates processing nodes from the engine, failing fast when a capability
/// is missing.
///
/// Every node in the pipeline is load-bearing, so there is no degraded mode:
/// any creation failure is reported as a missing capability and the caller
/// is expected to abort startup with a diagnostic naming it.
pub struct ElementFactory;

impl ElementFactory {
    /// Create a node, mapping any backend failure to
    /// [`Error::UnavailableCapability`].
    pub fn make<E: MediaEngine>(
        engine: &mut E,
        name: &str,
        config: &NodeConfig,
    ) -> Result<E::Node> {
        engine.create(name, config).map_err(|err| {
            error!(
                capability = config.capability(),
                node = name,
                %err,
                "element could not be created"
            );
            match err {
                err @ Error::UnavailableCapability { .. } => err,
                _ => Error::UnavailableCapability {
                    capability: config.capability().to_string(),
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeKind;
    use crate::engine::testing::ScriptedEngine;

    #[test]
    fn test_missing_capability_is_fatal_error() {
        let (engine, _script) = ScriptedEngine::new();
        let mut engine = engine.refuse(NodeKind::RtmpSink);
        let cfg = NodeConfig::RtmpSink(crate::config::RtmpSinkConfig {
            location: "rtmp://host/app".into(),
        });
        let err = ElementFactory::make(&mut engine, "rtmp-sink", &cfg).unwrap_err();
        match err {
            Error::UnavailableCapability { capability } => assert_eq!(capability, "rtmpsink"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_create_succeeds() {
        let (mut engine, script) = ScriptedEngine::new();
        let node = ElementFactory::make(&mut engine, "demuxer", &NodeConfig::Demux).unwrap();
        assert_eq!(node.name(), "demuxer");
        assert_eq!(script.ops().len(), 1);
    }
}

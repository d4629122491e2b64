//! GStreamer engine backend.
//!
//! Translates the engine contract onto a real GStreamer pipeline:
//! capabilities map to element factory names, typed configuration maps to
//! element properties, and the bus plus the demultiplexer's pad signals are
//! pumped into the event channels from GStreamer's own threads. All
//! callbacks only ever send on a channel, so graph mutation stays on the
//! control task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use gstreamer as gst;
use gstreamer::prelude::*;
use tokio::sync::mpsc;

use crate::config::NodeConfig;
use crate::error::{Error, Result};

use super::{
    BusMessage, DemuxSignal, EngineEvents, MediaEngine, NodeState, SeekFlags, SeekRequest,
};

/// Engine backend driving a GStreamer pipeline.
pub struct GstEngine {
    pipeline: gst::Pipeline,
    bus_stop: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
}

impl GstEngine {
    /// Initialize GStreamer and create the pipeline root.
    pub fn new(name: &str) -> Result<Self> {
        gst::init().map_err(|err| Error::PipelineConstruction(err.to_string()))?;
        let pipeline = gst::Pipeline::with_name(name);
        Ok(Self {
            pipeline,
            bus_stop: Arc::new(AtomicBool::new(false)),
            bus_thread: None,
        })
    }

    fn to_gst_state(state: NodeState) -> gst::State {
        match state {
            NodeState::Null => gst::State::Null,
            NodeState::Ready => gst::State::Ready,
            NodeState::Paused => gst::State::Paused,
            NodeState::Playing => gst::State::Playing,
        }
    }

    fn apply_config(element: &gst::Element, config: &NodeConfig) {
        match config {
            NodeConfig::FileSource(c) => {
                element.set_property("location", c.path.to_string_lossy().as_ref());
            }
            NodeConfig::Queue(c) => {
                element.set_property("max-size-buffers", c.max_buffers);
            }
            NodeConfig::Demux | NodeConfig::AacParse => {}
            NodeConfig::H264Parse(c) => {
                element.set_property("config-interval", c.config_interval);
            }
            NodeConfig::Identity(c) => {
                element.set_property("single-segment", c.single_segment);
                element.set_property("sync", c.sync);
                element.set_property("silent", c.silent);
            }
            NodeConfig::FlvMux(c) => {
                element.set_property("streamable", c.streamable);
            }
            NodeConfig::RtmpSink(c) => {
                element.set_property("location", &c.location);
            }
        }
    }

    fn pad_media_type(pad: &gst::Pad) -> String {
        pad.current_caps()
            .or_else(|| Some(pad.query_caps(None)))
            .and_then(|caps| caps.structure(0).map(|s| s.name().to_string()))
            .unwrap_or_default()
    }

    fn map_message(message: &gst::Message) -> BusMessage {
        match message.view() {
            gst::MessageView::Eos(..) => BusMessage::EndOfStream,
            gst::MessageView::Error(err) => BusMessage::Error {
                source: message.src().map(|s| s.name().to_string()),
                message: err.error().to_string(),
            },
            gst::MessageView::SegmentDone(..) => BusMessage::SegmentDone,
            _ => BusMessage::Other {
                kind: format!("{:?}", message.type_()),
            },
        }
    }
}

impl MediaEngine for GstEngine {
    type Node = gst::Element;
    type Pad = gst::Pad;

    fn create(&mut self, name: &str, config: &NodeConfig) -> Result<Self::Node> {
        let element = gst::ElementFactory::make(config.capability())
            .name(name)
            .build()
            .map_err(|_| Error::UnavailableCapability {
                capability: config.capability().to_string(),
            })?;
        Self::apply_config(&element, config);
        Ok(element)
    }

    fn add(&mut self, node: &Self::Node) -> Result<()> {
        self.pipeline
            .add(node)
            .map_err(|err| Error::Engine(err.to_string()))
    }

    fn link(&mut self, upstream: &Self::Node, downstream: &Self::Node) -> Result<()> {
        upstream
            .link(downstream)
            .map_err(|err| Error::Engine(err.to_string()))
    }

    fn link_pad(&mut self, pad: &Self::Pad, downstream: &Self::Node) -> Result<()> {
        let sink_pad = downstream.static_pad("sink").ok_or_else(|| {
            Error::Engine(format!("'{}' has no sink pad", downstream.name()))
        })?;
        pad.link(&sink_pad)
            .map_err(|err| Error::Engine(format!("pad link failed: {err:?}")))?;
        Ok(())
    }

    fn set_state(&mut self, node: &Self::Node, state: NodeState) -> Result<()> {
        node.set_state(Self::to_gst_state(state)).map_err(|_| {
            Error::Engine(format!(
                "'{}' refused the change to the {} state",
                node.name(),
                state
            ))
        })?;
        Ok(())
    }

    fn set_pipeline_state(&mut self, state: NodeState) -> Result<()> {
        self.pipeline
            .set_state(Self::to_gst_state(state))
            .map_err(|_| Error::Engine(format!("pipeline refused the change to the {state} state")))?;
        Ok(())
    }

    fn seek(&mut self, request: &SeekRequest) -> Result<()> {
        let mut flags = gst::SeekFlags::empty();
        if request.flags.contains(SeekFlags::FLUSH) {
            flags |= gst::SeekFlags::FLUSH;
        }
        if request.flags.contains(SeekFlags::SEGMENT) {
            flags |= gst::SeekFlags::SEGMENT;
        }
        let start = Some(gst::ClockTime::from_nseconds(request.start.nanos()));
        let (stop_type, stop) = match request.stop {
            Some(t) => (
                gst::SeekType::Set,
                Some(gst::ClockTime::from_nseconds(t.nanos())),
            ),
            None => (gst::SeekType::End, gst::ClockTime::NONE),
        };
        self.pipeline
            .seek(request.rate, flags, gst::SeekType::Set, start, stop_type, stop)
            .map_err(|err| Error::SeekFailed(err.to_string()))
    }

    fn watch(&mut self, demuxer: &Self::Node) -> Result<EngineEvents<Self::Pad>> {
        if self.bus_thread.is_some() {
            return Err(Error::Engine("engine events already taken".into()));
        }

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (bus_tx, bus_rx) = mpsc::unbounded_channel();

        let pad_tx = signal_tx.clone();
        demuxer.connect_pad_added(move |_, pad| {
            let media_type = Self::pad_media_type(pad);
            let _ = pad_tx.send(DemuxSignal::PadAdded {
                pad: pad.clone(),
                media_type,
            });
        });
        demuxer.connect_no_more_pads(move |_| {
            let _ = signal_tx.send(DemuxSignal::NoMorePads);
        });

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| Error::Engine("pipeline has no bus".into()))?;
        let stop = Arc::clone(&self.bus_stop);
        let thread = std::thread::Builder::new()
            .name("loopcast-bus".into())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let Some(message) = bus.timed_pop(gst::ClockTime::from_mseconds(100)) else {
                        continue;
                    };
                    if bus_tx.send(Self::map_message(&message)).is_err() {
                        break;
                    }
                }
            })
            .map_err(Error::Io)?;
        self.bus_thread = Some(thread);

        Ok(EngineEvents {
            signals: signal_rx,
            bus: bus_rx,
        })
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        self.bus_stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.bus_thread.take() {
            let _ = thread.join();
        }
        // Backstop only; the control loop's teardown already drove the
        // graph to null on every exit path.
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

//! GStreamer-backed playable surface

use super::{frames::FrameMailbox, pipeline, stats::VideoStats};
use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::time::Duration;
#[cfg(feature = "profiling")]
use std::time::Instant;

use crate::resolver::ClipHandle;
use crate::surface::{LifecycleEvent, PlayableSurface, SurfaceSignal, VideoFrame};

/// How often per-clip statistics are logged while playing
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// One pipeline per loaded source
struct LoadedSource {
    pipeline: gst::Pipeline,
    app_sink: gst_app::AppSink,
    frames: FrameMailbox,
    stats: VideoStats,
    locator: String,
    metadata_sent: bool,
}

impl LoadedSource {
    fn open(handle: &ClipHandle) -> Result<Self> {
        pipeline::initialize_gstreamer()?;

        let (pipeline, app_sink) = pipeline::build_pipeline(&handle.uri())?;
        pipeline::configure_app_sink(&app_sink);

        let frames = FrameMailbox::new();
        pipeline::setup_frame_callback(&app_sink, frames.clone());

        // Preroll: reaching Paused loads metadata and the first frame
        pipeline
            .set_state(gst::State::Paused)
            .context("Failed to set pipeline to Paused state")?;

        Ok(Self {
            pipeline,
            app_sink,
            frames,
            stats: VideoStats::new(),
            locator: handle.locator().to_string(),
            metadata_sent: false,
        })
    }

    fn is_pipeline_message(&self, msg: &gst::Message) -> bool {
        msg.src()
            .is_some_and(|src| src == self.pipeline.upcast_ref::<gst::Object>())
    }

    /// Drain ALL bus messages and translate the ones the controller cares about
    fn drain_bus(&mut self, signals: &mut Vec<SurfaceSignal>) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };

        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::AsyncDone(_) if !self.metadata_sent => {
                    self.metadata_sent = true;
                    self.stats.detected_fps = pipeline::detect_fps(&self.app_sink);
                    let duration_ms = pipeline::query_duration_ms(&self.pipeline);
                    log::debug!(
                        "Prerolled {} (duration {:?} ms)",
                        self.locator,
                        duration_ms
                    );
                    signals.push(SurfaceSignal::MetadataReady { duration_ms });
                }

                gst::MessageView::Eos(_) => {
                    log::debug!("Reached end of {}", self.locator);
                    signals.push(SurfaceSignal::Ended);
                }

                gst::MessageView::Error(err) => {
                    log::error!(
                        "GStreamer error: {} (debug: {:?})",
                        err.error(),
                        err.debug()
                    );
                    signals.push(SurfaceSignal::Error(format!(
                        "{}: {}",
                        self.locator,
                        err.error()
                    )));
                }

                gst::MessageView::StateChanged(change) if self.is_pipeline_message(&msg) => {
                    match change.current() {
                        gst::State::Playing => {
                            signals.push(SurfaceSignal::Observed(LifecycleEvent::Playing))
                        }
                        gst::State::Paused if self.metadata_sent => {
                            signals.push(SurfaceSignal::Observed(LifecycleEvent::Pause))
                        }
                        _ => {}
                    }
                }

                gst::MessageView::Buffering(buffering) => {
                    let percent = buffering.percent().clamp(0, 100) as u8;
                    signals.push(SurfaceSignal::Observed(LifecycleEvent::Buffering(percent)));
                }

                gst::MessageView::DurationChanged(_) => {
                    signals.push(SurfaceSignal::Observed(LifecycleEvent::DurationChange));
                }

                _ => {
                    // Drain other messages to prevent memory leak
                }
            }
        }
    }
}

impl Drop for LoadedSource {
    fn drop(&mut self) {
        // Clear callbacks first to prevent new frames
        self.app_sink
            .set_callbacks(gst_app::AppSinkCallbacks::builder().build());

        match self.pipeline.set_state(gst::State::Null) {
            Ok(_) => {
                let (result, current, pending) =
                    self.pipeline.state(Some(gst::ClockTime::from_seconds(2)));
                if let Err(e) = result {
                    log::warn!("Failed to get pipeline final state: {:?}", e);
                } else {
                    log::trace!(
                        "Pipeline final state: current={:?}, pending={:?}",
                        current,
                        pending
                    );
                }
            }
            Err(e) => {
                log::warn!("Failed to set pipeline state to Null: {}", e);
            }
        }

        if let Some(bus) = self.pipeline.bus() {
            let mut drained = 0;
            while bus.pop().is_some() {
                drained += 1;
            }
            if drained > 0 {
                log::debug!("Drained {} pending messages from bus", drained);
            }
        }

        self.stats.log_stats(&self.locator, self.frames.dropped());
    }
}

/// Playable surface decoding one clip at a time through GStreamer
pub struct GstSurface {
    name: String,
    source: Option<LoadedSource>,
}

impl GstSurface {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        pipeline::initialize_gstreamer()?;
        Ok(Self {
            name: name.into(),
            source: None,
        })
    }
}

impl PlayableSurface for GstSurface {
    fn set_source(&mut self, handle: &ClipHandle) -> Result<()> {
        // The old pipeline and its bus go away before the new one exists
        self.source = None;
        log::debug!("{}: loading {}", self.name, handle.locator());
        self.source = Some(LoadedSource::open(handle)?);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let source = self
            .source
            .as_ref()
            .with_context(|| format!("{} has no source loaded", self.name))?;

        source
            .pipeline
            .set_state(gst::State::Playing)
            .context("Failed to set pipeline to Playing state")?;
        Ok(())
    }

    fn poll_signals(&mut self) -> Vec<SurfaceSignal> {
        let mut signals = Vec::new();
        if let Some(source) = self.source.as_mut() {
            source.drain_bus(&mut signals);
            let dropped = source.frames.dropped();
            source.stats.maybe_log_stats(&self.name, dropped, STATS_INTERVAL);
        }
        signals
    }

    fn take_frame(&mut self) -> Option<VideoFrame> {
        let source = self.source.as_mut()?;
        let frame = source.frames.take()?;
        source.stats.increment_presented();

        #[cfg(feature = "profiling")]
        if source.stats.frames_presented.is_multiple_of(60)
            && let Some(delivered) = source.frames.delivered_at()
        {
            log::info!(
                "[PROFILE] {} frame {}: GStreamer->Render={:.2}ms",
                self.name,
                source.stats.frames_presented,
                Instant::now().duration_since(delivered).as_secs_f64() * 1000.0
            );
        }

        Some(frame)
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            log::debug!("{}: released", self.name);
        }
    }
}

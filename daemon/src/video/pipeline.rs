//! GStreamer pipeline setup and configuration
//!
//! Each playable surface owns one pipeline that decodes a clip URI to BGRA
//! frames delivered through an `AppSink`.

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::sync::OnceLock;

use super::frames::FrameMailbox;
use crate::surface::VideoFrame;

/// Initialize GStreamer (idempotent, safe to call multiple times)
pub fn initialize_gstreamer() -> Result<()> {
    static GSTREAMER_INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            log::info!("GStreamer initialized");
            Ok(())
        })
        .clone()
        .map_err(|e| anyhow::anyhow!("Failed to initialize GStreamer: {}", e))
}

/// Build a decoding pipeline for a clip URI
///
/// `uridecodebin` picks the decoder, `videoconvert` normalises to BGRA.
///
/// # Returns
///
/// Tuple of (pipeline, app_sink) where app_sink receives decoded frames
pub fn build_pipeline(uri: &str) -> Result<(gst::Pipeline, gst_app::AppSink)> {
    log::info!("Creating GStreamer pipeline for: {}", uri);

    let pipeline_str =
        "uridecodebin name=src ! videoconvert ! video/x-raw,format=BGRA ! appsink name=sink";

    log::debug!("GStreamer pipeline: {}", pipeline_str);

    let pipeline = gst::parse::launch(pipeline_str)
        .context("Failed to create GStreamer pipeline")?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| anyhow::anyhow!("Pipeline is not a gst::Pipeline"))?;

    // Set the uri as a property so paths never need quoting
    pipeline
        .by_name("src")
        .context("Failed to get uridecodebin from pipeline")?
        .set_property("uri", uri);

    let app_sink = pipeline
        .by_name("sink")
        .context("Failed to get appsink from pipeline")?
        .dynamic_cast::<gst_app::AppSink>()
        .map_err(|_| anyhow::anyhow!("sink is not an AppSink"))?;

    Ok((pipeline, app_sink))
}

/// Configure AppSink for low-latency video delivery
///
/// - `sync=true`: frames are released at their presentation time
/// - `max-buffers=1`, `drop=true`: never queue behind the display tick
pub fn configure_app_sink(app_sink: &gst_app::AppSink) {
    app_sink.set_property("emit-signals", true);
    app_sink.set_property("sync", true);
    app_sink.set_property("max-buffers", 1u32);
    app_sink.set_property("drop", true);
}

/// Route decoded samples into `mailbox` as packed BGRA frames
pub fn setup_frame_callback(app_sink: &gst_app::AppSink, mailbox: FrameMailbox) {
    app_sink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                let info =
                    gst_video::VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::Error)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;

                let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                let frame = pack_frame(
                    map.as_slice(),
                    info.width(),
                    info.height(),
                    info.stride()[0] as usize,
                )
                .ok_or(gst::FlowError::Error)?;

                mailbox.deposit(frame);
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

/// Copy a possibly padded BGRA plane into a packed frame
fn pack_frame(data: &[u8], width: u32, height: u32, stride: usize) -> Option<VideoFrame> {
    let row_bytes = width as usize * 4;
    if stride < row_bytes || data.len() < stride * (height as usize).saturating_sub(1) + row_bytes
    {
        return None;
    }

    if stride == row_bytes {
        return Some(VideoFrame::new(
            width,
            height,
            data[..row_bytes * height as usize].to_vec(),
        ));
    }

    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        packed.extend_from_slice(&row[..row_bytes]);
    }
    Some(VideoFrame::new(width, height, packed))
}

/// Clip duration once the pipeline has prerolled
pub fn query_duration_ms(pipeline: &gst::Pipeline) -> Option<u64> {
    pipeline
        .query_duration::<gst::ClockTime>()
        .map(|duration| duration.mseconds())
}

/// Detect video FPS from the negotiated sink caps
pub fn detect_fps(app_sink: &gst_app::AppSink) -> Option<f64> {
    let caps = app_sink.static_pad("sink")?.current_caps()?;
    let framerate = caps.structure(0)?.get::<gst::Fraction>("framerate").ok()?;
    if framerate.denom() == 0 {
        return None;
    }

    let fps = framerate.numer() as f64 / framerate.denom() as f64;
    log::debug!("Detected video FPS: {:.2}", fps);
    Some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_frame_strips_row_padding() {
        // 2x2 BGRA with 4 bytes of padding per row
        let mut data = Vec::new();
        data.extend_from_slice(&[1; 8]);
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&[2; 8]);
        data.extend_from_slice(&[0; 4]);

        let frame = pack_frame(&data, 2, 2, 12).unwrap();
        assert!(frame.is_valid());
        assert_eq!(&frame.data[..8], &[1; 8]);
        assert_eq!(&frame.data[8..], &[2; 8]);
    }

    #[test]
    fn test_pack_frame_rejects_short_buffer() {
        assert!(pack_frame(&[0; 10], 2, 2, 8).is_none());
        assert!(pack_frame(&[0; 64], 4, 2, 8).is_none());
    }
}

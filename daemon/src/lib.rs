//! Clipchain sequencer daemon
//!
//! Plays an ordered list of video clips into a measured rectangle, moving
//! from clip to clip according to each clip's transition rule. The
//! [`controller::Controller`] is the core; everything else is a boundary it
//! drives through a trait so it can be exercised without a display, a
//! decoder or the network.

pub mod macros;

pub mod config;
pub mod controller;
pub mod driver;
pub mod ipc_server;
pub mod output;
pub mod render;
pub mod resolver;
pub mod sequence;
pub mod stage;
pub mod status;
pub mod surface;
pub mod video;

#[cfg(feature = "gpu")]
pub mod gpu;

use common::SequenceStatus;
use std::time::Instant;

/// State shared between the driver and the IPC server
pub struct DaemonState {
    pub should_exit: bool,
    pub start_time: Instant,
    /// Latest snapshot published by the driver
    pub status: SequenceStatus,
    /// Number of clips in the loaded configuration
    pub clip_count: usize,
}

impl DaemonState {
    pub fn new(clip_count: usize) -> Self {
        Self {
            should_exit: false,
            start_time: Instant::now(),
            status: SequenceStatus::default(),
            clip_count,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Latest snapshot stamped with the current uptime
    pub fn status(&self) -> SequenceStatus {
        SequenceStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.uptime_secs(),
            ..self.status.clone()
        }
    }
}

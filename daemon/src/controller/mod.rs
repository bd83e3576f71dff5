//! Sequence controller
//!
//! A finite-state machine advanced once per display-refresh tick. It owns
//! the clip arena, the render backend and the playable surfaces. Resolver
//! answers and external commands arrive as [`ControllerEvent`]s and surface
//! signals are polled; both are only looked at inside [`Controller::tick`],
//! which moves the machine by at most one phase.
//!
//! ```text
//! inert -> init -> requesting-clips -> waiting-clips-response -> clips-received
//!   -> load-next-clip -> loading-clip -> loaded-clip -> play-clip -> playing-clip
//!   -> advance-clip -> load-next-clip ...
//!                   -> ended-sequence -> stop
//! (any failure)     -> error -> stop
//! ```

mod events;
mod slots;

pub use events::{ControllerEvent, EventSender};

use common::{Phase, SequenceError, SequenceStatus, StatusMessage, TransitionRule};
use tokio::sync::mpsc;

use crate::config::SequenceSettings;
use crate::log_and_continue;
use crate::render::RenderBackend;
use crate::resolver::{ClipResolver, RequestId, Resolution};
use crate::sequence::SequenceState;
use crate::stage::Stage;
use crate::status::StatusSink;
use slots::SurfaceSlot;

pub struct Controller {
    phase: Phase,
    settings: SequenceSettings,
    sequence: SequenceState,
    messages: Vec<StatusMessage>,

    stage: Box<dyn Stage>,
    resolver: Box<dyn ClipResolver>,
    sink: Box<dyn StatusSink>,
    backend: Option<Box<dyn RenderBackend>>,
    slots: Vec<SurfaceSlot>,
    active_slot: usize,

    events: EventSender,
    inbox: mpsc::UnboundedReceiver<ControllerEvent>,
    next_request: u64,
    outstanding: Option<RequestId>,
    resolved: Option<Resolution>,

    init_requested: bool,
    stop_requested: bool,
    restart_requested: bool,
    skip_requested: bool,

    ticks: u64,
}

impl Controller {
    pub fn new(
        settings: SequenceSettings,
        stage: Box<dyn Stage>,
        resolver: Box<dyn ClipResolver>,
        sink: Box<dyn StatusSink>,
    ) -> Self {
        let (events, inbox) = events::channel();
        let sequence = SequenceState::from_config(&settings.clips);

        Self {
            phase: Phase::Inert,
            settings,
            sequence,
            messages: Vec::new(),
            stage,
            resolver,
            sink,
            backend: None,
            slots: Vec::new(),
            active_slot: 0,
            events,
            inbox,
            next_request: 0,
            outstanding: None,
            resolved: None,
            init_requested: false,
            stop_requested: false,
            restart_requested: false,
            skip_requested: false,
            ticks: 0,
        }
    }

    /// Sender for posting events; they take effect on the next tick
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sequence(&self) -> &SequenceState {
        &self.sequence
    }

    pub fn messages(&self) -> &[StatusMessage] {
        &self.messages
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Run one tick at `now_ms` and return the resulting phase
    pub fn tick(&mut self, now_ms: u64) -> Phase {
        self.ticks += 1;

        while let Ok(event) = self.inbox.try_recv() {
            self.apply(event);
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.poll(index);
        }

        let next = self.step(now_ms);
        if next != self.phase {
            log::debug!("phase: {} -> {}", self.phase, next);
            self.phase = next;
        }

        self.draw();
        self.phase
    }

    pub fn snapshot(&self) -> SequenceStatus {
        SequenceStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: 0,
            phase: self.phase,
            active_index: self.sequence.active_index(),
            clips: self.sequence.status(),
            messages: self.messages.clone(),
            generation: self.sequence.generation(),
            ticks: self.ticks,
        }
    }

    /// Release every media resource and leave the machine in `stop`
    pub fn shutdown(&mut self) {
        if self.phase.is_running() {
            log::info!("Shutting down sequence in phase {}", self.phase);
            self.phase = Phase::Stop;
        }
        self.release_media();
    }

    fn apply(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Init => {
                if self.phase == Phase::Inert || self.restart_requested {
                    self.init_requested = true;
                } else {
                    log::debug!("ignoring init in phase {}", self.phase);
                }
            }

            ControllerEvent::ClipsResolved { request, result } => {
                let expected = self.phase == Phase::WaitingClipsResponse
                    && self.outstanding == Some(request)
                    && self.resolved.is_none();

                if expected {
                    self.outstanding = None;
                    self.resolved = Some(result);
                } else {
                    log::debug!(
                        "discarding stale resolution {} in phase {}",
                        request,
                        self.phase
                    );
                }
            }

            ControllerEvent::Skip => {
                if self.phase.is_running() {
                    log::info!("Skip requested: next advance moves to the following clip");
                    self.skip_requested = true;
                } else {
                    log::debug!("ignoring skip in phase {}", self.phase);
                }
            }

            ControllerEvent::Stop => {
                if self.phase.is_running() {
                    self.stop_requested = true;
                } else {
                    log::debug!("ignoring stop in phase {}", self.phase);
                }
            }

            ControllerEvent::Restart => {
                let stopping = matches!(
                    self.phase,
                    Phase::Stop | Phase::Error | Phase::EndedSequence
                );
                if stopping || self.stop_requested {
                    self.restart_requested = true;
                } else {
                    log::debug!("ignoring restart in phase {}", self.phase);
                }
            }
        }
    }

    /// The per-tick transition function
    fn step(&mut self, now_ms: u64) -> Phase {
        if self.stop_requested {
            self.stop_requested = false;
            if self.phase.is_running() {
                log::info!("Stop requested in phase {}", self.phase);
                return self.stop();
            }
        }

        if self.phase.has_active_clip()
            && let Some(message) = self.surface_error()
        {
            return self.fail(SequenceError::Playback(message));
        }

        match self.phase {
            Phase::Inert => {
                if std::mem::take(&mut self.init_requested) {
                    Phase::Init
                } else {
                    Phase::Inert
                }
            }

            Phase::Init => self.initialize(),

            Phase::RequestingClips => {
                self.next_request += 1;
                let request = RequestId(self.next_request);
                let locators = self
                    .sequence
                    .clips()
                    .iter()
                    .map(|clip| clip.source.clone())
                    .collect();

                self.outstanding = Some(request);
                self.resolver.request(request, locators, self.events.clone());
                Phase::WaitingClipsResponse
            }

            Phase::WaitingClipsResponse => match self.resolved.take() {
                None => Phase::WaitingClipsResponse,
                Some(Err(error)) => self.fail(error),
                Some(Ok(handles)) => {
                    let count = handles.len();
                    if let Err(e) = self.sequence.attach_handles(handles) {
                        return self.fail(SequenceError::Resolution(e.to_string()));
                    }
                    self.record(StatusMessage::success(format!(
                        "resolved {} clip(s)",
                        count
                    )));
                    Phase::ClipsReceived
                }
            },

            Phase::ClipsReceived => Phase::LoadNextClip,

            Phase::LoadNextClip => self.load_active_clip(),

            Phase::LoadingClip => {
                let ready = self.slots.get(self.active_slot).and_then(|slot| slot.ready);
                match ready {
                    None => Phase::LoadingClip,
                    Some(duration_ms) => {
                        if let Some(clip) = self.sequence.active_mut() {
                            clip.duration_ms = duration_ms;
                        }
                        Phase::LoadedClip
                    }
                }
            }

            Phase::LoadedClip => Phase::PlayClip,

            Phase::PlayClip => self.play_active_clip(now_ms),

            Phase::PlayingClip => self.check_progress(now_ms),

            Phase::AdvanceClip => {
                let skip = std::mem::take(&mut self.skip_requested);
                let rule = match self.sequence.active() {
                    Some(_) if skip => TransitionRule::Next,
                    Some(clip) => clip.rule,
                    None => {
                        return self.fail(SequenceError::Configuration(
                            "active clip index out of range".to_string(),
                        ));
                    }
                };

                match self.sequence.next_index(rule) {
                    Some(index) => {
                        self.sequence.enter(index);
                        Phase::LoadNextClip
                    }
                    None => {
                        self.record(StatusMessage::success("sequence ended"));
                        Phase::EndedSequence
                    }
                }
            }

            Phase::EndedSequence | Phase::Error => self.stop(),

            Phase::Stop => {
                if std::mem::take(&mut self.restart_requested) {
                    Phase::Inert
                } else {
                    Phase::Stop
                }
            }
        }
    }

    /// `init`: measure, build the backend and the surfaces, rewind the clip list
    fn initialize(&mut self) -> Phase {
        if let Err(e) = self.settings.validate_clips() {
            return self.fail(SequenceError::Configuration(e.to_string()));
        }

        let viewport = self.stage.measure();
        let backend = match self
            .stage
            .create_backend(self.settings.render_backend, &viewport)
        {
            Ok(backend) => backend,
            Err(e) => return self.fail(SequenceError::Configuration(format!("{:#}", e))),
        };

        let mut slots = Vec::new();
        for index in 0..self.settings.buffering.surface_count() {
            match self.stage.create_surface(index) {
                Ok(surface) => slots.push(SurfaceSlot::new(surface)),
                Err(e) => return self.fail(SequenceError::Configuration(format!("{:#}", e))),
            }
        }

        log::info!(
            "Initialized {} backend with {} surface(s) at {}x{}",
            backend.name(),
            slots.len(),
            viewport.surface_width,
            viewport.surface_height
        );

        self.sequence.reset(&self.settings.clips);
        self.backend = Some(backend);
        self.slots = slots;
        self.active_slot = 0;
        self.skip_requested = false;
        Phase::RequestingClips
    }

    /// `load-next-clip`: swap to the standby surface or load the active one
    ///
    /// Once a clip is on screen the visible surface is never reloaded: a
    /// standby that missed the prediction is loaded with the right clip first.
    fn load_active_clip(&mut self) -> Phase {
        let index = self.sequence.active_index();
        let Some(handle) = self.sequence.active().and_then(|clip| clip.handle.clone()) else {
            return self.fail(SequenceError::Configuration(format!(
                "clip {} has no resolved handle",
                index
            )));
        };

        if let Some(standby) = self.standby_slot()
            && self.slots[self.active_slot].clip.is_some()
        {
            if self.slots[standby].holds(index) {
                log::debug!("swapping to preloaded surface {} for clip {}", standby, index);
            } else {
                log::debug!("loading clip {} into standby surface {}", index, standby);
                if let Err(e) = self.slots[standby].load(index, &handle) {
                    return self.fail(SequenceError::Playback(format!("{:#}", e)));
                }
            }

            let previous = std::mem::replace(&mut self.active_slot, standby);
            self.slots[previous].release();
            return Phase::LoadingClip;
        }

        let Some(slot) = self.slots.get_mut(self.active_slot) else {
            return self.fail(SequenceError::Configuration(
                "no playable surface".to_string(),
            ));
        };
        if let Err(e) = slot.load(index, &handle) {
            return self.fail(SequenceError::Playback(format!("{:#}", e)));
        }
        Phase::LoadingClip
    }

    /// `play-clip`: start playback, stamp the start time, preload what comes next
    fn play_active_clip(&mut self, now_ms: u64) -> Phase {
        let Some(slot) = self.slots.get_mut(self.active_slot) else {
            return self.fail(SequenceError::Configuration(
                "no playable surface".to_string(),
            ));
        };
        if let Err(e) = slot.surface.play() {
            return self.fail(SequenceError::Playback(format!("{:#}", e)));
        }

        if let Some(clip) = self.sequence.active_mut() {
            clip.started_at_ms = now_ms;
        }

        if let Err(e) = self.preload_next() {
            return self.fail(SequenceError::Playback(format!("{:#}", e)));
        }
        Phase::PlayingClip
    }

    /// Load the clip the active rule predicts into the standby surface
    fn preload_next(&mut self) -> anyhow::Result<()> {
        let Some(standby) = self.standby_slot() else {
            return Ok(());
        };

        let rule = if self.skip_requested {
            TransitionRule::Next
        } else {
            match self.sequence.active() {
                Some(clip) => clip.rule,
                None => return Ok(()),
            }
        };

        let Some(index) = self.sequence.next_index(rule) else {
            return Ok(());
        };
        let Some(handle) = self.sequence.get(index).and_then(|clip| clip.handle.clone()) else {
            return Ok(());
        };

        log::debug!("preloading clip {} into surface {}", index, standby);
        self.slots[standby].load(index, &handle)
    }

    /// `playing-clip`: advance on `ended` or when less than epsilon remains
    fn check_progress(&mut self, now_ms: u64) -> Phase {
        if self
            .slots
            .get(self.active_slot)
            .is_some_and(|slot| slot.ended)
        {
            return Phase::AdvanceClip;
        }

        let Some(clip) = self.sequence.active() else {
            return self.fail(SequenceError::Configuration(
                "active clip index out of range".to_string(),
            ));
        };

        if let Some(duration) = clip.duration_ms {
            let elapsed = now_ms.saturating_sub(clip.started_at_ms);
            let remaining = duration as i64 - elapsed as i64;
            if remaining < self.settings.transition_epsilon_ms as i64 {
                return Phase::AdvanceClip;
            }
        }

        Phase::PlayingClip
    }

    fn standby_slot(&self) -> Option<usize> {
        (self.slots.len() > 1).then(|| (self.active_slot + 1) % self.slots.len())
    }

    /// Error reported by the active surface; a failed preload is only dropped
    fn surface_error(&mut self) -> Option<String> {
        if let Some(standby) = self.standby_slot()
            && let Some(message) = self.slots[standby].error.take()
        {
            log::warn!("Dropping preload on surface {}: {}", standby, message);
            self.slots[standby].release();
        }

        self.slots
            .get_mut(self.active_slot)
            .and_then(|slot| slot.error.take())
    }

    fn draw(&mut self) {
        if !self.phase.has_active_clip() {
            return;
        }

        let (Some(backend), Some(slot)) = (self.backend.as_mut(), self.slots.get_mut(self.active_slot))
        else {
            return;
        };

        if let Some(frame) = slot.surface.take_frame() {
            log_and_continue!(backend.draw(&frame), "draw frame");
        }
    }

    fn record(&mut self, message: StatusMessage) {
        self.sink.publish(&message);
        self.messages.push(message);
    }

    fn fail(&mut self, error: SequenceError) -> Phase {
        log::debug!("{} failure in phase {}", error.kind_label(), self.phase);
        self.record(StatusMessage::error(error.to_string()));
        Phase::Error
    }

    /// `stop`: drop surfaces, the backend and every resolved handle
    fn stop(&mut self) -> Phase {
        self.release_media();
        Phase::Stop
    }

    fn release_media(&mut self) {
        let surfaces = self.slots.len();
        for slot in &mut self.slots {
            slot.release();
        }
        self.slots.clear();
        self.backend = None;

        let handles = self.sequence.release_handles();
        self.outstanding = None;
        self.resolved = None;
        self.skip_requested = false;

        if surfaces > 0 || handles > 0 {
            log::info!(
                "Released {} surface(s) and {} clip handle(s)",
                surfaces,
                handles
            );
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

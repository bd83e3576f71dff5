//! Scripted fakes for driving the controller without media or network
#![allow(dead_code)]

use anyhow::Result;
use clipchain::config::{ClipConfig, SequenceSettings};
use clipchain::controller::{Controller, ControllerEvent, EventSender};
use clipchain::render::{Bounds, RenderBackend, Viewport};
use clipchain::resolver::{ClipHandle, ClipResolver, RequestId};
use clipchain::stage::Stage;
use clipchain::status::StatusSink;
use clipchain::surface::{PlayableSurface, SurfaceSignal, VideoFrame};
use common::{BufferingMode, Phase, RenderBackendKind, SequenceError, StatusMessage, TransitionRule};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything the fakes observe or are told to do
#[derive(Default)]
pub struct World {
    /// Commands issued to surfaces, e.g. `set_source 0 a.mp4`, `play 1`
    pub commands: Vec<String>,
    /// Duration reported for a locator; missing means unknown
    pub durations: HashMap<String, u64>,
    /// Locators whose metadata never arrives
    pub silent: HashSet<String>,
    /// Signals each surface reports on its next poll
    pub pending: HashMap<usize, Vec<SurfaceSignal>>,
    /// Requests held back by a manual resolver
    pub requests: Vec<(RequestId, Vec<String>, EventSender)>,
    pub published: Vec<StatusMessage>,
    pub frames_drawn: usize,
}

pub type Shared = Arc<Mutex<World>>;

fn lock(world: &Shared) -> MutexGuard<'_, World> {
    world.lock().unwrap()
}

pub struct FakeSurface {
    index: usize,
    world: Shared,
    playing: bool,
}

impl PlayableSurface for FakeSurface {
    fn set_source(&mut self, handle: &ClipHandle) -> Result<()> {
        let mut world = lock(&self.world);
        world
            .commands
            .push(format!("set_source {} {}", self.index, handle.locator()));

        // A new source supersedes anything the old one had queued
        let mut signals = Vec::new();
        if !world.silent.contains(handle.locator()) {
            signals.push(SurfaceSignal::MetadataReady {
                duration_ms: world.durations.get(handle.locator()).copied(),
            });
        }
        world.pending.insert(self.index, signals);
        self.playing = false;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        lock(&self.world).commands.push(format!("play {}", self.index));
        self.playing = true;
        Ok(())
    }

    fn poll_signals(&mut self) -> Vec<SurfaceSignal> {
        lock(&self.world)
            .pending
            .remove(&self.index)
            .unwrap_or_default()
    }

    fn take_frame(&mut self) -> Option<VideoFrame> {
        self.playing
            .then(|| VideoFrame::solid(2, 2, [0, 0, 0, 255]))
    }

    fn release(&mut self) {
        let mut world = lock(&self.world);
        world.commands.push(format!("release {}", self.index));
        world.pending.remove(&self.index);
        self.playing = false;
    }
}

pub struct FakeBackend {
    world: Shared,
}

impl RenderBackend for FakeBackend {
    fn draw(&mut self, frame: &VideoFrame) -> Result<()> {
        assert!(frame.is_valid());
        lock(&self.world).frames_drawn += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeStage {
    world: Shared,
}

impl Stage for FakeStage {
    fn measure(&mut self) -> Viewport {
        Viewport::measure(
            Bounds {
                x: 0.0,
                y: 0.0,
                width: 4.0,
                height: 4.0,
            },
            1.0,
        )
    }

    fn create_backend(
        &mut self,
        _kind: RenderBackendKind,
        _viewport: &Viewport,
    ) -> Result<Box<dyn RenderBackend>> {
        Ok(Box::new(FakeBackend {
            world: self.world.clone(),
        }))
    }

    fn create_surface(&mut self, index: usize) -> Result<Box<dyn PlayableSurface>> {
        Ok(Box::new(FakeSurface {
            index,
            world: self.world.clone(),
            playing: false,
        }))
    }
}

/// How the fake resolver answers
#[derive(Clone)]
pub enum Answer {
    /// Reply at once with handles to the locators themselves
    Immediate,
    /// Reply at once with temp files created in the directory
    Materialize(PathBuf),
    /// Reply at once with a resolution failure
    Fail(String),
    /// Park the request in [`World::requests`]
    Manual,
}

pub struct FakeResolver {
    world: Shared,
    answer: Answer,
}

impl ClipResolver for FakeResolver {
    fn request(&mut self, request: RequestId, locators: Vec<String>, reply: EventSender) {
        let result = match &self.answer {
            Answer::Immediate => Ok(locators
                .iter()
                .map(|l| ClipHandle::local(l.clone(), PathBuf::from(l)))
                .collect()),
            Answer::Materialize(dir) => Ok(locators
                .iter()
                .map(|l| ClipHandle::materialized(l.clone(), temp_in(dir)))
                .collect()),
            Answer::Fail(message) => Err(SequenceError::Resolution(message.clone())),
            Answer::Manual => {
                lock(&self.world).requests.push((request, locators, reply));
                return;
            }
        };
        reply.send(ControllerEvent::ClipsResolved { request, result });
    }
}

fn temp_in(dir: &Path) -> tempfile::TempPath {
    tempfile::NamedTempFile::new_in(dir)
        .unwrap()
        .into_temp_path()
}

pub struct RecordingSink {
    world: Shared,
}

impl StatusSink for RecordingSink {
    fn publish(&mut self, message: &StatusMessage) {
        lock(&self.world).published.push(message.clone());
    }
}

pub struct Harness {
    pub controller: Controller,
    pub world: Shared,
    pub now: u64,
}

impl Harness {
    pub fn new(clips: &[(TransitionRule, &str)]) -> Self {
        Self::with(clips, BufferingMode::Single, 5, Answer::Immediate)
    }

    pub fn with(
        clips: &[(TransitionRule, &str)],
        buffering: BufferingMode,
        epsilon_ms: u64,
        answer: Answer,
    ) -> Self {
        let settings = SequenceSettings {
            buffering,
            transition_epsilon_ms: epsilon_ms,
            clips: clips
                .iter()
                .map(|(rule, source)| ClipConfig {
                    rule: *rule,
                    source: source.to_string(),
                })
                .collect(),
            ..Default::default()
        };

        let world = Shared::default();
        let controller = Controller::new(
            settings,
            Box::new(FakeStage {
                world: world.clone(),
            }),
            Box::new(FakeResolver {
                world: world.clone(),
                answer,
            }),
            Box::new(RecordingSink {
                world: world.clone(),
            }),
        );

        Self {
            controller,
            world,
            now: 0,
        }
    }

    pub fn world(&self) -> MutexGuard<'_, World> {
        lock(&self.world)
    }

    pub fn set_duration(&self, locator: &str, duration_ms: u64) {
        self.world()
            .durations
            .insert(locator.to_string(), duration_ms);
    }

    pub fn send(&self, event: ControllerEvent) {
        assert!(self.controller.events().send(event));
    }

    pub fn start(&self) {
        self.send(ControllerEvent::Init);
    }

    /// Queue a signal for surface `index`'s next poll
    pub fn signal(&self, index: usize, signal: SurfaceSignal) {
        self.world()
            .pending
            .entry(index)
            .or_default()
            .push(signal);
    }

    pub fn tick(&mut self) -> Phase {
        self.controller.tick(self.now)
    }

    pub fn tick_at(&mut self, now_ms: u64) -> Phase {
        self.now = now_ms;
        self.tick()
    }

    /// Tick at the current time until `phase` is reached; panics after `limit` ticks
    pub fn run_until(&mut self, phase: Phase, limit: usize) {
        for _ in 0..limit {
            if self.tick() == phase {
                return;
            }
        }
        panic!(
            "phase {} not reached within {} ticks (stuck in {})",
            phase,
            limit,
            self.controller.phase()
        );
    }

    pub fn commands(&self) -> Vec<String> {
        self.world().commands.clone()
    }

    /// Locators passed to `set_source`, in order
    pub fn loaded(&self) -> Vec<String> {
        self.commands()
            .iter()
            .filter_map(|c| c.strip_prefix("set_source "))
            .map(|rest| rest.split_once(' ').map_or(rest, |(_, l)| l).to_string())
            .collect()
    }

    pub fn active_index(&self) -> usize {
        self.controller.sequence().active_index()
    }
}

//! Tick driver
//!
//! Owns the controller and advances it on a blocking thread, paced at the
//! configured refresh rate. IPC commands arrive on a channel and are turned
//! into controller events between ticks; the snapshot is pushed into
//! [`DaemonState`] whenever something observable changed.

use anyhow::Result;
use common::Phase;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Mutex, mpsc};

use crate::DaemonState;
use crate::config::Config;
use crate::controller::{Controller, ControllerEvent, EventSender};
use crate::resolver::HttpResolver;
use crate::stage::HostStage;
use crate::status::LogSink;

/// Sequence commands forwarded from the IPC server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    Start,
    Stop,
    Skip,
    Restart,
}

impl DriverCommand {
    /// Controller events implementing this command, in posting order
    pub fn events(self) -> Vec<ControllerEvent> {
        match self {
            Self::Start => vec![ControllerEvent::Init],
            Self::Stop => vec![ControllerEvent::Stop],
            Self::Skip => vec![ControllerEvent::Skip],
            Self::Restart => vec![
                ControllerEvent::Stop,
                ControllerEvent::Restart,
                ControllerEvent::Init,
            ],
        }
    }
}

fn forward(events: &EventSender, command: DriverCommand) {
    log::debug!("Forwarding {:?}", command);
    for event in command.events() {
        if !events.send(event) {
            log::warn!("Controller is gone, dropping {:?}", command);
            return;
        }
    }
}

/// Must be called from within a tokio runtime (the resolver keeps its handle)
pub fn build_controller(config: &Config) -> Result<Controller> {
    let stage = HostStage::new(config.stage.clone());
    let resolver = HttpResolver::new(&config.resolver)?;

    Ok(Controller::new(
        config.sequence.clone(),
        Box::new(stage),
        Box::new(resolver),
        Box::new(LogSink),
    ))
}

pub async fn run(
    config: Config,
    state: Arc<Mutex<DaemonState>>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
) -> Result<()> {
    let controller = build_controller(&config)?;
    log::info!(
        "Driver running at {} ticks per second",
        config.stage.refresh_rate
    );

    spawn_drive(
        controller,
        config.sequence.autostart,
        config.stage.tick_interval(),
        state,
        commands,
    )
    .await
}

/// Run the tick loop for `controller` on the blocking pool until exit
pub async fn spawn_drive(
    controller: Controller,
    autostart: bool,
    period: Duration,
    state: Arc<Mutex<DaemonState>>,
    commands: mpsc::UnboundedReceiver<DriverCommand>,
) -> Result<()> {
    // Decoder teardown, GPU readback and resizing all block
    tokio::task::spawn_blocking(move || drive(controller, autostart, period, state, commands))
        .await?
}

fn drive(
    mut controller: Controller,
    autostart: bool,
    period: Duration,
    state: Arc<Mutex<DaemonState>>,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
) -> Result<()> {
    let events = controller.events();
    if autostart {
        log::info!("Autostart enabled, starting sequence");
        forward(&events, DriverCommand::Start);
    }

    let started = Instant::now();
    let mut next_tick = started;
    let mut published: Option<(Phase, u64, usize)> = None;

    'ticks: loop {
        loop {
            match commands.try_recv() {
                Ok(command) => forward(&events, command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::debug!("Command channel closed");
                    break 'ticks;
                }
            }
        }

        let now_ms = started.elapsed().as_millis() as u64;
        controller.tick(now_ms);

        // Contended lock: the next tick publishes instead
        if let Ok(mut state) = state.try_lock() {
            if state.should_exit {
                break;
            }

            let key = (
                controller.phase(),
                controller.sequence().generation(),
                controller.messages().len(),
            );
            if published != Some(key) {
                state.status = controller.snapshot();
                published = Some(key);
            }
        }

        next_tick += period;
        let now = Instant::now();
        match next_tick.checked_duration_since(now) {
            Some(delay) => std::thread::sleep(delay),
            // Missed ticks are skipped, not replayed
            None => next_tick = now,
        }
    }

    controller.shutdown();
    state.blocking_lock().status = controller.snapshot();
    log::info!("Driver stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClipConfig, ResolverSettings, SequenceSettings};
    use crate::render::{Bounds, RenderBackend, Viewport};
    use crate::stage::Stage;
    use crate::surface::PlayableSurface;
    use common::{RenderBackendKind, TransitionRule};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc as std_mpsc;

    /// Stage whose `measure` blocks until the test opens the gate
    struct GatedStage {
        entered: mpsc::UnboundedSender<()>,
        gate: std_mpsc::Receiver<()>,
        opened: Arc<AtomicBool>,
    }

    impl Stage for GatedStage {
        fn measure(&mut self) -> Viewport {
            let _ = self.entered.send(());
            let opened = self.gate.recv_timeout(Duration::from_secs(2)).is_ok();
            self.opened.store(opened, Ordering::SeqCst);
            Viewport::measure(
                Bounds {
                    x: 0.0,
                    y: 0.0,
                    width: 2.0,
                    height: 2.0,
                },
                1.0,
            )
        }

        fn create_backend(
            &mut self,
            _kind: RenderBackendKind,
            _viewport: &Viewport,
        ) -> Result<Box<dyn RenderBackend>> {
            anyhow::bail!("no backend here")
        }

        fn create_surface(&mut self, _index: usize) -> Result<Box<dyn PlayableSurface>> {
            anyhow::bail!("no surface here")
        }
    }

    #[test]
    fn test_restart_expands_to_stop_restart_init() {
        let events = DriverCommand::Restart.events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ControllerEvent::Stop));
        assert!(matches!(events[1], ControllerEvent::Restart));
        assert!(matches!(events[2], ControllerEvent::Init));
    }

    #[test]
    fn test_single_event_commands() {
        assert!(matches!(
            DriverCommand::Start.events().as_slice(),
            [ControllerEvent::Init]
        ));
        assert!(matches!(
            DriverCommand::Skip.events().as_slice(),
            [ControllerEvent::Skip]
        ));
        assert!(matches!(
            DriverCommand::Stop.events().as_slice(),
            [ControllerEvent::Stop]
        ));
    }

    #[tokio::test]
    async fn test_driver_exits_on_flag_and_publishes_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sequence.autostart = false;
        config.resolver.cache_dir = dir.path().display().to_string();

        let state = Arc::new(Mutex::new(DaemonState::new(0)));
        state.lock().await.should_exit = true;
        let (_tx, rx) = mpsc::unbounded_channel();

        run(config, state.clone(), rx).await.unwrap();
        assert_eq!(state.lock().await.status.phase, Phase::Inert);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_tick_leaves_runtime_free() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = HttpResolver::new(&ResolverSettings {
            cache_dir: dir.path().display().to_string(),
            ..Default::default()
        })
        .unwrap();

        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let opened = Arc::new(AtomicBool::new(false));
        let stage = GatedStage {
            entered: entered_tx,
            gate: gate_rx,
            opened: opened.clone(),
        };

        let settings = SequenceSettings {
            clips: vec![ClipConfig {
                rule: TransitionRule::Next,
                source: "a.mp4".to_string(),
            }],
            ..Default::default()
        };
        let controller = Controller::new(
            settings,
            Box::new(stage),
            Box::new(resolver),
            Box::new(LogSink),
        );

        let state = Arc::new(Mutex::new(DaemonState::new(1)));
        let (_tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(spawn_drive(
            controller,
            true,
            Duration::from_millis(5),
            state.clone(),
            rx,
        ));

        // This task only runs while the tick is parked inside `measure`
        // if the tick is off the runtime thread
        entered_rx.recv().await.unwrap();
        gate_tx.send(()).unwrap();

        for _ in 0..200 {
            if state.lock().await.status.phase == Phase::Stop {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        state.lock().await.should_exit = true;
        driver.await.unwrap().unwrap();

        assert!(opened.load(Ordering::SeqCst));
        let state = state.lock().await;
        assert_eq!(state.status.phase, Phase::Stop);
        assert!(
            state
                .status
                .messages
                .last()
                .unwrap()
                .text
                .contains("no backend here")
        );
    }
}

use crate::application::clock::{TickControl, TickHandle, TickSource};
use crate::application::next_id;
use crate::application::pomodoro_engine::{EngineEvent, PomodoroEngine, TimerSnapshot};
use crate::application::reconciliation::Reconciler;
use crate::domain::models::{PomodoroConfig, Task};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct EngineCell {
    engine: PomodoroEngine,
    ticker: Option<TickHandle>,
    now_provider: NowProvider,
}

struct Shared {
    cell: Mutex<EngineCell>,
    reconciler: Reconciler,
    ticks: TickSource,
    events: broadcast::Sender<EngineEvent>,
    snapshots: watch::Sender<TimerSnapshot>,
}

/// Runs a [`PomodoroEngine`] against the wall clock.
///
/// Commands and ticks are serialized through one mutex. Every resulting event
/// is handed to the [`Reconciler`] and broadcast, and the latest snapshot is
/// published on a watch channel, all before the lock is released.
#[derive(Clone)]
pub struct PomodoroService {
    shared: Arc<Shared>,
}

impl PomodoroService {
    pub fn new(config: PomodoroConfig, reconciler: Reconciler) -> Self {
        let ticks = TickSource::from_millis(config.tick_interval_ms);
        let engine = PomodoroEngine::new(config);
        let (snapshots, _) = watch::channel(engine.snapshot());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                cell: Mutex::new(EngineCell {
                    engine,
                    ticker: None,
                    now_provider: Arc::new(Utc::now),
                }),
                reconciler,
                ticks,
                events,
                snapshots,
            }),
        }
    }

    pub fn with_now_provider(self, now_provider: NowProvider) -> Self {
        match self.shared.lock() {
            Ok(mut cell) => cell.now_provider = now_provider,
            Err(error) => warn!(%error, "keeping default clock"),
        }
        self
    }

    pub fn start(&self, task: &Task) -> Result<TimerSnapshot, InfraError> {
        self.apply("start", |engine, now| {
            if let Some(previous) = engine.bound_task_id().filter(|id| *id != task.id) {
                let abandoned = engine.snapshot();
                info!(
                    previous_task_id = previous,
                    task_id = %task.id,
                    session_time_spent_ms = abandoned.session_time_spent_ms,
                    session_cycles_completed = abandoned.session_cycles_completed,
                    "switching tasks drops the bound session without recording it"
                );
            }
            engine.start(task, now)
        })
    }

    pub fn pause(&self) -> Result<TimerSnapshot, InfraError> {
        self.apply("pause", |engine, _| engine.pause())
    }

    pub fn resume(&self) -> Result<TimerSnapshot, InfraError> {
        self.apply("resume", |engine, _| engine.resume())
    }

    pub fn reset(&self) -> Result<TimerSnapshot, InfraError> {
        self.apply("reset", |engine, now| engine.reset(now, next_id("ses")))
    }

    pub fn snapshot(&self) -> Result<TimerSnapshot, InfraError> {
        Ok(self.shared.lock()?.engine.snapshot())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<TimerSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Keeps the bound task in step with the live task list.
    pub fn refresh_bound_task(&self, tasks: &[Task]) -> Result<(), InfraError> {
        let mut guard = self.shared.lock()?;
        let cell = &mut *guard;
        if cell.engine.refresh_bound_task(tasks) {
            debug!("bound task refreshed");
            self.shared.publish(&cell.engine, &[]);
        }
        Ok(())
    }

    fn apply<F>(&self, command: &str, operation: F) -> Result<TimerSnapshot, InfraError>
    where
        F: FnOnce(&mut PomodoroEngine, DateTime<Utc>) -> Vec<EngineEvent>,
    {
        let mut guard = self.shared.lock()?;
        let cell = &mut *guard;
        let now = (cell.now_provider)();
        let events = operation(&mut cell.engine, now);

        Shared::sync_ticker(&self.shared, cell);
        self.shared.publish(&cell.engine, &events);

        let snapshot = cell.engine.snapshot();
        if events.is_empty() {
            debug!(command, phase = snapshot.phase.as_str(), "pomodoro command was a no-op");
        } else {
            info!(
                command,
                phase = snapshot.phase.as_str(),
                task_id = snapshot.task.as_ref().map(|task| task.id.as_str()),
                "pomodoro state changed"
            );
        }
        Ok(snapshot)
    }
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, EngineCell>, InfraError> {
        self.cell
            .lock()
            .map_err(|error| InfraError::State(format!("pomodoro engine lock poisoned: {error}")))
    }

    /// Ensures exactly one tick loop exists, for the engine's current run
    /// generation, while the engine is running and none otherwise.
    fn sync_ticker(shared: &Arc<Shared>, cell: &mut EngineCell) {
        if !cell.engine.is_running() {
            if let Some(ticker) = cell.ticker.take() {
                ticker.cancel();
            }
            return;
        }

        let generation = cell.engine.generation();
        if cell.ticker.as_ref().map(TickHandle::generation) == Some(generation) {
            return;
        }
        if let Some(stale) = cell.ticker.take() {
            stale.cancel();
        }

        let weak = Arc::downgrade(shared);
        cell.ticker = Some(shared.ticks.spawn(generation, move || match weak.upgrade() {
            Some(shared) => Shared::on_tick(&shared, generation),
            None => TickControl::Stop,
        }));
    }

    fn on_tick(shared: &Arc<Shared>, generation: u64) -> TickControl {
        let mut guard = match shared.lock() {
            Ok(guard) => guard,
            Err(error) => {
                warn!(%error, "stopping tick loop");
                return TickControl::Stop;
            }
        };
        let cell = &mut *guard;
        if cell.engine.generation() != generation || !cell.engine.is_running() {
            return TickControl::Stop;
        }

        let events = cell.engine.on_tick();
        let control = if cell.engine.generation() == generation {
            TickControl::Continue
        } else {
            Shared::sync_ticker(shared, cell);
            TickControl::Stop
        };
        shared.publish(&cell.engine, &events);
        control
    }

    fn publish(&self, engine: &PomodoroEngine, events: &[EngineEvent]) {
        for event in events {
            self.reconciler.reconcile(event);
            // No receivers is fine; snapshots remain the source of truth.
            let _ = self.events.send(event.clone());
        }
        self.snapshots.send_replace(engine.snapshot());
    }
}

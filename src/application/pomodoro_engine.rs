//! Single-task Pomodoro state machine.
//!
//! The engine owns phase, remaining time and the bound session's accounting.
//! It never touches storage or timers itself: every operation returns the
//! [`EngineEvent`]s it produced, and the caller reconciles them and keeps a tick
//! loop alive while [`PomodoroEngine::is_running`] holds. The run generation
//! changes whenever the current tick loop must be replaced, so a loop spawned
//! for an older generation can recognise itself as stale.

use crate::domain::models::{PomodoroConfig, PomodoroSession, Task, TaskStatus, TimerPhase};
use crate::domain::time_accountant::{CommitDelta, SessionAccounting};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Logical length of one tick, independent of the wall-clock tick interval.
pub const TICK_MS: u64 = 1_000;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionStarted {
        task_id: String,
    },
    PhaseChanged {
        from: TimerPhase,
        to: TimerPhase,
        time_remaining_ms: u64,
    },
    CycleCompleted {
        task_id: String,
        cycle: u32,
        delta: CommitDelta,
    },
    SessionFinished {
        task_id: String,
        record: PomodoroSession,
        trailing: CommitDelta,
        restore_status: bool,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub phase: TimerPhase,
    pub paused_from: Option<TimerPhase>,
    pub time_remaining_ms: u64,
    pub task: Option<Task>,
    pub session_start_time: Option<DateTime<Utc>>,
    pub session_cycles_completed: u32,
    pub session_time_spent_ms: u64,
}

#[derive(Debug, Clone)]
struct BoundSession {
    task: Task,
    accounting: SessionAccounting,
}

#[derive(Debug, Clone)]
pub struct PomodoroEngine {
    config: PomodoroConfig,
    phase: TimerPhase,
    paused_from: Option<TimerPhase>,
    time_remaining_ms: u64,
    session: Option<BoundSession>,
    run_generation: u64,
}

impl PomodoroEngine {
    pub fn new(config: PomodoroConfig) -> Self {
        Self {
            config,
            phase: TimerPhase::Idle,
            paused_from: None,
            time_remaining_ms: 0,
            session: None,
            run_generation: 0,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn generation(&self) -> u64 {
        self.run_generation
    }

    pub fn bound_task_id(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.task.id.as_str())
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            phase: self.phase,
            paused_from: self.paused_from,
            time_remaining_ms: self.time_remaining_ms,
            task: self.session.as_ref().map(|session| session.task.clone()),
            session_start_time: self
                .session
                .as_ref()
                .map(|session| session.accounting.start_time()),
            session_cycles_completed: self
                .session
                .as_ref()
                .map_or(0, |session| session.accounting.cycles_completed()),
            session_time_spent_ms: self
                .session
                .as_ref()
                .map_or(0, |session| session.accounting.time_spent_ms()),
        }
    }

    /// Binds `task` and begins a WORK phase.
    ///
    /// The same task while paused resumes, and while running is a no-op. Any
    /// other task replaces the bound session with fresh accounting.
    pub fn start(&mut self, task: &Task, now: DateTime<Utc>) -> Vec<EngineEvent> {
        if self.bound_task_id() == Some(task.id.as_str()) {
            if self.phase == TimerPhase::Paused {
                return self.resume();
            }
            if self.phase.is_running() {
                return Vec::new();
            }
        }

        let from = self.phase;
        self.session = Some(BoundSession {
            task: task.clone(),
            accounting: SessionAccounting::begin(now),
        });
        self.paused_from = None;
        self.enter(TimerPhase::Work, self.config.work_duration_ms);

        vec![
            EngineEvent::SessionStarted {
                task_id: task.id.clone(),
            },
            self.phase_changed(from),
        ]
    }

    pub fn pause(&mut self) -> Vec<EngineEvent> {
        if !self.phase.is_running() {
            return Vec::new();
        }
        let from = self.phase;
        self.paused_from = Some(from);
        self.phase = TimerPhase::Paused;
        self.run_generation += 1;
        vec![self.phase_changed(from)]
    }

    pub fn resume(&mut self) -> Vec<EngineEvent> {
        if self.phase != TimerPhase::Paused {
            return Vec::new();
        }
        let Some(target) = self.paused_from.take() else {
            return Vec::new();
        };
        self.phase = target;
        self.run_generation += 1;
        vec![self.phase_changed(TimerPhase::Paused)]
    }

    /// Ends the bound session, if any, and returns to IDLE.
    pub fn reset(&mut self, now: DateTime<Utc>, session_id: impl Into<String>) -> Vec<EngineEvent> {
        let from = self.phase;
        let mut events = Vec::new();

        if let Some(session) = self.session.take() {
            let (record, trailing) =
                session
                    .accounting
                    .close(session_id, now, self.config.work_duration_ms);
            events.push(EngineEvent::SessionFinished {
                task_id: session.task.id,
                record,
                trailing,
                restore_status: session.task.status != TaskStatus::Completed,
            });
        }

        self.paused_from = None;
        self.phase = TimerPhase::Idle;
        self.time_remaining_ms = 0;
        self.run_generation += 1;

        if from != TimerPhase::Idle {
            events.push(self.phase_changed(from));
        }
        events
    }

    /// Advances the running phase by one logical second. Ignored unless running.
    pub fn on_tick(&mut self) -> Vec<EngineEvent> {
        if !self.phase.is_running() {
            return Vec::new();
        }

        self.time_remaining_ms = self.time_remaining_ms.saturating_sub(TICK_MS);
        if self.phase == TimerPhase::Work {
            if let Some(session) = self.session.as_mut() {
                session.accounting.record_work(TICK_MS);
            }
        }

        if self.time_remaining_ms == 0 {
            return self.on_phase_complete();
        }
        Vec::new()
    }

    /// Replaces the bound task snapshot with its latest version from `tasks`.
    /// Returns whether anything changed.
    pub fn refresh_bound_task(&mut self, tasks: &[Task]) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match tasks.iter().find(|task| task.id == session.task.id) {
            Some(latest) if *latest != session.task => {
                session.task = latest.clone();
                true
            }
            _ => false,
        }
    }

    fn on_phase_complete(&mut self) -> Vec<EngineEvent> {
        let from = self.phase;
        let mut events = Vec::new();

        match from {
            TimerPhase::Work => {
                let work_ms = self.config.work_duration_ms;
                let mut cycle = 0;
                if let Some(session) = self.session.as_mut() {
                    let delta = session.accounting.complete_cycle(work_ms);
                    cycle = session.accounting.cycles_completed();
                    events.push(EngineEvent::CycleCompleted {
                        task_id: session.task.id.clone(),
                        cycle,
                        delta,
                    });
                }
                let (next, duration) = if is_long_break_cycle(cycle, self.config.cycles_before_long_break)
                {
                    (TimerPhase::LongBreak, self.config.long_break_ms)
                } else {
                    (TimerPhase::ShortBreak, self.config.short_break_ms)
                };
                self.enter(next, duration);
            }
            TimerPhase::ShortBreak | TimerPhase::LongBreak => {
                self.enter(TimerPhase::Work, self.config.work_duration_ms);
            }
            TimerPhase::Idle | TimerPhase::Paused => return events,
        }

        events.push(self.phase_changed(from));
        events
    }

    fn enter(&mut self, phase: TimerPhase, duration_ms: u64) {
        self.phase = phase;
        self.time_remaining_ms = duration_ms;
        self.run_generation += 1;
    }

    fn phase_changed(&self, from: TimerPhase) -> EngineEvent {
        EngineEvent::PhaseChanged {
            from,
            to: self.phase,
            time_remaining_ms: self.time_remaining_ms,
        }
    }
}

/// Completed cycles are counted from 1, so with a modulus of 4 the 4th, 8th and
/// 12th WORK phases are followed by a long break.
pub fn is_long_break_cycle(completed_cycles: u32, cycles_before_long_break: u32) -> bool {
    completed_cycles > 0
        && cycles_before_long_break > 0
        && completed_cycles % cycles_before_long_break == 0
}

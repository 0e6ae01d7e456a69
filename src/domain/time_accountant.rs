//! Session time bookkeeping.
//!
//! Work time reaches a task's counters in exactly two ways: one full cycle at a
//! time when a WORK phase completes, and once more at session end for the
//! trailing slice of work that never completed a cycle. Pausing commits
//! nothing, so the sum of everything committed for a session equals the WORK
//! time the session accrued.

use crate::domain::models::PomodoroSession;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Additive change to a task's `total_time_spent_ms` / `total_pomodoro_cycles`.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CommitDelta {
    pub time_ms: u64,
    pub cycles: u32,
}

impl CommitDelta {
    pub const ZERO: CommitDelta = CommitDelta {
        time_ms: 0,
        cycles: 0,
    };

    pub fn is_zero(&self) -> bool {
        self.time_ms == 0 && self.cycles == 0
    }
}

pub fn commit_full_cycle(work_duration_ms: u64) -> CommitDelta {
    CommitDelta {
        time_ms: work_duration_ms,
        cycles: 1,
    }
}

/// Work time accrued since the last fully committed cycle.
///
/// Zero when the session ended on a cycle boundary or inside a break, since
/// break time never accrues.
pub fn commit_partial(
    session_time_spent_ms: u64,
    session_cycles_completed: u32,
    work_duration_ms: u64,
) -> CommitDelta {
    let committed = u64::from(session_cycles_completed).saturating_mul(work_duration_ms);
    match session_time_spent_ms.checked_sub(committed) {
        Some(remainder) if remainder > 0 => CommitDelta {
            time_ms: remainder,
            cycles: 0,
        },
        _ => CommitDelta::ZERO,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAccounting {
    start_time: DateTime<Utc>,
    cycles_completed: u32,
    time_spent_ms: u64,
}

impl SessionAccounting {
    pub fn begin(now: DateTime<Utc>) -> Self {
        Self {
            start_time: now,
            cycles_completed: 0,
            time_spent_ms: 0,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn cycles_completed(&self) -> u32 {
        self.cycles_completed
    }

    pub fn time_spent_ms(&self) -> u64 {
        self.time_spent_ms
    }

    pub fn record_work(&mut self, elapsed_ms: u64) {
        self.time_spent_ms = self.time_spent_ms.saturating_add(elapsed_ms);
    }

    pub fn complete_cycle(&mut self, work_duration_ms: u64) -> CommitDelta {
        self.cycles_completed = self.cycles_completed.saturating_add(1);
        commit_full_cycle(work_duration_ms)
    }

    /// Builds the immutable session record and the trailing uncommitted delta.
    pub fn close(
        &self,
        session_id: impl Into<String>,
        now: DateTime<Utc>,
        work_duration_ms: u64,
    ) -> (PomodoroSession, CommitDelta) {
        let record = PomodoroSession {
            id: session_id.into(),
            start_datetime: self.start_time,
            finish_datetime: now.max(self.start_time),
            completed_cycles: self.cycles_completed,
            time_used_ms: self.time_spent_ms,
        };
        let trailing = commit_partial(self.time_spent_ms, self.cycles_completed, work_duration_ms);
        (record, trailing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WORK_MS: u64 = 25 * 60 * 1000;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn full_cycle_commits_one_work_duration() {
        assert_eq!(
            commit_full_cycle(WORK_MS),
            CommitDelta {
                time_ms: WORK_MS,
                cycles: 1
            }
        );
    }

    #[test]
    fn partial_is_zero_on_cycle_boundary() {
        assert!(commit_partial(0, 0, WORK_MS).is_zero());
        assert!(commit_partial(2 * WORK_MS, 2, WORK_MS).is_zero());
    }

    #[test]
    fn partial_returns_trailing_work_slice() {
        assert_eq!(
            commit_partial(WORK_MS + 10_000, 1, WORK_MS),
            CommitDelta {
                time_ms: 10_000,
                cycles: 0
            }
        );
    }

    #[test]
    fn partial_never_goes_negative() {
        assert!(commit_partial(1_000, 1, WORK_MS).is_zero());
    }

    #[test]
    fn close_builds_record_and_trailing_delta() {
        let start = fixed_time("2026-02-16T09:00:00Z");
        let mut accounting = SessionAccounting::begin(start);
        for _ in 0..10 {
            accounting.record_work(1_000);
        }

        let (record, trailing) =
            accounting.close("ses-1", fixed_time("2026-02-16T09:00:10Z"), WORK_MS);

        assert_eq!(record.completed_cycles, 0);
        assert_eq!(record.time_used_ms, 10_000);
        assert_eq!(record.start_datetime, start);
        assert_eq!(
            trailing,
            CommitDelta {
                time_ms: 10_000,
                cycles: 0
            }
        );
    }

    #[test]
    fn close_clamps_finish_before_start() {
        let start = fixed_time("2026-02-16T09:00:00Z");
        let accounting = SessionAccounting::begin(start);
        let (record, _) = accounting.close("ses-1", fixed_time("2026-02-16T08:00:00Z"), WORK_MS);
        assert_eq!(record.finish_datetime, start);
        assert!(record.validate().is_ok());
    }

    proptest! {
        #[test]
        fn committed_deltas_sum_to_work_time(
            work_seconds in 1u64..120u64,
            full_cycles in 0u32..12u32,
            trailing_seconds in 0u64..120u64,
        ) {
            let work_ms = work_seconds * 1_000;
            let trailing_ms = (trailing_seconds % work_seconds) * 1_000;
            let mut accounting = SessionAccounting::begin(Utc::now());
            let mut committed = CommitDelta::ZERO;

            for _ in 0..full_cycles {
                for _ in 0..work_seconds {
                    accounting.record_work(1_000);
                }
                let delta = accounting.complete_cycle(work_ms);
                committed.time_ms += delta.time_ms;
                committed.cycles += delta.cycles;
            }
            for _ in 0..(trailing_ms / 1_000) {
                accounting.record_work(1_000);
            }

            let (record, trailing) = accounting.close("ses-prop", Utc::now(), work_ms);
            prop_assert_eq!(committed.time_ms + trailing.time_ms, record.time_used_ms);
            prop_assert_eq!(committed.cycles, full_cycles);
            prop_assert_eq!(trailing.cycles, 0);
        }

        #[test]
        fn partial_is_zero_whenever_spent_matches_cycles(
            work_ms in 1u64..10_000_000u64,
            cycles in 0u32..64u32,
        ) {
            let spent = u64::from(cycles) * work_ms;
            prop_assert!(commit_partial(spent, cycles, work_ms).is_zero());
        }
    }
}

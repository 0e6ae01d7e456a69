pub mod advisor;
pub mod bootstrap;
pub mod clock;
pub mod commands;
pub mod pomodoro_engine;
pub mod reconciliation;
pub mod service;
pub mod task_feed;

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

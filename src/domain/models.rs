use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    /// Lenient parse for model output; anything unrecognized is the easiest level.
    pub fn parse_or_easiest(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Easy)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub due_date: Option<DateTime<Utc>>,
    pub creation_date: Option<DateTime<Utc>>,
    pub user_difficulty: DifficultyLevel,
    pub details: String,
    pub ai_difficulty: Option<DifficultyLevel>,
    pub recommended_time_min: Option<u32>,
    pub ai_reasoning: Option<String>,
    pub ai_study_tips: Option<String>,
    pub status: TaskStatus,
    pub total_time_spent_ms: u64,
    pub total_pomodoro_cycles: u32,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.name, "task.name")?;
        validate_non_empty(&self.subject, "task.subject")?;
        Ok(())
    }

    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(difficulty) = patch.ai_difficulty {
            self.ai_difficulty = Some(difficulty);
        }
        if let Some(minutes) = patch.recommended_time_min {
            self.recommended_time_min = Some(minutes);
        }
        if let Some(reasoning) = &patch.ai_reasoning {
            self.ai_reasoning = Some(reasoning.clone());
        }
        if let Some(tips) = &patch.ai_study_tips {
            self.ai_study_tips = Some(tips.clone());
        }
    }
}

/// Partial update of a task's status and AI fields.
///
/// The time/cycle accumulators only move through [`CounterField`] increments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub ai_difficulty: Option<DifficultyLevel>,
    pub recommended_time_min: Option<u32>,
    pub ai_reasoning: Option<String>,
    pub ai_study_tips: Option<String>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn ai_analysis(result: &AiAnalysisResult) -> Self {
        Self {
            ai_difficulty: Some(result.difficulty),
            recommended_time_min: Some(result.recommended_time_min),
            ai_reasoning: Some(result.reasoning.clone()),
            ..Self::default()
        }
    }

    pub fn study_tips(tips: impl Into<String>) -> Self {
        Self {
            ai_study_tips: Some(tips.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    TotalTimeSpentMs,
    TotalPomodoroCycles,
}

impl CounterField {
    pub fn column(self) -> &'static str {
        match self {
            Self::TotalTimeSpentMs => "total_time_spent_ms",
            Self::TotalPomodoroCycles => "total_pomodoro_cycles",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PomodoroSession {
    pub id: String,
    pub start_datetime: DateTime<Utc>,
    pub finish_datetime: DateTime<Utc>,
    pub completed_cycles: u32,
    pub time_used_ms: u64,
}

impl PomodoroSession {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        if self.finish_datetime < self.start_datetime {
            return Err("session.finish_datetime must be >= session.start_datetime".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiAnalysisResult {
    pub difficulty: DifficultyLevel,
    pub recommended_time_min: u32,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Summary,
    Flashcards,
    General(String),
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("summary") {
            Self::Summary
        } else if trimmed.eq_ignore_ascii_case("flashcards") {
            Self::Flashcards
        } else {
            Self::General(trimmed.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Summary => "Summary",
            Self::Flashcards => "Flashcards",
            Self::General(label) if !label.is_empty() => label,
            Self::General(_) => "content",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Work,
    ShortBreak,
    LongBreak,
    Paused,
}

impl TimerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Work => "work",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
            Self::Paused => "paused",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Work | Self::ShortBreak | Self::LongBreak)
    }
}

pub const DEFAULT_WORK_MINUTES: u64 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u64 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u64 = 15;
pub const DEFAULT_CYCLES_BEFORE_LONG_BREAK: u32 = 4;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PomodoroConfig {
    pub work_duration_ms: u64,
    pub short_break_ms: u64,
    pub long_break_ms: u64,
    pub cycles_before_long_break: u32,
    /// Wall-clock period between ticks. Each tick is one logical second.
    pub tick_interval_ms: u64,
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        Self {
            work_duration_ms: minutes_to_ms(DEFAULT_WORK_MINUTES),
            short_break_ms: minutes_to_ms(DEFAULT_SHORT_BREAK_MINUTES),
            long_break_ms: minutes_to_ms(DEFAULT_LONG_BREAK_MINUTES),
            cycles_before_long_break: DEFAULT_CYCLES_BEFORE_LONG_BREAK,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl PomodoroConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.work_duration_ms == 0 {
            return Err("pomodoro.work_duration_ms must be > 0".to_string());
        }
        if self.short_break_ms == 0 {
            return Err("pomodoro.short_break_ms must be > 0".to_string());
        }
        if self.long_break_ms == 0 {
            return Err("pomodoro.long_break_ms must be > 0".to_string());
        }
        if self.cycles_before_long_break == 0 {
            return Err("pomodoro.cycles_before_long_break must be > 0".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("pomodoro.tick_interval_ms must be > 0".to_string());
        }
        Ok(())
    }
}

pub fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60_000)
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

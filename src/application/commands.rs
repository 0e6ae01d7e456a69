use crate::application::advisor::StudyAdvisor;
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::next_id;
use crate::application::pomodoro_engine::TimerSnapshot;
use crate::application::reconciliation::Reconciler;
use crate::application::service::PomodoroService;
use crate::application::task_feed::TaskFeed;
use crate::domain::models::{
    ContentType, DifficultyLevel, PomodoroSession, Task, TaskPatch, TaskStatus,
};
use crate::domain::task_view::TaskBoard;
use crate::infrastructure::ai_gateway::{AiAdvisoryGateway, GeminiAiGateway, GeminiConfig};
use crate::infrastructure::config::{read_ai_model, read_pomodoro_config, DEFAULT_AI_MODEL};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::{SqliteTaskRepository, TaskRepository};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Process-wide wiring of the repository, timer, feed and advisor.
///
/// Must be created inside a tokio runtime: the reconciliation worker is
/// spawned on construction.
pub struct AppState {
    repository: Arc<SqliteTaskRepository>,
    reconciler: Reconciler,
    timer: PomodoroService,
    feed: TaskFeed,
    advisor: Arc<StudyAdvisor<SqliteTaskRepository>>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let model = read_ai_model(&workspace_root.join("config")).unwrap_or_else(|error| {
            warn!(%error, "falling back to default ai model");
            DEFAULT_AI_MODEL.to_string()
        });
        let gateway = GeminiAiGateway::new(GeminiConfig::from_env(model));
        if !gateway.is_configured() {
            warn!("gemini api key is not set; ai features will report errors");
        }
        Self::with_gateway(workspace_root, Arc::new(gateway))
    }

    pub fn with_gateway(
        workspace_root: PathBuf,
        gateway: Arc<dyn AiAdvisoryGateway>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let pomodoro_config = read_pomodoro_config(&bootstrap.config_dir)?;

        let repository = Arc::new(SqliteTaskRepository::new(&bootstrap.database_path));
        let reconciler = Reconciler::spawn(Arc::clone(&repository));
        let timer = PomodoroService::new(pomodoro_config, reconciler.clone());
        let feed = TaskFeed::attach(Arc::clone(&repository), timer.clone())?;
        let advisor = Arc::new(StudyAdvisor::new(Arc::clone(&repository), gateway));

        info!(
            workspace_root = %bootstrap.workspace_root.display(),
            database_path = %bootstrap.database_path.display(),
            "app state initialized"
        );

        Ok(Self {
            repository,
            reconciler,
            timer,
            feed,
            advisor,
        })
    }

    pub fn timer(&self) -> &PomodoroService {
        &self.timer
    }

    /// Waits until every queued repository write has been attempted.
    pub async fn flush_writes(&self) -> Result<(), InfraError> {
        self.reconciler.flush().await
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PomodoroStateResponse {
    pub phase: String,
    pub paused_from: Option<String>,
    pub remaining_ms: u64,
    pub remaining_seconds: u64,
    pub task_id: Option<String>,
    pub task_name: Option<String>,
    pub session_start_time: Option<String>,
    pub session_cycles_completed: u32,
    pub session_time_spent_ms: u64,
}

impl From<TimerSnapshot> for PomodoroStateResponse {
    fn from(snapshot: TimerSnapshot) -> Self {
        Self {
            phase: snapshot.phase.as_str().to_string(),
            paused_from: snapshot.paused_from.map(|phase| phase.as_str().to_string()),
            remaining_ms: snapshot.time_remaining_ms,
            remaining_seconds: snapshot.time_remaining_ms.div_ceil(1_000),
            task_id: snapshot.task.as_ref().map(|task| task.id.clone()),
            task_name: snapshot.task.as_ref().map(|task| task.name.clone()),
            session_start_time: snapshot.session_start_time.map(|value| value.to_rfc3339()),
            session_cycles_completed: snapshot.session_cycles_completed,
            session_time_spent_ms: snapshot.session_time_spent_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AiContentResponse {
    pub task_id: String,
    pub content: String,
}

pub fn create_task_impl(
    state: &AppState,
    name: String,
    subject: String,
    due_date: Option<String>,
    user_difficulty: Option<String>,
    details: Option<String>,
) -> Result<Task, InfraError> {
    let name = required_text(&name, "name")?;
    let subject = required_text(&subject, "subject")?;
    let due_date = due_date
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(parse_due_date_input)
        .transpose()?;
    let user_difficulty = match user_difficulty
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(raw) => DifficultyLevel::parse(raw).ok_or_else(|| {
            InfraError::InvalidConfig(format!("unsupported difficulty: {raw}"))
        })?,
        None => DifficultyLevel::Easy,
    };

    let task = Task {
        id: next_id("tsk"),
        name,
        subject,
        due_date,
        creation_date: Some(Utc::now()),
        user_difficulty,
        details: details.map(|value| value.trim().to_string()).unwrap_or_default(),
        ai_difficulty: None,
        recommended_time_min: None,
        ai_reasoning: None,
        ai_study_tips: None,
        status: TaskStatus::Todo,
        total_time_spent_ms: 0,
        total_pomodoro_cycles: 0,
    };
    task.validate().map_err(InfraError::InvalidConfig)?;
    state.repository.put(&task)?;
    info!(task_id = %task.id, "created task");

    let advisor = Arc::clone(&state.advisor);
    let analyzed = task.clone();
    tokio::spawn(async move {
        if let Err(error) = advisor.analyze_and_store(&analyzed).await {
            warn!(task_id = %analyzed.id, %error, "failed to store difficulty analysis");
        }
    });

    Ok(task)
}

pub fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    state.repository.list()
}

pub fn sorted_tasks_impl(state: &AppState) -> Result<TaskBoard, InfraError> {
    Ok(state.feed.board())
}

pub fn update_task_status_impl(
    state: &AppState,
    task_id: String,
    status: String,
) -> Result<Task, InfraError> {
    let task_id = required_text(&task_id, "task_id")?;
    let status = parse_task_status(&status)?;
    let updated = state
        .repository
        .update_fields(&task_id, &TaskPatch::status(status))?;
    info!(%task_id, status = status.as_str(), "updated task status");
    Ok(updated)
}

/// Deletes a task. A session bound to it is ended first so its record and
/// trailing work are written before the task and its history disappear.
pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, InfraError> {
    let task_id = required_text(&task_id, "task_id")?;
    let bound = state.timer.snapshot()?.task.map(|task| task.id);
    if bound.as_deref() == Some(task_id.as_str()) {
        state.timer.reset()?;
        state.reconciler.flush().await?;
    }

    let removed = state.repository.delete(&task_id)?;
    if removed {
        info!(%task_id, "deleted task");
    }
    Ok(removed)
}

pub fn start_pomodoro_impl(
    state: &AppState,
    task_id: String,
) -> Result<PomodoroStateResponse, InfraError> {
    let task = find_task(state, &task_id)?;
    Ok(state.timer.start(&task)?.into())
}

pub fn pause_pomodoro_impl(state: &AppState) -> Result<PomodoroStateResponse, InfraError> {
    Ok(state.timer.pause()?.into())
}

pub fn resume_pomodoro_impl(state: &AppState) -> Result<PomodoroStateResponse, InfraError> {
    Ok(state.timer.resume()?.into())
}

pub fn reset_pomodoro_impl(state: &AppState) -> Result<PomodoroStateResponse, InfraError> {
    Ok(state.timer.reset()?.into())
}

pub fn get_pomodoro_state_impl(state: &AppState) -> Result<PomodoroStateResponse, InfraError> {
    Ok(state.timer.snapshot()?.into())
}

pub fn list_sessions_impl(
    state: &AppState,
    task_id: String,
) -> Result<Vec<PomodoroSession>, InfraError> {
    let task_id = required_text(&task_id, "task_id")?;
    state.repository.list_sessions(&task_id)
}

pub async fn get_ai_tips_impl(
    state: &AppState,
    task_id: String,
) -> Result<AiContentResponse, InfraError> {
    let task = find_task(state, &task_id)?;
    let content = state.advisor.study_tips(&task).await;
    Ok(AiContentResponse {
        task_id: task.id,
        content,
    })
}

pub async fn generate_content_impl(
    state: &AppState,
    task_id: String,
    content_type: String,
) -> Result<AiContentResponse, InfraError> {
    let task = find_task(state, &task_id)?;
    let content = state
        .advisor
        .generate_content(&task, &ContentType::parse(&content_type))
        .await;
    Ok(AiContentResponse {
        task_id: task.id,
        content,
    })
}

pub fn get_ai_content_impl(state: &AppState) -> Option<String> {
    state.advisor.content_result()
}

pub fn clear_ai_content_impl(state: &AppState) {
    state.advisor.clear_content_result();
}

fn find_task(state: &AppState, task_id: &str) -> Result<Task, InfraError> {
    let task_id = required_text(task_id, "task_id")?;
    state
        .repository
        .get(&task_id)?
        .ok_or_else(|| InfraError::NotFound(format!("task not found: {task_id}")))
}

fn required_text(value: &str, field_name: &str) -> Result<String, InfraError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InfraError::InvalidConfig(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn parse_task_status(value: &str) -> Result<TaskStatus, InfraError> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "in_progress" | "doing" => Ok(TaskStatus::InProgress),
        "done" => Ok(TaskStatus::Completed),
        other => TaskStatus::parse(other).ok_or_else(|| {
            InfraError::InvalidConfig(format!("unsupported task status: {other}"))
        }),
    }
}

fn parse_due_date_input(value: &str) -> Result<DateTime<Utc>, InfraError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "due_date must be an RFC3339 date-time or YYYY-MM-DD: {value}"
            ))
        })
}

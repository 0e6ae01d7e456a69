use crate::domain::models::{
    CounterField, DifficultyLevel, PomodoroSession, Task, TaskPatch, TaskStatus,
};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub type TaskListener = Arc<dyn Fn(&[Task]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Store of tasks and their session history.
///
/// `increment` must be additive at the store: callers never read a counter,
/// add to it locally and write it back.
pub trait TaskRepository: Send + Sync {
    fn put(&self, task: &Task) -> Result<(), InfraError>;
    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError>;
    fn list(&self) -> Result<Vec<Task>, InfraError>;
    fn update_fields(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError>;
    fn increment(&self, task_id: &str, field: CounterField, amount: u64) -> Result<(), InfraError>;
    fn delete(&self, task_id: &str) -> Result<bool, InfraError>;
    fn add_session_record(&self, task_id: &str, session: &PomodoroSession) -> Result<(), InfraError>;
    fn list_sessions(&self, task_id: &str) -> Result<Vec<PomodoroSession>, InfraError>;
    /// Registers `listener`; it is called with the current list right away and
    /// with the full list after every task change.
    fn subscribe(&self, listener: TaskListener) -> Result<SubscriptionId, InfraError>;
    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, InfraError>;
}

#[derive(Default)]
struct TaskListeners {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, TaskListener)>>,
}

impl fmt::Debug for TaskListeners {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.listeners.lock().map(|listeners| listeners.len()).unwrap_or(0);
        formatter
            .debug_struct("TaskListeners")
            .field("count", &count)
            .finish()
    }
}

impl TaskListeners {
    fn add(&self, listener: TaskListener) -> Result<SubscriptionId, InfraError> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()?.push((id, listener));
        Ok(id)
    }

    fn remove(&self, id: SubscriptionId) -> Result<bool, InfraError> {
        let mut listeners = self.lock()?;
        let before = listeners.len();
        listeners.retain(|(candidate, _)| *candidate != id);
        Ok(listeners.len() != before)
    }

    fn notify(&self, tasks: &[Task]) {
        // Listeners run outside the registry lock so they may call back into the store.
        let listeners = match self.lock() {
            Ok(listeners) => listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect::<Vec<_>>(),
            Err(error) => {
                warn!(%error, "skipping task change notification");
                return;
            }
        };
        for listener in listeners {
            listener(tasks);
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Vec<(SubscriptionId, TaskListener)>>, InfraError> {
        self.listeners
            .lock()
            .map_err(|error| InfraError::State(format!("task listeners lock poisoned: {error}")))
    }
}

fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|left, right| match (left.creation_date, right.creation_date) {
        (Some(left_date), Some(right_date)) => {
            left_date.cmp(&right_date).then_with(|| left.id.cmp(&right.id))
        }
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => left.id.cmp(&right.id),
    });
}

fn normalized_id(task_id: &str) -> Result<&str, InfraError> {
    let normalized = task_id.trim();
    if normalized.is_empty() {
        return Err(InfraError::InvalidConfig("task_id must not be empty".to_string()));
    }
    Ok(normalized)
}

fn task_not_found(task_id: &str) -> InfraError {
    InfraError::NotFound(format!("task not found: {task_id}"))
}

/// Local-only store; also the repository used by tests.
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
    sessions: Mutex<HashMap<String, Vec<PomodoroSession>>>,
    listeners: TaskListeners,
}

impl InMemoryTaskRepository {
    fn lock_tasks(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Task>>, InfraError> {
        self.tasks
            .lock()
            .map_err(|error| InfraError::State(format!("task store lock poisoned: {error}")))
    }

    fn lock_sessions(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<PomodoroSession>>>, InfraError> {
        self.sessions
            .lock()
            .map_err(|error| InfraError::State(format!("session store lock poisoned: {error}")))
    }

    fn snapshot(tasks: &HashMap<String, Task>) -> Vec<Task> {
        let mut list = tasks.values().cloned().collect::<Vec<_>>();
        sort_tasks(&mut list);
        list
    }
}

impl TaskRepository for InMemoryTaskRepository {
    fn put(&self, task: &Task) -> Result<(), InfraError> {
        task.validate().map_err(InfraError::InvalidConfig)?;
        let snapshot = {
            let mut tasks = self.lock_tasks()?;
            tasks.insert(task.id.clone(), task.clone());
            Self::snapshot(&tasks)
        };
        self.listeners.notify(&snapshot);
        Ok(())
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        let task_id = normalized_id(task_id)?;
        Ok(self.lock_tasks()?.get(task_id).cloned())
    }

    fn list(&self) -> Result<Vec<Task>, InfraError> {
        let tasks = self.lock_tasks()?;
        Ok(Self::snapshot(&tasks))
    }

    fn update_fields(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError> {
        let task_id = normalized_id(task_id)?;
        let (updated, snapshot) = {
            let mut tasks = self.lock_tasks()?;
            let task = tasks.get_mut(task_id).ok_or_else(|| task_not_found(task_id))?;
            task.apply_patch(patch);
            let updated = task.clone();
            (updated, Self::snapshot(&tasks))
        };
        self.listeners.notify(&snapshot);
        Ok(updated)
    }

    fn increment(&self, task_id: &str, field: CounterField, amount: u64) -> Result<(), InfraError> {
        let task_id = normalized_id(task_id)?;
        let snapshot = {
            let mut tasks = self.lock_tasks()?;
            let task = tasks.get_mut(task_id).ok_or_else(|| task_not_found(task_id))?;
            match field {
                CounterField::TotalTimeSpentMs => {
                    task.total_time_spent_ms = task.total_time_spent_ms.saturating_add(amount);
                }
                CounterField::TotalPomodoroCycles => {
                    let amount = u32::try_from(amount).unwrap_or(u32::MAX);
                    task.total_pomodoro_cycles = task.total_pomodoro_cycles.saturating_add(amount);
                }
            }
            Self::snapshot(&tasks)
        };
        self.listeners.notify(&snapshot);
        Ok(())
    }

    fn delete(&self, task_id: &str) -> Result<bool, InfraError> {
        let task_id = normalized_id(task_id)?;
        let snapshot = {
            let mut tasks = self.lock_tasks()?;
            if tasks.remove(task_id).is_none() {
                return Ok(false);
            }
            Self::snapshot(&tasks)
        };
        self.lock_sessions()?.remove(task_id);
        self.listeners.notify(&snapshot);
        Ok(true)
    }

    fn add_session_record(&self, task_id: &str, session: &PomodoroSession) -> Result<(), InfraError> {
        let task_id = normalized_id(task_id)?;
        session.validate().map_err(InfraError::InvalidConfig)?;
        if !self.lock_tasks()?.contains_key(task_id) {
            return Err(task_not_found(task_id));
        }
        self.lock_sessions()?
            .entry(task_id.to_string())
            .or_default()
            .push(session.clone());
        Ok(())
    }

    fn list_sessions(&self, task_id: &str) -> Result<Vec<PomodoroSession>, InfraError> {
        let task_id = normalized_id(task_id)?;
        Ok(self
            .lock_sessions()?
            .get(task_id)
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe(&self, listener: TaskListener) -> Result<SubscriptionId, InfraError> {
        let id = self.listeners.add(Arc::clone(&listener))?;
        let snapshot = self.list()?;
        listener(&snapshot);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, InfraError> {
        self.listeners.remove(id)
    }
}

const TASK_COLUMNS: &str = "id, name, subject, due_date, creation_date, user_difficulty, details, \
     ai_difficulty, recommended_time_min, ai_reasoning, ai_study_tips, status, \
     total_time_spent_ms, total_pomodoro_cycles";

#[derive(Debug)]
struct TaskRow {
    id: String,
    name: String,
    subject: String,
    due_date: Option<String>,
    creation_date: Option<String>,
    user_difficulty: String,
    details: String,
    ai_difficulty: Option<String>,
    recommended_time_min: Option<i64>,
    ai_reasoning: Option<String>,
    ai_study_tips: Option<String>,
    status: String,
    total_time_spent_ms: i64,
    total_pomodoro_cycles: i64,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            subject: row.get(2)?,
            due_date: row.get(3)?,
            creation_date: row.get(4)?,
            user_difficulty: row.get(5)?,
            details: row.get(6)?,
            ai_difficulty: row.get(7)?,
            recommended_time_min: row.get(8)?,
            ai_reasoning: row.get(9)?,
            ai_study_tips: row.get(10)?,
            status: row.get(11)?,
            total_time_spent_ms: row.get(12)?,
            total_pomodoro_cycles: row.get(13)?,
        })
    }

    fn into_task(self) -> Result<Task, InfraError> {
        Ok(Task {
            due_date: parse_optional_timestamp(self.due_date.as_deref(), "tasks.due_date")?,
            creation_date: parse_optional_timestamp(
                self.creation_date.as_deref(),
                "tasks.creation_date",
            )?,
            user_difficulty: parse_difficulty(&self.user_difficulty)?,
            ai_difficulty: self
                .ai_difficulty
                .as_deref()
                .map(parse_difficulty)
                .transpose()?,
            recommended_time_min: self
                .recommended_time_min
                .map(|minutes| u32::try_from(minutes).unwrap_or(0)),
            status: TaskStatus::parse(&self.status).ok_or_else(|| {
                InfraError::InvalidConfig(format!("invalid tasks.status '{}'", self.status))
            })?,
            total_time_spent_ms: u64::try_from(self.total_time_spent_ms).unwrap_or(0),
            total_pomodoro_cycles: u32::try_from(self.total_pomodoro_cycles).unwrap_or(0),
            id: self.id,
            name: self.name,
            subject: self.subject,
            details: self.details,
            ai_reasoning: self.ai_reasoning,
            ai_study_tips: self.ai_study_tips,
        })
    }
}

fn parse_difficulty(raw: &str) -> Result<DifficultyLevel, InfraError> {
    DifficultyLevel::parse(raw)
        .ok_or_else(|| InfraError::InvalidConfig(format!("invalid difficulty '{raw}'")))
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {field} '{raw}': {error}")))
}

fn parse_optional_timestamp(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, InfraError> {
    raw.map(|value| parse_timestamp(value, field)).transpose()
}

fn to_sql_i64(value: u64, field: &str) -> Result<i64, InfraError> {
    i64::try_from(value)
        .map_err(|_| InfraError::InvalidConfig(format!("{field} is out of range: {value}")))
}

fn select_task(connection: &Connection, task_id: &str) -> Result<Option<Task>, InfraError> {
    let row = connection
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![task_id],
            TaskRow::from_row,
        )
        .optional()?;
    row.map(TaskRow::into_task).transpose()
}

#[derive(Debug)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
    listeners: TaskListeners,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            listeners: TaskListeners::default(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        Ok(connection)
    }

    fn notify_changed(&self) {
        match self.list() {
            Ok(tasks) => self.listeners.notify(&tasks),
            Err(error) => warn!(%error, "failed to reload tasks for change notification"),
        }
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn put(&self, task: &Task) -> Result<(), InfraError> {
        task.validate().map_err(InfraError::InvalidConfig)?;
        let connection = self.connect()?;
        connection.execute(
            &format!(
                "INSERT OR REPLACE INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                task.id,
                task.name,
                task.subject,
                task.due_date.map(|value| value.to_rfc3339()),
                task.creation_date.map(|value| value.to_rfc3339()),
                task.user_difficulty.as_str(),
                task.details,
                task.ai_difficulty.map(DifficultyLevel::as_str),
                task.recommended_time_min,
                task.ai_reasoning,
                task.ai_study_tips,
                task.status.as_str(),
                to_sql_i64(task.total_time_spent_ms, "total_time_spent_ms")?,
                task.total_pomodoro_cycles,
            ],
        )?;
        debug!(task_id = %task.id, "stored task");
        self.notify_changed();
        Ok(())
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        let task_id = normalized_id(task_id)?;
        let connection = self.connect()?;
        select_task(&connection, task_id)
    }

    fn list(&self) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks"))?;
        let rows = statement
            .query_map([], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut tasks = rows
            .into_iter()
            .map(TaskRow::into_task)
            .collect::<Result<Vec<_>, _>>()?;
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    fn update_fields(&self, task_id: &str, patch: &TaskPatch) -> Result<Task, InfraError> {
        let task_id = normalized_id(task_id)?;
        let mut connection = self.connect()?;
        let transaction = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut task = select_task(&transaction, task_id)?.ok_or_else(|| task_not_found(task_id))?;
        task.apply_patch(patch);
        transaction.execute(
            "UPDATE tasks SET
               name = ?1, subject = ?2, due_date = ?3, details = ?4, status = ?5,
               ai_difficulty = ?6, recommended_time_min = ?7, ai_reasoning = ?8, ai_study_tips = ?9
             WHERE id = ?10",
            params![
                task.name,
                task.subject,
                task.due_date.map(|value| value.to_rfc3339()),
                task.details,
                task.status.as_str(),
                task.ai_difficulty.map(DifficultyLevel::as_str),
                task.recommended_time_min,
                task.ai_reasoning,
                task.ai_study_tips,
                task_id,
            ],
        )?;
        transaction.commit()?;
        self.notify_changed();
        Ok(task)
    }

    fn increment(&self, task_id: &str, field: CounterField, amount: u64) -> Result<(), InfraError> {
        let task_id = normalized_id(task_id)?;
        let column = field.column();
        let connection = self.connect()?;
        let updated = connection.execute(
            &format!("UPDATE tasks SET {column} = {column} + ?1 WHERE id = ?2"),
            params![to_sql_i64(amount, column)?, task_id],
        )?;
        if updated == 0 {
            return Err(task_not_found(task_id));
        }
        self.notify_changed();
        Ok(())
    }

    fn delete(&self, task_id: &str) -> Result<bool, InfraError> {
        let task_id = normalized_id(task_id)?;
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "DELETE FROM pomodoro_sessions WHERE task_id = ?1",
            params![task_id],
        )?;
        let removed = transaction.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        transaction.commit()?;
        if removed == 0 {
            return Ok(false);
        }
        self.notify_changed();
        Ok(true)
    }

    fn add_session_record(&self, task_id: &str, session: &PomodoroSession) -> Result<(), InfraError> {
        let task_id = normalized_id(task_id)?;
        session.validate().map_err(InfraError::InvalidConfig)?;
        let connection = self.connect()?;
        let exists = connection
            .query_row("SELECT 1 FROM tasks WHERE id = ?1", params![task_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(task_not_found(task_id));
        }
        connection.execute(
            "INSERT INTO pomodoro_sessions
               (id, task_id, start_datetime, finish_datetime, completed_cycles, time_used_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                task_id,
                session.start_datetime.to_rfc3339(),
                session.finish_datetime.to_rfc3339(),
                session.completed_cycles,
                to_sql_i64(session.time_used_ms, "time_used_ms")?,
            ],
        )?;
        Ok(())
    }

    fn list_sessions(&self, task_id: &str) -> Result<Vec<PomodoroSession>, InfraError> {
        let task_id = normalized_id(task_id)?;
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, start_datetime, finish_datetime, completed_cycles, time_used_ms
             FROM pomodoro_sessions WHERE task_id = ?1
             ORDER BY finish_datetime ASC, id ASC",
        )?;
        let rows = statement
            .query_map(params![task_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, start, finish, cycles, time_used)| {
                Ok(PomodoroSession {
                    id,
                    start_datetime: parse_timestamp(&start, "pomodoro_sessions.start_datetime")?,
                    finish_datetime: parse_timestamp(&finish, "pomodoro_sessions.finish_datetime")?,
                    completed_cycles: u32::try_from(cycles).unwrap_or(0),
                    time_used_ms: u64::try_from(time_used).unwrap_or(0),
                })
            })
            .collect()
    }

    fn subscribe(&self, listener: TaskListener) -> Result<SubscriptionId, InfraError> {
        let id = self.listeners.add(Arc::clone(&listener))?;
        let snapshot = self.list()?;
        listener(&snapshot);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, InfraError> {
        self.listeners.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::sync::atomic::AtomicUsize;

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "studybuddy-repository-tests-{}-{}.sqlite",
                std::process::id(),
                sequence
            ));
            initialize_database(&path).expect("initialize database");
            Self { path }
        }

        fn repository(&self) -> SqliteTaskRepository {
            SqliteTaskRepository::new(&self.path)
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: "Organic chemistry".to_string(),
            subject: "Chemistry".to_string(),
            due_date: Some(fixed_time("2026-03-01T12:00:00Z")),
            creation_date: Some(fixed_time("2026-02-16T08:00:00Z")),
            user_difficulty: DifficultyLevel::Hard,
            details: "reaction mechanisms".to_string(),
            ai_difficulty: None,
            recommended_time_min: None,
            ai_reasoning: None,
            ai_study_tips: None,
            status: TaskStatus::Todo,
            total_time_spent_ms: 0,
            total_pomodoro_cycles: 0,
        }
    }

    fn sample_session(id: &str) -> PomodoroSession {
        PomodoroSession {
            id: id.to_string(),
            start_datetime: fixed_time("2026-02-16T09:00:00Z"),
            finish_datetime: fixed_time("2026-02-16T09:40:00Z"),
            completed_cycles: 1,
            time_used_ms: 1_510_000,
        }
    }

    fn assert_counters_are_additive(repository: &dyn TaskRepository) {
        repository.put(&sample_task("tsk-1")).expect("put task");
        repository
            .increment("tsk-1", CounterField::TotalTimeSpentMs, 1_500_000)
            .expect("increment time");
        repository
            .increment("tsk-1", CounterField::TotalPomodoroCycles, 1)
            .expect("increment cycles");
        repository
            .increment("tsk-1", CounterField::TotalTimeSpentMs, 10_000)
            .expect("increment partial");

        let task = repository.get("tsk-1").expect("get task").expect("task exists");
        assert_eq!(task.total_time_spent_ms, 1_510_000);
        assert_eq!(task.total_pomodoro_cycles, 1);
    }

    fn assert_patch_keeps_counters(repository: &dyn TaskRepository) {
        repository.put(&sample_task("tsk-1")).expect("put task");
        repository
            .increment("tsk-1", CounterField::TotalPomodoroCycles, 2)
            .expect("increment cycles");

        let updated = repository
            .update_fields("tsk-1", &TaskPatch::status(TaskStatus::InProgress))
            .expect("update status");
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.total_pomodoro_cycles, 2);

        let stored = repository.get("tsk-1").expect("get task").expect("task exists");
        assert_eq!(stored, updated);
    }

    fn assert_missing_task_errors(repository: &dyn TaskRepository) {
        assert!(matches!(
            repository.increment("missing", CounterField::TotalTimeSpentMs, 1),
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            repository.update_fields("missing", &TaskPatch::status(TaskStatus::Todo)),
            Err(InfraError::NotFound(_))
        ));
        assert!(matches!(
            repository.add_session_record("missing", &sample_session("ses-1")),
            Err(InfraError::NotFound(_))
        ));
        assert!(!repository.delete("missing").expect("delete missing"));
    }

    fn assert_sessions_append_and_cascade(repository: &dyn TaskRepository) {
        repository.put(&sample_task("tsk-1")).expect("put task");
        repository
            .add_session_record("tsk-1", &sample_session("ses-1"))
            .expect("add session");
        let sessions = repository.list_sessions("tsk-1").expect("list sessions");
        assert_eq!(sessions, vec![sample_session("ses-1")]);

        assert!(repository.delete("tsk-1").expect("delete task"));
        assert!(repository.get("tsk-1").expect("get task").is_none());
        assert!(repository.list_sessions("tsk-1").expect("list sessions").is_empty());
    }

    fn assert_subscribers_see_every_change(repository: &dyn TaskRepository) {
        let seen = Arc::new(Mutex::new(Vec::<usize>::new()));
        let sink = Arc::clone(&seen);
        let id = repository
            .subscribe(Arc::new(move |tasks: &[Task]| {
                sink.lock().expect("sink lock").push(tasks.len());
            }))
            .expect("subscribe");

        repository.put(&sample_task("tsk-1")).expect("put first");
        repository.put(&sample_task("tsk-2")).expect("put second");
        repository
            .increment("tsk-1", CounterField::TotalPomodoroCycles, 1)
            .expect("increment");
        assert!(repository.unsubscribe(id).expect("unsubscribe"));
        repository.delete("tsk-2").expect("delete");

        assert_eq!(*seen.lock().expect("seen lock"), vec![0, 1, 2, 2]);
    }

    #[test]
    fn in_memory_counters_are_additive() {
        assert_counters_are_additive(&InMemoryTaskRepository::default());
    }

    #[test]
    fn sqlite_counters_are_additive() {
        let database = TempDatabase::new();
        assert_counters_are_additive(&database.repository());
    }

    #[test]
    fn in_memory_patch_keeps_counters() {
        assert_patch_keeps_counters(&InMemoryTaskRepository::default());
    }

    #[test]
    fn sqlite_patch_keeps_counters() {
        let database = TempDatabase::new();
        assert_patch_keeps_counters(&database.repository());
    }

    #[test]
    fn in_memory_missing_task_errors() {
        assert_missing_task_errors(&InMemoryTaskRepository::default());
    }

    #[test]
    fn sqlite_missing_task_errors() {
        let database = TempDatabase::new();
        assert_missing_task_errors(&database.repository());
    }

    #[test]
    fn in_memory_sessions_append_and_cascade() {
        assert_sessions_append_and_cascade(&InMemoryTaskRepository::default());
    }

    #[test]
    fn sqlite_sessions_append_and_cascade() {
        let database = TempDatabase::new();
        assert_sessions_append_and_cascade(&database.repository());
    }

    #[test]
    fn in_memory_list_orders_by_creation_date() {
        let repository = InMemoryTaskRepository::default();
        let mut undated = sample_task("tsk-a");
        undated.creation_date = None;
        let mut later = sample_task("tsk-b");
        later.creation_date = Some(fixed_time("2026-02-17T08:00:00Z"));
        for task in [&undated, &later, &sample_task("tsk-c")] {
            repository.put(task).expect("put task");
        }

        let ids = repository
            .list()
            .expect("list")
            .into_iter()
            .map(|task| task.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["tsk-c", "tsk-b", "tsk-a"]);
    }

    #[test]
    fn in_memory_subscribers_see_every_change() {
        assert_subscribers_see_every_change(&InMemoryTaskRepository::default());
    }

    #[test]
    fn sqlite_subscribers_see_every_change() {
        let database = TempDatabase::new();
        assert_subscribers_see_every_change(&database.repository());
    }

    #[test]
    fn sqlite_roundtrips_every_task_field() {
        let database = TempDatabase::new();
        let repository = database.repository();
        let mut task = sample_task("tsk-full");
        task.due_date = None;
        task.ai_difficulty = Some(DifficultyLevel::Medium);
        task.recommended_time_min = Some(45);
        task.ai_reasoning = Some("familiar topic".to_string());
        task.ai_study_tips = Some("use flashcards".to_string());
        task.status = TaskStatus::Overdue;
        task.total_time_spent_ms = 42_000;
        task.total_pomodoro_cycles = 3;

        repository.put(&task).expect("put task");
        let loaded = repository.get("tsk-full").expect("get").expect("exists");
        assert_eq!(loaded, task);
    }

    #[test]
    fn put_rejects_invalid_task() {
        let repository = InMemoryTaskRepository::default();
        let mut task = sample_task("tsk-1");
        task.subject = " ".to_string();
        assert!(matches!(
            repository.put(&task),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}

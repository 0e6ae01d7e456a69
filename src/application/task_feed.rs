use crate::application::service::PomodoroService;
use crate::domain::models::Task;
use crate::domain::task_view::{project_by_status, TaskBoard};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::{SubscriptionId, TaskRepository};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Live view of the repository's task list.
///
/// Every change republishes the full list and its status board and refreshes
/// the timer's bound task. The subscription ends when the feed is dropped.
pub struct TaskFeed {
    repository: Arc<dyn TaskRepository>,
    subscription: SubscriptionId,
    tasks: watch::Receiver<Vec<Task>>,
    board: watch::Receiver<TaskBoard>,
}

impl TaskFeed {
    pub fn attach<R>(repository: Arc<R>, timer: PomodoroService) -> Result<Self, InfraError>
    where
        R: TaskRepository + 'static,
    {
        let (tasks_tx, tasks) = watch::channel(Vec::new());
        let (board_tx, board) = watch::channel(TaskBoard::new());

        let subscription = repository.subscribe(Arc::new(move |latest: &[Task]| {
            debug!(count = latest.len(), "task list changed");
            tasks_tx.send_replace(latest.to_vec());
            board_tx.send_replace(project_by_status(latest));
            if let Err(error) = timer.refresh_bound_task(latest) {
                warn!(%error, "failed to refresh bound task");
            }
        }))?;

        Ok(Self {
            repository,
            subscription,
            tasks,
            board,
        })
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.borrow().clone()
    }

    pub fn board(&self) -> TaskBoard {
        self.board.borrow().clone()
    }

    pub fn subscribe_tasks(&self) -> watch::Receiver<Vec<Task>> {
        self.tasks.clone()
    }
}

impl Drop for TaskFeed {
    fn drop(&mut self) {
        if let Err(error) = self.repository.unsubscribe(self.subscription) {
            warn!(%error, "failed to unsubscribe task feed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::reconciliation::Reconciler;
    use crate::domain::models::{DifficultyLevel, PomodoroConfig, TaskPatch, TaskStatus};
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use chrono::{DateTime, Utc};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task(id: &str, due: Option<&str>) -> Task {
        Task {
            id: id.to_string(),
            name: format!("Chapter {id}"),
            subject: "Literature".to_string(),
            due_date: due.map(fixed_time),
            creation_date: Some(fixed_time("2026-02-01T08:00:00Z")),
            user_difficulty: DifficultyLevel::Easy,
            details: String::new(),
            ai_difficulty: None,
            recommended_time_min: None,
            ai_reasoning: None,
            ai_study_tips: None,
            status: TaskStatus::Todo,
            total_time_spent_ms: 0,
            total_pomodoro_cycles: 0,
        }
    }

    fn attach(repository: &Arc<InMemoryTaskRepository>) -> (TaskFeed, PomodoroService) {
        let reconciler = Reconciler::spawn(Arc::clone(repository));
        let timer = PomodoroService::new(PomodoroConfig::default(), reconciler);
        let feed = TaskFeed::attach(Arc::clone(repository), timer.clone()).expect("attach feed");
        (feed, timer)
    }

    #[tokio::test]
    async fn board_is_recomputed_on_every_change() {
        let repository = Arc::new(InMemoryTaskRepository::default());
        repository
            .put(&task("tsk-late", Some("2026-03-10T00:00:00Z")))
            .expect("put late");
        let (feed, _timer) = attach(&repository);
        assert_eq!(feed.tasks().len(), 1);

        repository
            .put(&task("tsk-soon", Some("2026-03-01T00:00:00Z")))
            .expect("put soon");
        repository.put(&task("tsk-undated", None)).expect("put undated");

        let todo = feed
            .board()
            .remove(&TaskStatus::Todo)
            .expect("todo group")
            .into_iter()
            .map(|task| task.id)
            .collect::<Vec<_>>();
        assert_eq!(todo, vec!["tsk-soon", "tsk-late", "tsk-undated"]);

        repository
            .update_fields("tsk-late", &TaskPatch::status(TaskStatus::Completed))
            .expect("complete");
        let board = feed.board();
        assert_eq!(board[&TaskStatus::Completed].len(), 1);
        assert_eq!(board[&TaskStatus::Todo].len(), 2);
    }

    #[tokio::test]
    async fn bound_task_follows_repository() {
        let repository = Arc::new(InMemoryTaskRepository::default());
        repository.put(&task("tsk-1", None)).expect("put task");
        let (_feed, timer) = attach(&repository);

        timer.start(&task("tsk-1", None)).expect("start");
        repository
            .update_fields("tsk-1", &TaskPatch::status(TaskStatus::Completed))
            .expect("complete");

        let bound = timer.snapshot().expect("snapshot").task.expect("bound task");
        assert_eq!(bound.status, TaskStatus::Completed);
        timer.reset().expect("reset");
    }

    #[tokio::test]
    async fn dropping_feed_unsubscribes() {
        let repository = Arc::new(InMemoryTaskRepository::default());
        let (feed, _timer) = attach(&repository);
        let mut tasks = feed.subscribe_tasks();
        drop(feed);

        assert!(tasks.has_changed().is_err(), "listener must be released on drop");

        repository.put(&task("tsk-1", None)).expect("put task");
        assert!(tasks.borrow().is_empty());
    }
}

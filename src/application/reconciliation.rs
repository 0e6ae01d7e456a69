use crate::application::pomodoro_engine::EngineEvent;
use crate::domain::models::{CounterField, PomodoroSession, TaskPatch, TaskStatus};
use crate::domain::time_accountant::CommitDelta;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::TaskRepository;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// One durable effect of an engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryWrite {
    SetStatus {
        task_id: String,
        status: TaskStatus,
    },
    Increment {
        task_id: String,
        delta: CommitDelta,
    },
    RecordSession {
        task_id: String,
        session: PomodoroSession,
    },
}

impl RepositoryWrite {
    fn operation(&self) -> &'static str {
        match self {
            Self::SetStatus { .. } => "set_status",
            Self::Increment { .. } => "increment",
            Self::RecordSession { .. } => "record_session",
        }
    }

    fn task_id(&self) -> &str {
        match self {
            Self::SetStatus { task_id, .. }
            | Self::Increment { task_id, .. }
            | Self::RecordSession { task_id, .. } => task_id,
        }
    }
}

/// Maps an engine event to the repository writes it requires, in order.
pub fn plan(event: &EngineEvent) -> Vec<RepositoryWrite> {
    match event {
        EngineEvent::SessionStarted { task_id } => vec![RepositoryWrite::SetStatus {
            task_id: task_id.clone(),
            status: TaskStatus::InProgress,
        }],
        EngineEvent::CycleCompleted { task_id, delta, .. } if !delta.is_zero() => {
            vec![RepositoryWrite::Increment {
                task_id: task_id.clone(),
                delta: *delta,
            }]
        }
        EngineEvent::SessionFinished {
            task_id,
            record,
            trailing,
            restore_status,
        } => {
            let mut writes = vec![RepositoryWrite::RecordSession {
                task_id: task_id.clone(),
                session: record.clone(),
            }];
            if !trailing.is_zero() {
                writes.push(RepositoryWrite::Increment {
                    task_id: task_id.clone(),
                    delta: *trailing,
                });
            }
            if *restore_status {
                writes.push(RepositoryWrite::SetStatus {
                    task_id: task_id.clone(),
                    status: TaskStatus::Todo,
                });
            }
            writes
        }
        EngineEvent::CycleCompleted { .. } | EngineEvent::PhaseChanged { .. } => Vec::new(),
    }
}

pub fn apply_write(
    repository: &dyn TaskRepository,
    write: &RepositoryWrite,
) -> Result<(), InfraError> {
    match write {
        RepositoryWrite::SetStatus { task_id, status } => {
            repository.update_fields(task_id, &TaskPatch::status(*status))?;
        }
        RepositoryWrite::Increment { task_id, delta } => {
            if delta.time_ms > 0 {
                repository.increment(task_id, CounterField::TotalTimeSpentMs, delta.time_ms)?;
            }
            if delta.cycles > 0 {
                repository.increment(
                    task_id,
                    CounterField::TotalPomodoroCycles,
                    u64::from(delta.cycles),
                )?;
            }
        }
        RepositoryWrite::RecordSession { task_id, session } => {
            repository.add_session_record(task_id, session)?;
        }
    }
    Ok(())
}

#[derive(Debug)]
enum WorkerMessage {
    Write(RepositoryWrite),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget bridge from engine events to the task repository.
///
/// Writes are applied in submission order by a single background worker.
/// Failures are logged and dropped; the timer never waits on the store.
#[derive(Debug, Clone)]
pub struct Reconciler {
    sender: mpsc::UnboundedSender<WorkerMessage>,
}

impl Reconciler {
    pub fn spawn<R>(repository: Arc<R>) -> Self
    where
        R: TaskRepository + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<WorkerMessage>();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    WorkerMessage::Write(write) => {
                        // Store calls block; keep them off the threads that drive ticks.
                        let store = Arc::clone(&repository);
                        let applied = tokio::task::spawn_blocking(move || {
                            let result = apply_write(store.as_ref(), &write);
                            (write, result)
                        })
                        .await;
                        match applied {
                            Ok((write, Ok(()))) => debug!(
                                task_id = write.task_id(),
                                operation = write.operation(),
                                "repository write applied"
                            ),
                            Ok((write, Err(error))) => warn!(
                                task_id = write.task_id(),
                                operation = write.operation(),
                                %error,
                                "repository write failed"
                            ),
                            Err(error) => warn!(%error, "repository write task aborted"),
                        }
                    }
                    WorkerMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("reconciliation worker stopped");
        });
        Self { sender }
    }

    pub fn reconcile(&self, event: &EngineEvent) {
        for write in plan(event) {
            self.submit(write);
        }
    }

    pub fn submit(&self, write: RepositoryWrite) {
        let task_id = write.task_id().to_string();
        if self.sender.send(WorkerMessage::Write(write)).is_err() {
            warn!(%task_id, "reconciliation worker is gone; dropping write");
        }
    }

    /// Resolves once every write submitted before this call has been attempted.
    pub async fn flush(&self) -> Result<(), InfraError> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Flush(done))
            .map_err(|_| InfraError::State("reconciliation worker is gone".to_string()))?;
        wait.await
            .map_err(|_| InfraError::State("reconciliation worker is gone".to_string()))
    }
}

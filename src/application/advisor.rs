use crate::domain::models::{ContentType, Task, TaskPatch};
use crate::infrastructure::ai_gateway::AiAdvisoryGateway;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::TaskRepository;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub const TIPS_LOADING_MESSAGE: &str = "Getting AI study tips...";

/// AI-backed study help for tasks.
///
/// Results land in one observable content slot; analyses and tips are also
/// written back to the task.
pub struct StudyAdvisor<R> {
    repository: Arc<R>,
    gateway: Arc<dyn AiAdvisoryGateway>,
    content: watch::Sender<Option<String>>,
}

impl<R> StudyAdvisor<R>
where
    R: TaskRepository,
{
    pub fn new(repository: Arc<R>, gateway: Arc<dyn AiAdvisoryGateway>) -> Self {
        let (content, _) = watch::channel(None);
        Self {
            repository,
            gateway,
            content,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.content.subscribe()
    }

    pub fn content_result(&self) -> Option<String> {
        self.content.borrow().clone()
    }

    pub fn clear_content_result(&self) {
        self.content.send_replace(None);
    }

    /// Runs the difficulty analysis and merges it into the stored task by id.
    ///
    /// Failures leave the task untouched.
    pub async fn analyze_and_store(&self, task: &Task) -> Result<Option<Task>, InfraError> {
        let analysis = match self.gateway.analyze_difficulty(task).await {
            Ok(analysis) => analysis,
            Err(error) => {
                warn!(task_id = %task.id, %error, "difficulty analysis failed");
                return Ok(None);
            }
        };

        let updated = self
            .repository
            .update_fields(&task.id, &TaskPatch::ai_analysis(&analysis))?;
        info!(
            task_id = %task.id,
            difficulty = analysis.difficulty.as_str(),
            recommended_time_min = analysis.recommended_time_min,
            "stored difficulty analysis"
        );
        Ok(Some(updated))
    }

    pub async fn study_tips(&self, task: &Task) -> String {
        self.content
            .send_replace(Some(TIPS_LOADING_MESSAGE.to_string()));

        let message = match self.gateway.generate_study_tips(task).await {
            Ok(tips) => {
                if let Err(error) = self
                    .repository
                    .update_fields(&task.id, &TaskPatch::study_tips(tips.clone()))
                {
                    warn!(task_id = %task.id, %error, "failed to store study tips");
                }
                tips
            }
            Err(error) => {
                warn!(task_id = %task.id, %error, "study tips request failed");
                format!("Error getting AI study tips: {error}. Try again.")
            }
        };
        self.content.send_replace(Some(message.clone()));
        message
    }

    pub async fn generate_content(&self, task: &Task, content_type: &ContentType) -> String {
        let label = content_type.label().to_string();
        self.content
            .send_replace(Some(format!("Generating {label}...")));

        let message = match self.gateway.generate_content(task, content_type).await {
            Ok(content) => content,
            Err(error) => {
                warn!(task_id = %task.id, content_type = %label, %error, "content request failed");
                format!("Error generating {label}: {error}. Try again.")
            }
        };
        self.content.send_replace(Some(message.clone()));
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AiAnalysisResult, DifficultyLevel, TaskStatus};
    use crate::infrastructure::task_repository::InMemoryTaskRepository;
    use async_trait::async_trait;

    struct FakeGateway {
        fail: bool,
    }

    #[async_trait]
    impl AiAdvisoryGateway for FakeGateway {
        async fn analyze_difficulty(&self, _task: &Task) -> Result<AiAnalysisResult, InfraError> {
            if self.fail {
                return Err(InfraError::AiGateway("quota exceeded".to_string()));
            }
            Ok(AiAnalysisResult {
                difficulty: DifficultyLevel::Hard,
                recommended_time_min: 120,
                reasoning: "dense material".to_string(),
            })
        }

        async fn generate_study_tips(&self, task: &Task) -> Result<String, InfraError> {
            if self.fail {
                return Err(InfraError::AiGateway("quota exceeded".to_string()));
            }
            Ok(format!("Review {} daily.", task.name))
        }

        async fn generate_content(
            &self,
            task: &Task,
            content_type: &ContentType,
        ) -> Result<String, InfraError> {
            if self.fail {
                return Err(InfraError::AiGateway("quota exceeded".to_string()));
            }
            Ok(format!("{} for {}", content_type.label(), task.name))
        }
    }

    fn task() -> Task {
        Task {
            id: "tsk-1".to_string(),
            name: "Genetics".to_string(),
            subject: "Biology".to_string(),
            due_date: None,
            creation_date: None,
            user_difficulty: DifficultyLevel::Medium,
            details: String::new(),
            ai_difficulty: None,
            recommended_time_min: None,
            ai_reasoning: None,
            ai_study_tips: None,
            status: TaskStatus::InProgress,
            total_time_spent_ms: 4_000,
            total_pomodoro_cycles: 0,
        }
    }

    fn advisor(fail: bool) -> (StudyAdvisor<InMemoryTaskRepository>, Arc<InMemoryTaskRepository>) {
        let repository = Arc::new(InMemoryTaskRepository::default());
        repository.put(&task()).expect("put task");
        (
            StudyAdvisor::new(Arc::clone(&repository), Arc::new(FakeGateway { fail })),
            repository,
        )
    }

    #[tokio::test]
    async fn analysis_is_merged_without_touching_status_or_counters() {
        let (advisor, repository) = advisor(false);
        let updated = advisor
            .analyze_and_store(&task())
            .await
            .expect("analyze")
            .expect("analysis stored");

        assert_eq!(updated.ai_difficulty, Some(DifficultyLevel::Hard));
        assert_eq!(updated.recommended_time_min, Some(120));
        assert_eq!(updated.ai_reasoning.as_deref(), Some("dense material"));
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.total_time_spent_ms, 4_000);
        assert_eq!(repository.get("tsk-1").expect("get"), Some(updated));
    }

    #[tokio::test]
    async fn failed_analysis_leaves_task_untouched() {
        let (advisor, repository) = advisor(true);
        assert!(advisor.analyze_and_store(&task()).await.expect("analyze").is_none());
        assert_eq!(repository.get("tsk-1").expect("get"), Some(task()));
    }

    #[tokio::test]
    async fn tips_are_published_and_persisted() {
        let (advisor, repository) = advisor(false);
        let mut content = advisor.subscribe();

        let tips = advisor.study_tips(&task()).await;
        assert_eq!(tips, "Review Genetics daily.");
        assert_eq!(content.borrow_and_update().as_deref(), Some("Review Genetics daily."));
        assert_eq!(
            repository
                .get("tsk-1")
                .expect("get")
                .expect("task")
                .ai_study_tips
                .as_deref(),
            Some("Review Genetics daily.")
        );

        advisor.clear_content_result();
        assert_eq!(advisor.content_result(), None);
    }

    #[tokio::test]
    async fn gateway_errors_become_user_visible_text() {
        let (advisor, repository) = advisor(true);

        let tips = advisor.study_tips(&task()).await;
        assert!(tips.starts_with("Error getting AI study tips:"));
        assert!(tips.ends_with("Try again."));
        assert_eq!(advisor.content_result(), Some(tips));
        assert!(repository.get("tsk-1").expect("get").expect("task").ai_study_tips.is_none());

        let content = advisor
            .generate_content(&task(), &ContentType::Flashcards)
            .await;
        assert!(content.starts_with("Error generating Flashcards:"));
    }

    #[tokio::test]
    async fn content_replaces_the_slot() {
        let (advisor, _) = advisor(false);
        let summary = advisor.generate_content(&task(), &ContentType::Summary).await;
        assert_eq!(summary, "Summary for Genetics");
        assert_eq!(advisor.content_result(), Some(summary));
    }
}

use crate::domain::models::{Task, TaskStatus};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub type TaskBoard = BTreeMap<TaskStatus, Vec<Task>>;

/// Groups tasks by status, each group ordered by due date ascending.
///
/// Undated tasks sort after every dated task. Ties break on creation date
/// (missing last), then on id, so the order is total and stable.
pub fn project_by_status(tasks: &[Task]) -> TaskBoard {
    let mut board = TaskBoard::new();
    for task in tasks {
        board.entry(task.status).or_default().push(task.clone());
    }
    for group in board.values_mut() {
        group.sort_by(compare_for_board);
    }
    board
}

fn compare_for_board(left: &Task, right: &Task) -> Ordering {
    compare_missing_last(&left.due_date, &right.due_date)
        .then_with(|| compare_missing_last(&left.creation_date, &right.creation_date))
        .then_with(|| left.id.cmp(&right.id))
}

fn compare_missing_last<T: Ord>(left: &Option<T>, right: &Option<T>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DifficultyLevel;
    use chrono::{DateTime, Utc};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task(id: &str, status: TaskStatus, due: Option<&str>) -> Task {
        Task {
            id: id.to_string(),
            name: format!("task {id}"),
            subject: "History".to_string(),
            due_date: due.map(fixed_time),
            creation_date: Some(fixed_time("2026-02-01T00:00:00Z")),
            user_difficulty: DifficultyLevel::Easy,
            details: String::new(),
            ai_difficulty: None,
            recommended_time_min: None,
            ai_reasoning: None,
            ai_study_tips: None,
            status,
            total_time_spent_ms: 0,
            total_pomodoro_cycles: 0,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    #[test]
    fn groups_by_status_and_orders_by_due_date() {
        let tasks = vec![
            task("late", TaskStatus::Todo, Some("2026-03-10T00:00:00Z")),
            task("done", TaskStatus::Completed, None),
            task("soon", TaskStatus::Todo, Some("2026-03-01T00:00:00Z")),
            task("undated", TaskStatus::Todo, None),
            task("active", TaskStatus::InProgress, Some("2026-03-05T00:00:00Z")),
        ];

        let board = project_by_status(&tasks);

        assert_eq!(board.len(), 3);
        assert_eq!(ids(&board[&TaskStatus::Todo]), vec!["soon", "late", "undated"]);
        assert_eq!(ids(&board[&TaskStatus::InProgress]), vec!["active"]);
        assert_eq!(ids(&board[&TaskStatus::Completed]), vec!["done"]);
        assert!(!board.contains_key(&TaskStatus::Overdue));
    }

    #[test]
    fn equal_due_dates_fall_back_to_creation_then_id() {
        let mut newer = task("b", TaskStatus::Todo, Some("2026-03-01T00:00:00Z"));
        newer.creation_date = Some(fixed_time("2026-02-10T00:00:00Z"));
        let older = task("c", TaskStatus::Todo, Some("2026-03-01T00:00:00Z"));
        let same_as_older = task("a", TaskStatus::Todo, Some("2026-03-01T00:00:00Z"));

        let board = project_by_status(&[newer, older, same_as_older]);
        assert_eq!(ids(&board[&TaskStatus::Todo]), vec!["a", "c", "b"]);
    }

    #[test]
    fn empty_list_projects_to_empty_board() {
        assert!(project_by_status(&[]).is_empty());
    }
}

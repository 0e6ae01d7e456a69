use crate::application::commands::{
    clear_ai_content_impl, create_task_impl, delete_task_impl, generate_content_impl,
    get_ai_content_impl, get_ai_tips_impl, get_pomodoro_state_impl, list_sessions_impl,
    list_tasks_impl, pause_pomodoro_impl, reset_pomodoro_impl, resume_pomodoro_impl,
    sorted_tasks_impl, start_pomodoro_impl, update_task_status_impl, AppState,
};
use crate::infrastructure::error::InfraError;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const HELP: &str = "commands: tasks | board | add <name> | <subject> [| due] [| difficulty] [| details] | \
status <task_id> <status> | done <task_id> | delete <task_id> | start <task_id> | pause | resume | \
reset | state | sessions <task_id> | tips <task_id> | content <task_id> <type> | ai | clear | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Help,
    Tasks,
    Board,
    Add {
        name: String,
        subject: String,
        due_date: Option<String>,
        difficulty: Option<String>,
        details: Option<String>,
    },
    Status {
        task_id: String,
        status: String,
    },
    Delete {
        task_id: String,
    },
    Start {
        task_id: String,
    },
    Pause,
    Resume,
    Reset,
    State,
    Sessions {
        task_id: String,
    },
    Tips {
        task_id: String,
    },
    Content {
        task_id: String,
        content_type: String,
    },
    Ai,
    Clear,
    Quit,
}

impl ShellCommand {
    fn parse(line: &str) -> Result<Option<Self>, InfraError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));

        let command = match verb.to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "tasks" => Self::Tasks,
            "board" => Self::Board,
            "add" => {
                let mut fields = rest.split('|').map(str::trim);
                let name = fields.next().unwrap_or_default().to_string();
                let subject = fields.next().unwrap_or_default().to_string();
                let mut optional = || {
                    fields
                        .next()
                        .filter(|value| !value.is_empty())
                        .map(ToOwned::to_owned)
                };
                Self::Add {
                    name,
                    subject,
                    due_date: optional(),
                    difficulty: optional(),
                    details: optional(),
                }
            }
            "status" => {
                let (task_id, status) = two_args(rest, "status <task_id> <status>")?;
                Self::Status { task_id, status }
            }
            "done" => Self::Status {
                task_id: one_arg(rest, "done <task_id>")?,
                status: "completed".to_string(),
            },
            "delete" => Self::Delete {
                task_id: one_arg(rest, "delete <task_id>")?,
            },
            "start" => Self::Start {
                task_id: one_arg(rest, "start <task_id>")?,
            },
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "reset" => Self::Reset,
            "state" => Self::State,
            "sessions" => Self::Sessions {
                task_id: one_arg(rest, "sessions <task_id>")?,
            },
            "tips" => Self::Tips {
                task_id: one_arg(rest, "tips <task_id>")?,
            },
            "content" => {
                let (task_id, content_type) = two_args(rest, "content <task_id> <type>")?;
                Self::Content {
                    task_id,
                    content_type,
                }
            }
            "ai" => Self::Ai,
            "clear" => Self::Clear,
            "quit" | "exit" => Self::Quit,
            other => {
                return Err(InfraError::InvalidConfig(format!(
                    "unknown command: {other}"
                )));
            }
        };
        Ok(Some(command))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Tasks => "list_tasks",
            Self::Board => "sorted_tasks",
            Self::Add { .. } => "create_task",
            Self::Status { .. } => "update_task_status",
            Self::Delete { .. } => "delete_task",
            Self::Start { .. } => "start_pomodoro",
            Self::Pause => "pause_pomodoro",
            Self::Resume => "resume_pomodoro",
            Self::Reset => "reset_pomodoro",
            Self::State => "get_pomodoro_state",
            Self::Sessions { .. } => "list_sessions",
            Self::Tips { .. } => "get_ai_tips",
            Self::Content { .. } => "generate_content",
            Self::Ai => "get_ai_content",
            Self::Clear => "clear_ai_content",
            Self::Quit => "quit",
        }
    }
}

fn one_arg(rest: &str, usage: &str) -> Result<String, InfraError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(value), None) => Ok(value.to_string()),
        _ => Err(InfraError::InvalidConfig(format!("usage: {usage}"))),
    }
}

fn two_args(rest: &str, usage: &str) -> Result<(String, String), InfraError> {
    match rest.split_once(char::is_whitespace) {
        Some((first, second)) if !second.trim().is_empty() => {
            Ok((first.to_string(), second.trim().to_string()))
        }
        _ => Err(InfraError::InvalidConfig(format!("usage: {usage}"))),
    }
}

async fn dispatch(state: &AppState, command: ShellCommand) -> Result<Value, InfraError> {
    let value = match command {
        ShellCommand::Help => json!(HELP),
        ShellCommand::Tasks => serde_json::to_value(list_tasks_impl(state)?)?,
        ShellCommand::Board => serde_json::to_value(sorted_tasks_impl(state)?)?,
        ShellCommand::Add {
            name,
            subject,
            due_date,
            difficulty,
            details,
        } => serde_json::to_value(create_task_impl(
            state, name, subject, due_date, difficulty, details,
        )?)?,
        ShellCommand::Status { task_id, status } => {
            serde_json::to_value(update_task_status_impl(state, task_id, status)?)?
        }
        ShellCommand::Delete { task_id } => json!({
            "deleted": delete_task_impl(state, task_id).await?
        }),
        ShellCommand::Start { task_id } => {
            serde_json::to_value(start_pomodoro_impl(state, task_id)?)?
        }
        ShellCommand::Pause => serde_json::to_value(pause_pomodoro_impl(state)?)?,
        ShellCommand::Resume => serde_json::to_value(resume_pomodoro_impl(state)?)?,
        ShellCommand::Reset => serde_json::to_value(reset_pomodoro_impl(state)?)?,
        ShellCommand::State => serde_json::to_value(get_pomodoro_state_impl(state)?)?,
        ShellCommand::Sessions { task_id } => {
            serde_json::to_value(list_sessions_impl(state, task_id)?)?
        }
        ShellCommand::Tips { task_id } => {
            serde_json::to_value(get_ai_tips_impl(state, task_id).await?)?
        }
        ShellCommand::Content {
            task_id,
            content_type,
        } => serde_json::to_value(generate_content_impl(state, task_id, content_type).await?)?,
        ShellCommand::Ai => json!({ "content": get_ai_content_impl(state) }),
        ShellCommand::Clear => {
            clear_ai_content_impl(state);
            json!({ "content": null })
        }
        ShellCommand::Quit => Value::Null,
    };
    Ok(value)
}

/// Reads one command per line and answers each with one JSON line.
pub async fn run_shell<R, W>(state: &AppState, reader: R, mut writer: W) -> Result<(), InfraError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match ShellCommand::parse(&line) {
            Ok(None) => continue,
            Ok(Some(ShellCommand::Quit)) => break,
            Ok(Some(command)) => {
                let name = command.name();
                match dispatch(state, command).await {
                    Ok(data) => json!({ "ok": true, "data": data }),
                    Err(error) => json!({ "ok": false, "error": state.command_error(name, &error) }),
                }
            }
            Err(error) => json!({ "ok": false, "error": error.to_string() }),
        };
        writer.write_all(format!("{reply}\n").as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

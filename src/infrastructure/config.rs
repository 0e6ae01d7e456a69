use crate::domain::models::{
    minutes_to_ms, PomodoroConfig, DEFAULT_CYCLES_BEFORE_LONG_BREAK, DEFAULT_LONG_BREAK_MINUTES,
    DEFAULT_SHORT_BREAK_MINUTES, DEFAULT_TICK_INTERVAL_MS, DEFAULT_WORK_MINUTES,
};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const POMODORO_JSON: &str = "pomodoro.json";
pub const DEFAULT_AI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub pomodoro: serde_json::Value,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "StudyBuddy",
                "aiModel": DEFAULT_AI_MODEL
            }),
        ),
        (
            POMODORO_JSON,
            serde_json::json!({
                "schema": 1,
                "workMinutes": DEFAULT_WORK_MINUTES,
                "shortBreakMinutes": DEFAULT_SHORT_BREAK_MINUTES,
                "longBreakMinutes": DEFAULT_LONG_BREAK_MINUTES,
                "cyclesBeforeLongBreak": DEFAULT_CYCLES_BEFORE_LONG_BREAK,
                "tickIntervalMs": DEFAULT_TICK_INTERVAL_MS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        pomodoro: read_config(&config_dir.join(POMODORO_JSON))?,
    })
}

fn read_positive_u64(
    value: &serde_json::Value,
    key: &str,
    default: u64,
    path: &Path,
) -> Result<u64, InfraError> {
    match value.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(raw) => raw
            .as_u64()
            .filter(|parsed| *parsed > 0)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!(
                    "{key} must be a positive integer in {}",
                    path.display()
                ))
            }),
    }
}

pub fn read_pomodoro_config(config_dir: &Path) -> Result<PomodoroConfig, InfraError> {
    let path = config_dir.join(POMODORO_JSON);
    let pomodoro = read_config(&path)?;

    let cycles = read_positive_u64(
        &pomodoro,
        "cyclesBeforeLongBreak",
        u64::from(DEFAULT_CYCLES_BEFORE_LONG_BREAK),
        &path,
    )?;
    let config = PomodoroConfig {
        work_duration_ms: minutes_to_ms(read_positive_u64(
            &pomodoro,
            "workMinutes",
            DEFAULT_WORK_MINUTES,
            &path,
        )?),
        short_break_ms: minutes_to_ms(read_positive_u64(
            &pomodoro,
            "shortBreakMinutes",
            DEFAULT_SHORT_BREAK_MINUTES,
            &path,
        )?),
        long_break_ms: minutes_to_ms(read_positive_u64(
            &pomodoro,
            "longBreakMinutes",
            DEFAULT_LONG_BREAK_MINUTES,
            &path,
        )?),
        cycles_before_long_break: u32::try_from(cycles).map_err(|_| {
            InfraError::InvalidConfig(format!(
                "cyclesBeforeLongBreak is out of range in {}",
                path.display()
            ))
        })?,
        tick_interval_ms: read_positive_u64(
            &pomodoro,
            "tickIntervalMs",
            DEFAULT_TICK_INTERVAL_MS,
            &path,
        )?,
    };
    config.validate().map_err(InfraError::InvalidConfig)?;
    Ok(config)
}

pub fn read_ai_model(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let model = app
        .get("aiModel")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_AI_MODEL);
    Ok(model.to_string())
}

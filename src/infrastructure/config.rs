use crate::domain::clock::parse_hhmm;
use crate::domain::schedule::{CursorPolicy, ScheduleSettings};
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SCHEDULE_JSON: &str = "schedule.json";
const DEFAULT_APP_NAME: &str = "TeamCal";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub schedule: serde_json::Value,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": DEFAULT_APP_NAME
            }),
        ),
        (
            SCHEDULE_JSON,
            serde_json::json!({
                "schema": 1,
                "workHours": {
                    "start": "10:00",
                    "end": "19:00"
                },
                "minGapMinutes": 30,
                "cursorPolicy": "clamped"
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
        schedule: read_config(&config_dir.join(SCHEDULE_JSON))?,
    })
}

pub fn read_app_name(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let name = app
        .get("appName")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_APP_NAME);
    Ok(name.to_string())
}

/// Reads `schedule.json`; absent keys fall back to the built-in defaults,
/// present but malformed keys are rejected.
pub fn read_schedule_settings(config_dir: &Path) -> Result<ScheduleSettings, InfraError> {
    let path = config_dir.join(SCHEDULE_JSON);
    let mut settings = ScheduleSettings::default();
    if !path.exists() {
        return Ok(settings);
    }
    let parsed = read_config(&path)?;

    if let Some(work_hours) = parsed.get("workHours") {
        if let Some(start) = work_hours.get("start") {
            settings.work_start = time_value(start, "workHours.start")?;
        }
        if let Some(end) = work_hours.get("end") {
            settings.work_end = time_value(end, "workHours.end")?;
        }
    }

    if let Some(value) = parsed.get("minGapMinutes") {
        let minutes = value.as_u64().ok_or_else(|| {
            InfraError::InvalidConfig("minGapMinutes must be a non-negative integer".to_string())
        })?;
        settings.min_gap_minutes = i64::try_from(minutes).map_err(|_| {
            InfraError::InvalidConfig(format!("minGapMinutes {minutes} is out of range"))
        })?;
    }

    if let Some(value) = parsed.get("cursorPolicy") {
        settings.cursor_policy = value
            .as_str()
            .and_then(CursorPolicy::parse)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!(
                    "cursorPolicy must be \"clamped\" or \"literal\", got {value}"
                ))
            })?;
    }

    settings.validate()?;
    Ok(settings)
}

pub fn save_work_hours(config_dir: &Path, start: &str, end: &str) -> Result<(), InfraError> {
    let start_time = parse_hhmm(start)
        .ok_or_else(|| InfraError::InvalidConfig("workHours.start must be HH:MM".to_string()))?;
    let end_time = parse_hhmm(end)
        .ok_or_else(|| InfraError::InvalidConfig("workHours.end must be HH:MM".to_string()))?;
    ScheduleSettings {
        work_start: start_time,
        work_end: end_time,
        ..ScheduleSettings::default()
    }
    .validate()?;

    let path = config_dir.join(SCHEDULE_JSON);
    let mut schedule = read_config(&path)?;
    let object = schedule.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    object.insert(
        "workHours".to_string(),
        serde_json::json!({
            "start": start.trim(),
            "end": end.trim()
        }),
    );

    let formatted = serde_json::to_string_pretty(&schedule)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn time_value(value: &serde_json::Value, field_name: &str) -> Result<chrono::NaiveTime, InfraError> {
    value
        .as_str()
        .and_then(parse_hhmm)
        .ok_or_else(|| InfraError::InvalidConfig(format!("{field_name} must be HH:MM")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schedule::ScheduleError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "teamcal-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }

        fn write(&self, name: &str, value: serde_json::Value) {
            fs::write(self.path.join(name), value.to_string()).expect("write config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_written_and_loaded() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");

        let bundle = load_configs(&dir.path).expect("load configs");
        assert_eq!(bundle.schedule["minGapMinutes"], 30);
        assert_eq!(read_app_name(&dir.path).expect("app name"), "TeamCal");
        assert_eq!(
            read_schedule_settings(&dir.path).expect("settings"),
            ScheduleSettings::default()
        );
    }

    #[test]
    fn missing_schedule_file_means_defaults() {
        let dir = TempConfigDir::new();
        assert_eq!(
            read_schedule_settings(&dir.path).expect("settings"),
            ScheduleSettings::default()
        );
    }

    #[test]
    fn schedule_overrides_are_applied() {
        let dir = TempConfigDir::new();
        dir.write(
            SCHEDULE_JSON,
            serde_json::json!({
                "schema": 1,
                "workHours": { "start": "09:30" },
                "minGapMinutes": 15,
                "cursorPolicy": "literal"
            }),
        );

        let settings = read_schedule_settings(&dir.path).expect("settings");
        assert_eq!(settings.work_start, parse_hhmm("09:30").expect("time"));
        assert_eq!(settings.work_end, parse_hhmm("19:00").expect("time"));
        assert_eq!(settings.min_gap_minutes, 15);
        assert_eq!(settings.cursor_policy, CursorPolicy::Literal);
    }

    #[test]
    fn inverted_window_is_rejected() {
        let dir = TempConfigDir::new();
        dir.write(
            SCHEDULE_JSON,
            serde_json::json!({
                "schema": 1,
                "workHours": { "start": "19:00", "end": "10:00" }
            }),
        );

        match read_schedule_settings(&dir.path) {
            Err(InfraError::Schedule(ScheduleError::InvalidWindow { .. })) => {}
            other => panic!("expected invalid window, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_schema_and_bad_values_are_rejected() {
        let dir = TempConfigDir::new();
        dir.write(SCHEDULE_JSON, serde_json::json!({ "schema": 2 }));
        assert!(matches!(
            read_schedule_settings(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write(
            SCHEDULE_JSON,
            serde_json::json!({ "schema": 1, "cursorPolicy": "sideways" }),
        );
        assert!(matches!(
            read_schedule_settings(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn save_work_hours_updates_file() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        save_work_hours(&dir.path, "08:00", "16:30").expect("save");

        let settings = read_schedule_settings(&dir.path).expect("settings");
        assert_eq!(settings.work_start, parse_hhmm("08:00").expect("time"));
        assert_eq!(settings.work_end, parse_hhmm("16:30").expect("time"));
        assert!(save_work_hours(&dir.path, "17:00", "09:00").is_err());
    }
}

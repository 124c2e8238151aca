//! Built-in handles registered by the `jobvisor-worker` binary.
//!
//! Parameters are looked up by name across all groups of the configuration,
//! first match wins.

use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use jobvisor_core::{Configuration, ParamValue};

use crate::error::{HandleError, SchedulerError};
use crate::worker::{FnHandle, HandleRegistry, ProgressSink, ProgressUpdate, ResultStore};

/// Registry holding `ramp`, `store`, `sleep`, `fail` and `echo`.
pub fn builtin_registry() -> HandleRegistry {
    let mut registry = HandleRegistry::new();
    if let Err(e) = register_builtins(&mut registry) {
        // names below are distinct literals
        unreachable!("built-in handle registration failed: {e}");
    }
    registry
}

/// Add the built-in handles to an existing registry.
pub fn register_builtins(registry: &mut HandleRegistry) -> Result<(), SchedulerError> {
    registry.register(
        FnHandle::new("ramp", ramp)
            .with_description("report `steps` progress updates, `delay_ms` apart, with a step metric"),
    )?;
    registry.register(
        FnHandle::new("store", store)
            .with_description("write every parameter into the result store"),
    )?;
    registry.register(
        FnHandle::new("sleep", sleep)
            .with_description("sleep for `duration_ms`, reporting progress along the way"),
    )?;
    registry.register(
        FnHandle::new("fail", fail).with_description("fail with `message` after optional `progress`"),
    )?;
    registry.register(
        FnHandle::new("echo", echo).with_description("store the configuration name and settings"),
    )?;
    Ok(())
}

fn ramp(config: &Configuration, progress: &mut ProgressSink, _: &mut ResultStore) -> Result<(), HandleError> {
    let steps = int_param(config, "steps", 10)?;
    if steps < 1 {
        return Err(HandleError::InvalidParameter {
            name: "steps".into(),
            reason: format!("must be at least 1, got {steps}"),
        });
    }
    let delay = duration_param(config, "delay_ms", 50)?;

    for step in 1..=steps {
        thread::sleep(delay);
        progress.send(
            ProgressUpdate::new()
                .with_progress((step * 100 / steps) as u8)
                .metric("step", step)
                .metric("fraction", step as f64 / steps as f64),
        )?;
    }
    Ok(())
}

fn store(config: &Configuration, progress: &mut ProgressSink, store: &mut ResultStore) -> Result<(), HandleError> {
    for (group, param, value) in config.parameters() {
        debug!(group, param, "storing parameter");
        store.insert(param, value.to_json())?;
    }
    progress.progress(100)
}

fn sleep(config: &Configuration, progress: &mut ProgressSink, store: &mut ResultStore) -> Result<(), HandleError> {
    const TICKS: u32 = 10;
    let duration = duration_param(config, "duration_ms", 1000)?;
    let tick = duration / TICKS;
    for i in 1..=TICKS {
        thread::sleep(tick);
        progress.progress((i * 100 / TICKS) as u8)?;
    }
    store.insert("slept_ms", duration.as_millis() as u64)?;
    Ok(())
}

fn fail(config: &Configuration, progress: &mut ProgressSink, _: &mut ResultStore) -> Result<(), HandleError> {
    if let Some(before) = config.lookup("progress").and_then(ParamValue::as_i64) {
        progress.progress(before.clamp(0, 100) as u8)?;
    }
    let message = config
        .lookup("message")
        .and_then(ParamValue::as_str)
        .unwrap_or("handle failed on purpose");
    Err(HandleError::Failed(message.to_string()))
}

fn echo(config: &Configuration, progress: &mut ProgressSink, store: &mut ResultStore) -> Result<(), HandleError> {
    let settings = config
        .to_json()
        .get(config.name())
        .cloned()
        .unwrap_or(Value::Null);
    store.insert("name", config.name())?;
    store.insert("settings", settings)?;
    progress.send(ProgressUpdate::new().with_progress(100).metric("groups", json!(config.settings().len())))
}

fn int_param(config: &Configuration, name: &str, default: i64) -> Result<i64, HandleError> {
    match config.lookup(name) {
        None => Ok(default),
        Some(value) => value.as_i64().ok_or_else(|| HandleError::InvalidParameter {
            name: name.to_string(),
            reason: format!("expected an integer, got {value}"),
        }),
    }
}

fn duration_param(config: &Configuration, name: &str, default_ms: u64) -> Result<Duration, HandleError> {
    let ms = int_param(config, name, default_ms as i64)?;
    u64::try_from(ms)
        .map(Duration::from_millis)
        .map_err(|_| HandleError::InvalidParameter {
            name: name.to_string(),
            reason: format!("must not be negative, got {ms}"),
        })
}

#[cfg(test)]
mod tests {
    use jobvisor_core::{Group, Settings};
    use serde_json::json;

    use super::*;
    use crate::worker::protocol::Frame;
    use crate::worker::sink::tests::SharedBuf;

    fn config(params: &[(&str, ParamValue)]) -> Configuration {
        let group: Group = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        let mut settings = Settings::new();
        settings.insert("params".into(), group);
        Configuration::new("test_run", settings).unwrap()
    }

    fn run(handle: &str, config: &Configuration) -> (Result<(), HandleError>, Vec<String>, ResultStore) {
        let registry = builtin_registry();
        let dir = tempfile::tempdir().unwrap();
        let buf = SharedBuf::default();
        let mut sink = ProgressSink::new(buf.clone());
        let mut store = ResultStore::create(dir.path().join("result.json")).unwrap();
        let outcome = registry.get(handle).unwrap().run(config, &mut sink, &mut store);
        (outcome, buf.lines(), store)
    }

    #[test]
    fn registry_lists_builtins() {
        let registry = builtin_registry();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["ramp", "store", "sleep", "fail", "echo"]
        );
        assert!(registry.iter().all(|h| !h.description().is_empty()));
    }

    #[test]
    fn ramp_reports_each_step() {
        let (outcome, lines, store) = run(
            "ramp",
            &config(&[("steps", ParamValue::Int(4)), ("delay_ms", ParamValue::Int(0))]),
        );
        outcome.unwrap();
        assert_eq!(lines.len(), 4);
        assert!(store.is_empty());

        let Some(Frame::Update { values }) = Frame::parse(&lines[3]) else {
            panic!("expected update frame");
        };
        assert_eq!(values["progress"], json!(100));
        assert_eq!(values["step"], json!(4));
    }

    #[test]
    fn ramp_rejects_bad_steps() {
        let (outcome, _, _) = run("ramp", &config(&[("steps", ParamValue::Int(0))]));
        assert!(matches!(outcome, Err(HandleError::InvalidParameter { name, .. }) if name == "steps"));

        let (outcome, _, _) = run("ramp", &config(&[("steps", "many".into())]));
        assert!(matches!(outcome, Err(HandleError::InvalidParameter { .. })));
    }

    #[test]
    fn store_writes_parameters() {
        let (outcome, _, store) = run("store", &config(&[("x", ParamValue::Int(1))]));
        outcome.unwrap();
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.get("x"), Some(&json!(1)));
    }

    #[test]
    fn sleep_reports_ten_ticks() {
        let (outcome, lines, store) = run("sleep", &config(&[("duration_ms", ParamValue::Int(20))]));
        outcome.unwrap();
        assert_eq!(lines.len(), 10);
        assert_eq!(store.get("slept_ms"), Some(&json!(20)));
    }

    #[test]
    fn fail_uses_message() {
        let (outcome, lines, _) = run(
            "fail",
            &config(&[("message", "bad input".into()), ("progress", ParamValue::Int(30))]),
        );
        assert!(matches!(outcome, Err(HandleError::Failed(m)) if m == "bad input"));
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn echo_stores_settings() {
        let (outcome, _, store) = run("echo", &config(&[("lr", ParamValue::Float(0.5))]));
        outcome.unwrap();
        assert_eq!(store.get("name"), Some(&json!("test_run")));
        assert_eq!(store.get("settings"), Some(&json!({"params": {"lr": 0.5}})));
    }
}

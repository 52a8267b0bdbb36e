//! Reload behaviour of the logging pipeline.

use std::time::Duration;

use scopelog::context::{self, ExecutionContext};
use scopelog::Level;

mod common;

use common::{recording_config, wait_until, TestPipeline};

#[test]
fn test_valid_reload_changes_thresholds_for_existing_loggers() {
    let test = TestPipeline::new(&recording_config("info"));
    let logger = test.pipeline.category_logger("orders.checkout");

    logger.debug("before reload");
    assert!(test.memory().is_empty());

    test.rewrite(&recording_config("debug"));
    let version = test.pipeline.reload().unwrap();
    assert_eq!(version, 2);

    logger.debug("after reload");
    let lines = test.memory().lines();
    assert_eq!(lines, vec!["[no-ctx] orders.checkout DEBUG after reload"]);
}

#[test]
fn test_invalid_reload_keeps_snapshot_and_records_error() {
    let test = TestPipeline::new(&recording_config("info"));
    let before = test.pipeline.snapshot();

    test.rewrite("[categories.default\nlevel = ");
    assert!(test.pipeline.reload().is_err());

    let after = test.pipeline.snapshot();
    assert_eq!(after.version, before.version);
    assert!(test.pipeline.last_reload_error().is_some());

    let recorded = test.memory().replay();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].category, "config.loader");
    assert_eq!(recorded[0].level, Level::Error);
}

#[test]
fn test_semantically_invalid_reload_is_rejected() {
    let test = TestPipeline::new(&recording_config("info"));

    test.rewrite(
        r#"
[categories.default]
level = "info"
appenders = ["nowhere"]
"#,
    );
    let err = test.pipeline.reload().unwrap_err();
    assert!(err.to_string().contains("nowhere"));
    assert_eq!(test.pipeline.version(), 1);

    test.rewrite(&recording_config("warn"));
    test.pipeline.reload().unwrap();
    assert!(test.pipeline.last_reload_error().is_none());
}

#[test]
fn test_first_load_failure_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_config(dir.path(), "categories = 3");
    let source = std::sync::Arc::new(scopelog::ConfigSource::new(path));
    assert!(scopelog::LogPipeline::from_source(source).is_err());
}

#[test]
fn test_reload_gives_fresh_recording() {
    let test = TestPipeline::new(&recording_config("info"));
    let old = test.memory();
    test.pipeline.category_logger("app").info("one");

    test.pipeline.reload().unwrap();
    test.pipeline.category_logger("app").info("two");

    assert_eq!(old.len(), 1);
    assert_eq!(test.memory().lines(), vec!["[no-ctx] app INFO two"]);
}

#[tokio::test]
async fn test_request_id_in_lines_across_reload() {
    let test = TestPipeline::new(&recording_config("info"));
    let logger = test.pipeline.category_logger("jobs");

    context::scope(ExecutionContext::new("req-42"), async {
        logger.info("started");
        test.rewrite(&recording_config("info"));
        test.pipeline.reload().unwrap();
        context::spawn({
            let logger = logger.clone();
            async move { logger.info("child") }
        })
        .await
        .unwrap();
    })
    .await;

    assert_eq!(test.memory().lines(), vec!["[req-42] jobs INFO child"]);
}

#[tokio::test]
async fn test_watcher_applies_file_changes() {
    let test = TestPipeline::new(&recording_config("info"));
    let subscription = test.pipeline.watch().unwrap().unwrap();
    let logger = test.pipeline.category_logger("watched");

    // Give the watcher a moment before the write.
    tokio::time::sleep(Duration::from_millis(200)).await;
    test.rewrite(&recording_config("trace"));

    let pipeline = test.pipeline.clone();
    let applied = wait_until(Duration::from_secs(10), move || {
        pipeline.is_enabled("watched", Level::Trace)
    })
    .await;
    assert!(applied, "watcher never applied the new config");

    // One write can raise several events; let them all land.
    tokio::time::sleep(Duration::from_millis(500)).await;
    logger.trace("visible");
    assert!(test
        .memory()
        .lines()
        .iter()
        .any(|line| line.ends_with("watched TRACE visible")));

    assert!(subscription.close());
}

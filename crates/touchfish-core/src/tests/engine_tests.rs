//! Tests for recipe execution: parsing, failures, timeouts and supersession

use super::fixtures::{
    ECHO_LIST, LEAVE_PIPE_OPEN, RECORD_PID_AND_HANG, RecipeDir, SLEEP_THEN_ECHO, engine_for,
    kill_process, process_alive, short_timeout, wait_for_pid,
};
use crate::config::ExecutionConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use touchfish_types::{ActionKind, ResultType};

#[tokio::test]
async fn test_execute_list_result() {
    let dir = RecipeDir::new();
    dir.add_script("echo", ECHO_LIST);
    let engine = engine_for(&dir);

    let output = engine.execute("echo", "hello").await.unwrap();

    assert_eq!(output.recipe_id, "echo");
    assert_eq!(output.query, "hello");
    assert_eq!(output.token, 1);
    assert!(!output.result.is_error());
    assert_eq!(output.result.result_type, ResultType::List);
    assert_eq!(output.result.items[0].title, "hello");
}

#[tokio::test]
async fn test_tokens_strictly_increase_per_recipe() {
    let dir = RecipeDir::new();
    dir.add_script("a", ECHO_LIST);
    dir.add_script("b", ECHO_LIST);
    let engine = engine_for(&dir);

    let first = engine.execute("a", "x").await.unwrap();
    let second = engine.execute("a", "y").await.unwrap();
    let other = engine.execute("b", "z").await.unwrap();

    assert!(second.token > first.token);
    assert_eq!(other.token, 1);
    assert!(engine.is_latest("a", second.token));
    assert!(!engine.is_latest("a", first.token));
}

#[tokio::test]
async fn test_empty_query_forwarded() {
    let dir = RecipeDir::new();
    dir.add_script(
        "brackets",
        r#"printf '{"type":"text","items":[{"title":"[%s]"}]}' "$1""#,
    );
    let engine = engine_for(&dir);

    let output = engine.execute("brackets", "").await.unwrap();

    assert_eq!(output.result.items[0].title, "[]");
}

#[tokio::test]
async fn test_query_placeholder_substitution() {
    let dir = RecipeDir::new();
    dir.add_script_with(
        "greet",
        r#"printf '{"type":"text","items":[{"title":"%s"}]}' "$1""#,
        &json!({"args": ["run.sh", "hi {query}"]}),
    );
    let engine = engine_for(&dir);

    let output = engine.execute("greet", "fish").await.unwrap();

    assert_eq!(output.result.items[0].title, "hi fish");
}

#[tokio::test]
async fn test_stdin_query_mode() {
    let dir = RecipeDir::new();
    dir.add_script_with(
        "stdin",
        r#"q=$(cat); printf '{"type":"text","items":[{"title":"%s"}]}' "$q""#,
        &json!({"queryMode": "stdin"}),
    );
    let engine = engine_for(&dir);

    let output = engine.execute("stdin", "from stdin").await.unwrap();

    assert_eq!(output.result.items[0].title, "from stdin");
}

#[tokio::test]
async fn test_actions_and_parameters_parsed() {
    let dir = RecipeDir::new();
    dir.add_script(
        "links",
        r#"echo '{"type":"list","items":[{"title":"t","actions":["copy","open"],"parameters":{"0":["hello"],"1":["https://example.com"]}}]}'"#,
    );
    let engine = engine_for(&dir);

    let output = engine.execute("links", "").await.unwrap();
    let item = &output.result.items[0];

    assert_eq!(item.actions, vec![ActionKind::Copy, ActionKind::Open]);
    assert_eq!(item.first_parameter(1), Some("https://example.com"));
}

#[tokio::test]
async fn test_recipe_error_message_surfaced() {
    let dir = RecipeDir::new();
    dir.add_script(
        "offline",
        r#"echo '{"errorMessage":"no network","type":"list","items":[{"title":"x"}]}'"#,
    );
    let engine = engine_for(&dir);

    let result = engine.execute("offline", "q").await.unwrap().result;

    assert_eq!(result.error_message.as_deref(), Some("no network"));
    assert!(result.visible_items().is_empty());
}

#[tokio::test]
async fn test_malformed_output() {
    let dir = RecipeDir::new();
    dir.add_script("garbage", "echo 'not json at all'");
    dir.add_script("untyped", r#"echo '{"items":[]}'"#);
    dir.add_script(
        "unknown-action",
        r#"echo '{"type":"list","items":[{"title":"x","actions":["launch"]}]}'"#,
    );
    dir.add_script(
        "bad-index",
        r#"echo '{"type":"list","items":[{"title":"x","actions":["copy"],"parameters":{"1":["a"]}}]}'"#,
    );
    let engine = engine_for(&dir);

    for id in ["garbage", "untyped", "unknown-action", "bad-index"] {
        let result = engine.execute(id, "").await.unwrap().result;
        assert_eq!(
            result.error_message.as_deref(),
            Some("malformed output"),
            "recipe {id}"
        );
    }
}

#[tokio::test]
async fn test_nonzero_exit_uses_stderr() {
    let dir = RecipeDir::new();
    dir.add_script("fails", r#"echo '{"type":"none"}'; echo '  boom  ' >&2; exit 3"#);
    let engine = engine_for(&dir);

    let result = engine.execute("fails", "").await.unwrap().result;

    assert_eq!(result.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_nonzero_exit_without_stderr() {
    let dir = RecipeDir::new();
    dir.add_script("quiet", "exit 4");
    let engine = engine_for(&dir);

    let result = engine.execute("quiet", "").await.unwrap().result;

    assert_eq!(result.error_message.as_deref(), Some("exit status 4"));
}

#[tokio::test]
async fn test_unknown_recipe() {
    let dir = RecipeDir::new();
    let engine = engine_for(&dir);

    let output = engine.execute("nope", "q").await.unwrap();

    assert_eq!(
        output.result.error_message.as_deref(),
        Some("recipe not found: nope")
    );
}

#[tokio::test]
async fn test_launch_failure() {
    let dir = RecipeDir::new();
    dir.add_manifest(
        "missing-bin",
        r#"{"bundleId": "test.missing", "command": "/nonexistent/touchfish-recipe"}"#,
    );
    let engine = engine_for(&dir);

    let result = engine.execute("missing-bin", "").await.unwrap().result;

    assert!(
        result
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("launch failed"))
    );
}

#[tokio::test]
async fn test_timeout_kills_child() {
    let dir = RecipeDir::new();
    let bundle = dir.add_script("hang", RECORD_PID_AND_HANG);
    let engine = engine_for(&dir);
    engine.set_config(short_timeout(300));

    let output = engine.execute("hang", "").await.unwrap();
    let pid = wait_for_pid(&bundle).await;

    assert_eq!(output.result.error_message.as_deref(), Some("timeout"));
    assert!(output.result.time_cost >= Duration::from_millis(300));
    assert!(output.result.time_cost < Duration::from_secs(5));
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_manifest_timeout_overrides_config() {
    let dir = RecipeDir::new();
    dir.add_script_with("slow", "exec sleep 5", &json!({"timeoutMs": 200}));
    let engine = engine_for(&dir);

    let result = engine.execute("slow", "").await.unwrap().result;

    assert_eq!(result.error_message.as_deref(), Some("timeout"));
    assert!(result.time_cost < Duration::from_secs(3));
}

#[tokio::test]
async fn test_oversized_output_is_malformed() {
    let dir = RecipeDir::new();
    dir.add_script("chatty", ECHO_LIST);
    let engine = engine_for(&dir);
    engine.set_config(ExecutionConfig {
        max_output_bytes: 16,
        ..ExecutionConfig::default()
    });

    let result = engine.execute("chatty", "a long enough query").await.unwrap().result;

    assert_eq!(result.error_message.as_deref(), Some("malformed output"));
}

#[tokio::test]
async fn test_last_writer_wins() {
    let dir = RecipeDir::new();
    dir.add_script("sleepy", SLEEP_THEN_ECHO);
    let engine = engine_for(&dir);

    // Older requests sleep longer, so without supersession they would land last
    let queries = ["0.8", "0.6", "0.4", "0.2", "0"];
    let handles: Vec<_> = queries
        .iter()
        .map(|query| {
            let request = engine.begin("sleepy", query);
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(request).await })
        })
        .collect();

    let mut published = Vec::new();
    for handle in handles {
        if let Some(output) = handle.await.unwrap() {
            published.push(output);
        }
    }

    assert_eq!(published.len(), 1);
    assert_eq!(published[0].query, "0");
    assert_eq!(published[0].token, 5);
    assert_eq!(published[0].result.items[0].title, "0");
}

#[tokio::test]
async fn test_superseded_child_is_killed() {
    let dir = RecipeDir::new();
    let bundle = dir.add_script("hang", RECORD_PID_AND_HANG);
    let engine = engine_for(&dir);

    let first = engine.begin("hang", "old");
    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(first).await })
    };
    let pid = wait_for_pid(&bundle).await;
    assert!(process_alive(pid));

    let _newer = engine.begin("hang", "new");
    let outcome = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();

    assert!(outcome.is_none());
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_recipes_do_not_supersede_each_other() {
    let dir = RecipeDir::new();
    dir.add_script("a", SLEEP_THEN_ECHO);
    dir.add_script("b", SLEEP_THEN_ECHO);
    let engine = engine_for(&dir);

    let request_a = engine.begin("a", "0.2");
    let request_b = engine.begin("b", "0");
    let (a, b) = tokio::join!(engine.run(request_a), engine.run(request_b));

    assert_eq!(a.unwrap().result.items[0].title, "0.2");
    assert_eq!(b.unwrap().result.items[0].title, "0");
}

#[tokio::test]
async fn test_cancel_discards_in_flight() {
    let dir = RecipeDir::new();
    dir.add_script("sleepy", SLEEP_THEN_ECHO);
    let engine = engine_for(&dir);

    let request = engine.begin("sleepy", "0.5");
    engine.cancel("sleepy");

    assert!(engine.run(request).await.is_none());
}

#[tokio::test]
async fn test_config_change_applies_to_next_request() {
    let dir = RecipeDir::new();
    dir.add_script("slow", "sleep 1; echo '{\"type\":\"none\"}'");
    let engine = engine_for(&dir);

    engine.set_config(short_timeout(100));
    let result = engine.execute("slow", "").await.unwrap().result;
    assert_eq!(result.error_message.as_deref(), Some("timeout"));

    engine.set_config(short_timeout(3000));
    let result = engine.execute("slow", "").await.unwrap().result;
    assert!(result.is_dismissal());
}

#[tokio::test]
async fn test_cancel_observed_while_grandchild_holds_pipes() {
    let dir = RecipeDir::new();
    let bundle = dir.add_script("leaky", LEAVE_PIPE_OPEN);
    let engine = engine_for(&dir);

    let request = engine.begin("leaky", "");
    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(request).await })
    };
    let pid = wait_for_pid(&bundle).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    engine.cancel("leaky");
    let output = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("cancellation not observed while pipes were open")
        .unwrap();
    kill_process(pid);

    assert!(output.is_none());
}

#[tokio::test]
async fn test_deadline_applies_while_grandchild_holds_pipes() {
    let dir = RecipeDir::new();
    let bundle = dir.add_script("leaky", LEAVE_PIPE_OPEN);
    let engine = Arc::new(crate::ExecutionEngine::new(dir.registry(), short_timeout(300)));

    let output = tokio::time::timeout(Duration::from_secs(2), engine.execute("leaky", ""))
        .await
        .expect("deadline not enforced")
        .unwrap();
    kill_process(wait_for_pid(&bundle).await);

    assert_eq!(output.result.error_message.as_deref(), Some("timeout"));
}

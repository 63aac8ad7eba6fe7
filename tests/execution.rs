//! End-to-end execution properties.
//!
//! These tests drive the real system Python interpreter and skip when none
//! is installed, so the suite stays green on minimal CI images.

use pycell::config::types::SandboxConfig;
use pycell::sandbox::TRUNCATION_MARKER;
use pycell::{ExecutionHost, ExecutionRequest, ExecutionStatus};

fn host() -> Option<ExecutionHost> {
    match ExecutionHost::with_defaults() {
        Ok(host) => Some(host),
        Err(err) => {
            eprintln!("skipping: {err}");
            None
        }
    }
}

#[tokio::test]
async fn prints_and_returns_final_expression() {
    let Some(host) = host() else { return };

    let result = host
        .run(ExecutionRequest::new("print(\"hello\")\n2 + 2"))
        .await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.stdout.contains("hello"));
    assert_eq!(result.return_value, Some(serde_json::json!(4)));
    assert!(result.error_detail.is_none());
}

#[tokio::test]
async fn statement_only_program_has_no_return_value() {
    let Some(host) = host() else { return };

    let result = host.run(ExecutionRequest::new("x = 40 + 2")).await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.return_value, None);
}

#[tokio::test]
async fn stdin_is_passed_through() {
    let Some(host) = host() else { return };

    let result = host
        .run(ExecutionRequest::new("print(input())").with_stdin("ok"))
        .await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.stdout.contains("ok"));
}

#[tokio::test]
async fn rejected_code_never_executes() {
    let Some(host) = host() else { return };

    let dir = tempfile::tempdir().unwrap();
    let probe = dir.path().join("probe.txt");
    // The write would prove execution happened; the import gets the request
    // rejected before any unit exists.
    let code = format!(
        "with open('{}', 'w') as fh:\n    fh.write('executed')\nimport subprocess",
        probe.display()
    );

    let result = host.run(ExecutionRequest::new(code)).await;

    assert_eq!(result.status, ExecutionStatus::SecurityRejected);
    assert!(!probe.exists(), "rejected code must never run");
    assert_eq!(result.resource_usage.elapsed_ms, 0);
    let detail = result.error_detail.unwrap();
    assert!(detail.contains("denied_import"));
    assert!(detail.contains("denied_call"));
}

#[tokio::test]
async fn syntax_error_is_security_rejected() {
    let Some(host) = host() else { return };

    let result = host.run(ExecutionRequest::new("def broken(:\n")).await;

    assert_eq!(result.status, ExecutionStatus::SecurityRejected);
    assert!(result.error_detail.unwrap().contains("syntax_error"));
}

#[tokio::test]
async fn infinite_loop_is_killed_as_timeout() {
    let Some(host) = host() else { return };

    let result = host
        .run(ExecutionRequest::new("while True:\n    pass").with_timeout_ms(500))
        .await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    // Bounded by the ceiling plus the watchdog polling interval, with
    // generous slack for slow CI machines.
    assert!(result.resource_usage.elapsed_ms < 5_000);
}

#[tokio::test]
async fn runaway_allocation_is_memory_exceeded() {
    let Some(host) = host() else { return };

    let code = "data = []\nwhile True:\n    data.append(' ' * (1024 * 1024))";
    let result = host
        .run(
            ExecutionRequest::new(code)
                .with_memory_limit_bytes(64 * 1024 * 1024)
                .with_timeout_ms(10_000),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::MemoryExceeded);
}

#[tokio::test]
async fn runtime_error_surfaces_sanitized_detail() {
    let Some(host) = host() else { return };

    let result = host.run(ExecutionRequest::new("1 / 0")).await;

    assert_eq!(result.status, ExecutionStatus::RuntimeError);
    let detail = result.error_detail.unwrap();
    assert!(detail.contains("ZeroDivisionError"));
    // Only the submitted code's own failure is surfaced
    assert!(!detail.contains("/tmp"));
}

#[tokio::test]
async fn concurrent_requests_resolve_independently() {
    let Some(host) = host() else { return };

    let slow = host.run(ExecutionRequest::new("while True:\n    pass").with_timeout_ms(1_500));
    let fast = host.run(ExecutionRequest::new("print(\"ok\")"));

    let (slow_result, fast_result) = tokio::join!(slow, fast);

    assert_eq!(fast_result.status, ExecutionStatus::Success);
    assert!(fast_result.stdout.contains("ok"));
    assert_eq!(slow_result.status, ExecutionStatus::Timeout);
}

#[tokio::test]
async fn oversized_output_is_truncated_and_flagged() {
    let config = SandboxConfig {
        max_output_bytes: 1024,
        ..SandboxConfig::default()
    };
    let Ok(host) = ExecutionHost::new(config) else {
        eprintln!("skipping: python3 not available");
        return;
    };

    let result = host
        .run(ExecutionRequest::new("print('x' * 100000)"))
        .await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    assert!(result.stdout.len() <= 1024 + TRUNCATION_MARKER.len());
}

#[tokio::test]
async fn limits_are_capped_at_host_maxima() {
    let config = SandboxConfig {
        max_timeout_ms: 800,
        ..SandboxConfig::default()
    };
    let Ok(host) = ExecutionHost::new(config) else {
        eprintln!("skipping: python3 not available");
        return;
    };

    // The caller asks for far more time than the host allows; the loop must
    // still die at the capped ceiling.
    let result = host
        .run(ExecutionRequest::new("while True:\n    pass").with_timeout_ms(600_000))
        .await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(result.resource_usage.elapsed_ms < 5_000);
}

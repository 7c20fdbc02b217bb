use std::collections::BTreeMap;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use sovereign_core::config::ClientConfig;
use sovereign_core::models::{
    Action, HttpMethod, MirrorStats, OperationStatus, QueuedOperation,
};
use sovereign_core::{CycleReport, OperationQueue, StoreStats};

use crate::cli::ActionArg;
use crate::commands::auth_cmd::build_session;
use crate::commands::common::{
    format_operation_lines, format_relative_time, format_remaining, operation_to_item,
    parse_payload, resolve_db_path, CliContext,
};
use crate::commands::status::{format_status_lines, StatusReport};
use crate::commands::sync::format_report_lines;
use crate::error::CliError;

fn queued(id: i64, retries: u32, last_error: Option<&str>) -> QueuedOperation {
    QueuedOperation {
        id,
        url: "/projects".to_string(),
        method: HttpMethod::Post,
        headers: BTreeMap::new(),
        body: Some("{\"name\":\"Water\"}".to_string()),
        timestamp: 1_000_000,
        retries,
        status: OperationStatus::Pending,
        last_error: last_error.map(str::to_string),
    }
}

fn temp_context(dir: &tempfile::TempDir) -> CliContext {
    CliContext {
        db_path: dir.path().join("sovereign.db"),
        session_path: dir.path().join("session.json"),
        config: ClientConfig::default(),
    }
}

#[test]
fn format_relative_time_units() {
    let now = 100 * 24 * 60 * 60_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
    assert_eq!(format_relative_time(now - 14 * 24 * 60 * 60_000, now), "2w ago");
}

#[test]
fn format_relative_time_treats_future_as_now() {
    assert_eq!(format_relative_time(5_000, 1_000), "just now");
}

#[test]
fn format_remaining_clamps_expired_entries() {
    assert_eq!(format_remaining(1_000, 5_000), "0s");
    assert_eq!(format_remaining(45_000, 0), "45s");
    assert_eq!(format_remaining(5 * 60_000, 0), "5m");
    assert_eq!(format_remaining(3 * 60 * 60_000, 0), "3h");
}

#[test]
fn parse_payload_accepts_json_and_blank() {
    assert_eq!(parse_payload(None).unwrap(), None);
    assert_eq!(parse_payload(Some("   ")).unwrap(), None);
    assert_eq!(
        parse_payload(Some(r#"{"sector":"energy"}"#)).unwrap(),
        Some(serde_json::json!({"sector": "energy"}))
    );
}

#[test]
fn parse_payload_rejects_malformed_json() {
    let error = parse_payload(Some("{not json")).unwrap_err();
    assert!(matches!(error, CliError::InvalidPayload(_)));
}

#[test]
fn action_arg_maps_to_core_action() {
    assert_eq!(Action::from(ActionArg::Create), Action::Create);
    assert_eq!(Action::from(ActionArg::Update), Action::Update);
    assert_eq!(Action::from(ActionArg::Delete), Action::Delete);
}

#[test]
fn resolve_db_path_prefers_cli_argument() {
    let explicit = PathBuf::from("/tmp/sovereign-test.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn build_session_trims_token_and_computes_expiry() {
    let session = build_session(
        "  tok-123  ",
        Some(3600),
        Some("  ops@example.org ".to_string()),
        1_700_000_000,
    )
    .unwrap();

    assert_eq!(session.access_token, "tok-123");
    assert_eq!(session.expires_at, Some(1_700_003_600));
    assert_eq!(session.email.as_deref(), Some("ops@example.org"));
}

#[test]
fn build_session_rejects_blank_token() {
    let error = build_session("   ", None, None, 0).unwrap_err();
    assert!(matches!(error, CliError::EmptyToken));
}

#[test]
fn operation_lines_include_last_error() {
    let operations = vec![queued(1, 0, None), queued(2, 2, Some("HTTP 503"))];
    let lines = format_operation_lines(&operations, 1_000_000 + 120_000);

    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("POST"));
    assert!(lines[0].contains("/projects"));
    assert!(!lines[0].contains("last error"));
    assert!(lines[1].contains("retries 2"));
    assert!(lines[1].ends_with("last error: HTTP 503"));
}

#[test]
fn operation_item_carries_status_and_age() {
    let item = operation_to_item(&queued(9, 1, None), 1_000_000 + 3 * 60_000);
    assert_eq!(item.id, 9);
    assert_eq!(item.method, "POST");
    assert_eq!(item.status, "pending");
    assert_eq!(item.relative_time, "3m ago");
}

#[test]
fn report_lines_skip_pull_counts_when_offline() {
    let report = CycleReport {
        still_pending: vec![4, 5],
        cycle_error: Some("remote unreachable".to_string()),
        ..CycleReport::default()
    };

    let lines = format_report_lines(&report);
    assert_eq!(
        lines,
        vec!["Pushed 0 operation(s); 2 still pending, 0 newly failed".to_string()]
    );
}

#[test]
fn report_lines_list_pull_counts_and_failures() {
    let report = CycleReport {
        pushed: vec![1, 2, 3],
        newly_failed: vec![7],
        countries: MirrorStats {
            inserted: 2,
            updated: 1,
            skipped: 0,
        },
        projects: MirrorStats {
            inserted: 0,
            updated: 4,
            skipped: 1,
        },
        pulled: true,
        ..CycleReport::default()
    };

    let lines = format_report_lines(&report);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[1], "Countries: 2 new, 1 updated, 0 skipped");
    assert_eq!(lines[2], "Projects: 0 new, 4 updated, 1 skipped");
    assert!(lines[3].contains("[7]"));
}

#[test]
fn report_lines_flag_rejected_credentials() {
    let report = CycleReport {
        unauthorized: true,
        ..CycleReport::default()
    };
    let lines = format_report_lines(&report);
    assert!(lines.last().unwrap().contains("sign in again"));
}

#[test]
fn status_lines_show_never_synced() {
    let report = StatusReport {
        db_path: "/data/sovereign.db".to_string(),
        api_base_url: "https://api.example.org".to_string(),
        signed_in: false,
        last_sync: None,
        stats: StoreStats {
            pending_operations: 3,
            failed_operations: 1,
            cached_entries: 2,
            countries: 10,
            projects: 4,
        },
    };

    let lines = format_status_lines(&report, 0);
    assert_eq!(lines[2], "Signed in:  no");
    assert_eq!(lines[3], "Last sync:  never");
    assert_eq!(lines[4], "Queue:      3 pending, 1 failed");
    assert_eq!(lines[6], "Mirrors:    10 countries, 4 projects");
}

#[test]
fn status_report_json_flattens_stats() {
    let report = StatusReport {
        db_path: "db".to_string(),
        api_base_url: "https://api.example.org".to_string(),
        signed_in: true,
        last_sync: Some(42),
        stats: StoreStats::default(),
    };

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["last_sync"], 42);
    assert_eq!(value["pending_operations"], 0);
    assert!(value.get("stats").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_added_through_context_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let context = temp_context(&dir);

    {
        let queue = OperationQueue::new(context.open_store().await.unwrap());
        queue
            .enqueue_action(Action::Delete, "projects", Some("p-1"), None)
            .await
            .unwrap();
    }

    let reopened = temp_context(&dir);
    let queue = OperationQueue::new(reopened.open_store().await.unwrap());
    let pending = queue.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].method, HttpMethod::Delete);
    assert_eq!(pending[0].url, "/projects/p-1");
}

#[tokio::test(flavor = "multi_thread")]
async fn store_stats_reflect_queue_state() {
    let dir = tempfile::tempdir().unwrap();
    let context = temp_context(&dir);
    let store = context.open_store().await.unwrap();
    let queue = OperationQueue::new(store.clone());

    queue
        .enqueue_action(Action::Create, "countries", None, None)
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.pending_operations, 1);
    assert_eq!(stats.failed_operations, 0);
}

#[test]
fn session_auth_uses_context_path() {
    let dir = tempfile::tempdir().unwrap();
    let context = temp_context(&dir);
    let auth = context.session_auth();

    assert!(auth.current_session().unwrap().is_none());
    let session = build_session("tok", None, None, 0).unwrap();
    auth.sign_in(&session).unwrap();
    assert!(context.session_path.exists());
    assert_eq!(
        auth.current_session().unwrap().map(|s| s.access_token),
        Some("tok".to_string())
    );
}

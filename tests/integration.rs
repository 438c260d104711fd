// SPDX-License-Identifier: MPL-2.0
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use junebug::config::{self, ReporterConfig};
use junebug::diagnostics::{CaptureBuffer, CapturedValue, DiagnosticHook, Severity, SharedValue};
use junebug::report::{ChatCardComposer, EmailComposer, ReportPayload};
use junebug::{BugReporter, SubmitOutcome};
use serde_json::{json, Value};
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Decodes the base64 part whose filename starts with `prefix`.
fn attachment_text(raw: &str, prefix: &str) -> String {
    let marker = format!("filename=\"{prefix}");
    let start = raw.find(&marker).expect("attachment present");
    let content_start = start + raw[start..].find("\n\n").expect("part headers end") + 2;
    let rest = &raw[content_start..];
    let content_end = rest.find("\n--Boundary_").expect("part terminated");
    let joined: String = rest[..content_end].lines().collect();
    String::from_utf8(STANDARD.decode(joined).expect("valid base64")).expect("utf-8 text")
}

#[tokio::test]
async fn captured_events_reach_the_relay() {
    let hook = DiagnosticHook::install_global();
    assert!(std::ptr::eq(hook, DiagnosticHook::install_global()));

    tracing::info!("integration session started");
    tracing::warn!(attempt = 2_u64, "retrying upload");
    let _ = std::panic::catch_unwind(|| panic!("renderer crashed"));

    let failed = tokio::spawn(async { Err::<(), std::io::Error>(std::io::Error::other("socket closed")) });
    assert!(hook.watch(failed).await.is_none());

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().expect("Failed to create temporary directory");
    let config_path = dir.path().join("settings.toml");
    let Value::Object(reporter_info) = json!({ "fullName": "Jane Doe", "team_name": "Ops" }) else {
        unreachable!()
    };
    let settings = ReporterConfig {
        support_inbox: Some("support@example.com".to_string()),
        app_name: Some("Integration".to_string()),
        endpoint: Some(format!("{}/send", server.uri())),
        reporter_info: Some(reporter_info),
        ..ReporterConfig::default()
    };
    config::save_to_path(&settings, &config_path).expect("Failed to write config file");
    let loaded = config::load_from_path(&config_path).expect("Failed to load config from path");

    let outcome = BugReporter::new(loaded)
        .expect("reporter builds")
        .submit("Upload keeps failing", None)
        .await;
    assert!(matches!(outcome, SubmitOutcome::Delivered));

    let requests = server.received_requests().await.expect("recording enabled");
    let body: Value = serde_json::from_slice(&requests[0].body).expect("JSON body");
    let raw = body["rawEmail"].as_str().expect("rawEmail string");

    assert!(raw.contains("\nSubject: JuneBug Report - Integration\n"));
    assert!(raw.contains("----User Info Block----\nFull Name: Jane Doe\nTeam Name: Ops"));

    let logs = attachment_text(raw, "console-logs-");
    assert!(logs.contains("🟦 INFO integration session started"));
    assert!(logs.contains("🟨 WARN retrying upload"));
    assert!(logs.contains("🟥 ERROR panic: renderer crashed @ "));
    assert!(logs.contains("🟥 ERROR Error: socket closed"));
}

#[test]
fn explicit_hook_feeds_both_documents() {
    let buffer = CaptureBuffer::new();
    let hook = DiagnosticHook::new(buffer.clone());

    let node = SharedValue::new(CapturedValue::Null);
    node.set(CapturedValue::map([("parent", CapturedValue::from(node.clone()))]));
    hook.error(vec!["cyclic state".into(), node.into()]);
    hook.info(vec![CapturedValue::from(json!({ "route": "/export" }))]);

    let snapshot = buffer.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.entries()[0].severity(), Severity::Error);

    let payload = ReportPayload::new("Export hangs").logs(snapshot.clone());
    let document = EmailComposer::new().compose(&payload);
    let logs = attachment_text(document.as_str(), "console-logs-");
    assert!(logs.contains("cyclic state\n[object Object]"));
    assert!(logs.contains("{\n  \"route\": \"/export\"\n}"));
    assert_eq!(logs, snapshot.pretty_print());

    let card = ChatCardComposer::new().compose(&payload, None);
    assert_eq!(
        card.container_ids(),
        vec!["StackTraceContainer0", "StackTraceContainer1"]
    );
}

#[test]
fn buffer_stays_bounded_under_concurrent_writers() {
    let buffer = CaptureBuffer::new();
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let hook = DiagnosticHook::new(buffer.clone());
            std::thread::spawn(move || {
                for n in 0..100 {
                    hook.log(vec![format!("worker {worker} event {n}").into()]);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker finished");
    }

    assert_eq!(buffer.len(), 100);
}

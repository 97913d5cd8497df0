mod common;

use std::fs;
use std::sync::Arc;

use url::Url;

use common::{param, test_settings, token_in, FakeBrowser, Page, Site};
use sinkprobe::evidence::{EvidenceSink, FsEvidenceSink};
use sinkprobe::models::SessionReport;
use sinkprobe::payloads::PayloadCatalog;
use sinkprobe::pipeline::FuzzOrchestrator;
use sinkprobe::reporting::{render, OutputFormat};

/// Search page echoing `q` raw; markup carrying a token runs.
struct Search;

impl Site for Search {
    fn load(&self, url: &Url) -> Page {
        let q = param(url, "q").unwrap_or_default();
        let page = Page::html(format!("<html><body><h1>Results for {}</h1></body></html>", q));
        match token_in(&q) {
            Some(token) if q.contains('<') => page.executed(&token),
            _ => page,
        }
    }
}

async fn scan_into(dir: &std::path::Path) -> SessionReport {
    let (browser, _) = FakeBrowser::new(Search);
    let sink = FsEvidenceSink::initialize(dir).await.unwrap();
    FuzzOrchestrator::new(
        Url::parse("http://shop.test/search?q=shoes").unwrap(),
        test_settings(),
        PayloadCatalog::builtin(),
        Box::new(browser),
        Arc::new(sink) as Arc<dyn EvidenceSink>,
    )
    .run()
    .await
}

fn read_json(path: std::path::PathBuf) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_session_writes_evidence_layout() {
    let dir = tempfile::tempdir().unwrap();
    let report = scan_into(dir.path()).await;
    assert_eq!(report.findings.len(), 1);

    for file in ["report.json", "findings.json", "session_metrics.json", "workflow.log"] {
        assert!(dir.path().join(file).exists(), "Expected {} to exist", file);
    }
    assert!(dir.path().join("evidences").is_dir());
    assert!(dir.path().join("trace").is_dir());

    let shots: Vec<String> = fs::read_dir(dir.path().join("evidences"))
        .unwrap()
        .filter_map(|e| e.ok()?.file_name().to_str().map(|s| s.to_string()))
        .collect();
    assert_eq!(shots.len(), 1);
    assert!(shots[0].starts_with("hit_f-001_"));
    assert!(shots[0].ends_with(".png"));
}

#[tokio::test]
async fn test_report_and_metrics_agree() {
    let dir = tempfile::tempdir().unwrap();
    let report = scan_into(dir.path()).await;

    let on_disk = read_json(dir.path().join("report.json"));
    assert_eq!(on_disk["session_id"], report.session_id.as_str());
    assert_eq!(on_disk["seed"], 1337);
    assert_eq!(on_disk["last_stage"], "fuzz-url-params");
    assert!(on_disk.get("error").is_none());

    let findings = read_json(dir.path().join("findings.json"));
    let findings = findings.as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["id"], "F-001");
    assert_eq!(findings[0]["signal"], "confirmed");
    assert!(findings[0]["severity"]["score"].as_u64().unwrap() > 0);

    let metrics = read_json(dir.path().join("session_metrics.json"));
    assert_eq!(metrics["payloads_used"], report.payloads_used as u64);
    assert_eq!(metrics["confirmed"], 1);
    assert_eq!(metrics["rng_position"], report.rng_position);
    assert!(metrics["stages"]["fuzz-url-params"]["attempts"].as_u64().unwrap() >= 1);

    let log = fs::read_to_string(dir.path().join("workflow.log")).unwrap();
    assert!(log.contains("stage fuzz-url-params"));
    assert!(log.contains("finding F-001"));
    assert!(log.contains("session finished: 1 finding(s)"));
}

#[tokio::test]
async fn test_rendered_outputs() {
    console::set_colors_enabled(false);
    let dir = tempfile::tempdir().unwrap();
    let report = scan_into(dir.path()).await;

    let json: serde_json::Value = serde_json::from_str(&render(&report, OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 1);

    let ndjson = render(&report, OutputFormat::Ndjson).unwrap();
    assert_eq!(ndjson.lines().count(), 1);

    let table = render(&report, OutputFormat::Table).unwrap();
    assert!(table.contains("url_param:q"));

    let summary = render(&report, OutputFormat::Summary).unwrap();
    assert!(summary.contains("http://shop.test/search?q=shoes"));
    assert!(summary.contains("TOTAL    1"));
}

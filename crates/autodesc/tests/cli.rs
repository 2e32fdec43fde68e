// ABOUTME: Integration tests for the autodesc CLI binary.
// ABOUTME: Runs scrape-description and determine-search-paths against local HTML files.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use httpmock::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const SF_TOYOTA: &str = r#"<html><body>
<div class="dealer-comments dealer-comments--square">
  <div id="dealer-comments" class="dealer-comments__text"><p>Certified Camry with a fresh oil change and new brakes.</p></div>
</div>
</body></html>"#;

fn autodesc_cmd() -> Command {
    let mut cmd = Command::cargo_bin("autodesc").unwrap();
    // keep a developer .env from leaking into assertions
    cmd.env("LLM_PROVIDER", "").env_remove("RUST_LOG");
    cmd
}

fn write_page(dir: &TempDir, html: &str) -> std::path::PathBuf {
    let path = dir.path().join("vdp.html");
    fs::write(&path, html).unwrap();
    path
}

#[test]
fn scrape_description_from_html_file() {
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir, SF_TOYOTA);

    autodesc_cmd()
        .args(["scrape-description", "https://www.sftoyota.com/vdp/1", "--no-refine", "--html"])
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Certified Camry with a fresh oil change and new brakes.",
        ));
}

#[test]
fn scrape_description_json_output() {
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir, SF_TOYOTA);

    let output = autodesc_cmd()
        .args(["scrape-description", "https://sftoyota.com/vdp/1", "--no-refine", "--json", "--html"])
        .arg(&page)
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["domain"], "sftoyota.com");
    assert_eq!(json["token_count"], 0);
}

#[test]
fn empty_page_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir, "<html><body></body></html>");

    autodesc_cmd()
        .args(["scrape-description", "https://dealer.example/vdp", "--no-refine", "--html"])
        .arg(&page)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("description not found"));
}

#[test]
fn refinement_requires_llm_configuration() {
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir, SF_TOYOTA);

    autodesc_cmd()
        .args(["scrape-description", "https://sftoyota.com/vdp/1", "--html"])
        .arg(&page)
        .assert()
        .failure()
        .stderr(predicate::str::contains("LLM_PROVIDER is not set"))
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn garbled_html_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbled.html");
    // a UTF-8 BOM pins the decoder so the invalid sequences become replacement characters
    let mut bytes = b"\xEF\xBB\xBF<html><body><div class='description'>".to_vec();
    bytes.extend(std::iter::repeat([0x80u8, 0xfe, 0xc3, 0x28]).take(100).flatten());
    bytes.extend_from_slice(b"</div></body></html>");
    fs::write(&path, bytes).unwrap();

    autodesc_cmd()
        .args(["scrape-description", "https://dealer.example/vdp", "--no-refine", "--html"])
        .arg(&path)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("malformed input"));
}

#[test]
fn determine_search_paths_prints_report() {
    let dir = TempDir::new().unwrap();
    let page = write_page(
        &dir,
        r#"<html><body><nav><a href="/">Home</a></nav>
        <div class="vehicle-description"><p>Loaded Tacoma TRD with a lift kit. Always garaged and serviced here.</p></div>
        </body></html>"#,
    );

    let output = autodesc_cmd()
        .args(["determine-search-paths", "https://newdealer.example/vdp/7", "--html"])
        .arg(&page)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["domain"], "newdealer.example");
    assert_eq!(report["profiled"], false);
    assert!(!report["proposals"].as_array().unwrap().is_empty());
}

#[test]
fn demo_runs_every_url() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/ok");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body("<html><body><div class=\"description\"><p>Sharp Civic with one owner and low miles.</p></div></body></html>");
    });
    server.mock(|when, then| {
        when.method(GET).path("/gone");
        then.status(404);
    });

    let dir = TempDir::new().unwrap();
    let urls = dir.path().join("demo_urls.json");
    fs::write(
        &urls,
        serde_json::json!({ "honda": [server.url("/gone"), server.url("/ok")] }).to_string(),
    )
    .unwrap();

    autodesc_cmd()
        .args(["demo", "--no-refine", "--allow-private-networks"])
        .arg(&urls)
        .assert()
        .failure()
        .stdout(predicate::str::contains("HONDA"))
        .stdout(predicate::str::contains("page not found"))
        .stdout(predicate::str::contains("Sharp Civic with one owner and low miles."));
}

#[test]
fn test_llm_without_configuration_fails() {
    autodesc_cmd()
        .arg("test-llm")
        .assert()
        .failure()
        .stderr(predicate::str::contains("LLM configuration"));
}

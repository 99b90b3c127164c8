use std::fs::write;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::{tempdir, NamedTempFile};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREDENTIAL_VARS: [&str; 4] = ["CONFLUENCE_USER", "CONFLUENCE_PASSWORD", "OP_USER", "OP_PASS"];

fn archive_cmd() -> Command {
    let mut cmd = Command::cargo_bin("confluence-archive").expect("Binary exists");
    for key in CREDENTIAL_VARS {
        cmd.env_remove(key);
    }
    cmd.env("RUST_LOG", "warn");
    cmd
}

/// Writes a config file pointing at `base_url` and archiving into `base_dir`.
fn create_config(base_url: &str, base_dir: &Path, sites: &[&str]) -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        format!(
            "base_url: \"{base_url}\"\nbase_dir: \"{}\"\nsites: [{}]\nrequest_timeout_secs: 10\n",
            base_dir.display(),
            sites.join(", ")
        ),
    )
    .expect("Writing temp config failed");
    config
}

#[test]
fn help_lists_subcommands() {
    archive_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export").and(predicate::str::contains("status")));
}

#[test]
fn status_reports_done_and_pending_sites() {
    let base = tempdir().unwrap();
    write(base.path().join("sites_done.csv"), "OPS,").unwrap();
    let config = create_config("http://unused", base.path(), &["DOCS", "OPS"]);

    archive_cmd()
        .arg("status")
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("DOCS\tpending").and(predicate::str::contains("OPS\tdone")));
}

#[test]
fn export_without_credentials_fails() {
    let base = tempdir().unwrap();
    let config = create_config("http://unused", base.path(), &["DOCS"]);

    archive_cmd()
        .arg("export")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFLUENCE_USER"));
}

#[test]
fn export_rejects_unusable_site_override() {
    let base = tempdir().unwrap();
    let config = create_config("http://unused", base.path(), &["DOCS"]);

    archive_cmd()
        .arg("export")
        .arg("--config")
        .arg(config.path())
        .args(["--site", "../escape"])
        .env("CONFLUENCE_USER", "user")
        .env("CONFLUENCE_PASSWORD", "secret")
        .assert()
        .failure();
    assert!(!base.path().join("sites_done.csv").exists());
}

#[tokio::test]
async fn export_mirrors_a_site_and_marks_it_done() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content"))
        .and(query_param("spaceKey", "DOCS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "id": "1", "ancestors": [] },
                { "id": "2", "ancestors": [{ "id": "1" }] }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "1", "title": "Team Home" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/1/child/page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "2", "title": "How-To" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "2", "title": "How-To" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/2/child/page"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/1/child/attachment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "title": "logo.png", "_links": { "download": "/download/logo.png" } }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/2/child/attachment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/spaces/flyingpdf/pdfpageexport.action"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 page".to_vec()))
        .mount(&server)
        .await;

    let base = tempdir().unwrap();
    let config = create_config(&server.uri(), base.path(), &["DOCS"]);

    archive_cmd()
        .arg("export")
        .arg("--config")
        .arg(config.path())
        .env("CONFLUENCE_USER", "user")
        .env("CONFLUENCE_PASSWORD", "secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("DOCS\tcompleted\troots=1 converted=2"));

    let site = base.path().join("DOCS");
    assert!(site.join("TeamHome/TeamHome.pdf").is_file());
    assert!(site.join("TeamHome/logo.png").is_file());
    assert!(site.join("TeamHome/HowTo/HowTo.pdf").is_file());
    assert_eq!(
        std::fs::read_to_string(base.path().join("sites_done.csv")).unwrap(),
        "DOCS,"
    );

    archive_cmd()
        .arg("export")
        .arg("--config")
        .arg(config.path())
        .env("CONFLUENCE_USER", "user")
        .env("CONFLUENCE_PASSWORD", "secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("DOCS\talready done"));
}

#[tokio::test]
async fn export_exits_non_zero_when_a_site_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let base = tempdir().unwrap();
    let config = create_config(&server.uri(), base.path(), &["DOCS"]);

    archive_cmd()
        .arg("export")
        .arg("--config")
        .arg(config.path())
        .env("CONFLUENCE_USER", "user")
        .env("CONFLUENCE_PASSWORD", "secret")
        .assert()
        .failure()
        .stdout(predicate::str::contains("DOCS\tFAILED"));
    assert!(!base.path().join("sites_done.csv").exists());
}

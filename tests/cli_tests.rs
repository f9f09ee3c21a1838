//! E2E tests for the mdfetch CLI

#![allow(deprecated)] // cargo_bin deprecation - will update when assert_cmd stabilizes replacement

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn mdfetch() -> Command {
    Command::cargo_bin("mdfetch").unwrap()
}

#[test]
fn test_help() {
    mdfetch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("adapters"));
}

#[test]
fn test_version() {
    mdfetch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mdfetch"));
}

#[test]
fn test_convert_help() {
    mdfetch()
        .args(["convert", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--url"))
        .stdout(predicate::str::contains("--stdin"))
        .stdout(predicate::str::contains("--no-shared-browser"))
        .stdout(predicate::str::contains("--download-images"))
        .stdout(predicate::str::contains("--retries"));
}

#[test]
fn test_adapters_help() {
    mdfetch()
        .args(["adapters", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--url"));
}

#[test]
fn test_convert_no_args_shows_usage() {
    mdfetch()
        .arg("convert")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_convert_file_not_found() {
    mdfetch()
        .args(["convert", "/nonexistent/links.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_convert_html_file_not_found() {
    mdfetch()
        .args(["convert", "/nonexistent/page.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_convert_file_without_urls() {
    let dir = tempdir().unwrap();
    let list = dir.path().join("empty.md");
    fs::write(&list, "# Notes\n\nNothing to fetch here.").unwrap();

    mdfetch()
        .args(["convert", list.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No URLs or HTML files found"));
}

#[test]
fn test_convert_retries_out_of_range() {
    mdfetch()
        .args(["convert", "--url", "https://example.com", "--retries", "0"])
        .assert()
        .failure();

    mdfetch()
        .args(["convert", "--url", "https://example.com", "--retries", "6"])
        .assert()
        .failure();
}

#[test]
fn test_convert_local_html() {
    let dir = tempdir().unwrap();
    let page = dir.path().join("page.html");
    fs::write(
        &page,
        r#"<html><head><title>Saved Article</title></head>
        <body><nav>Home | About</nav>
        <article><h1>Saved Article</h1><p>Body text worth keeping.</p></article>
        </body></html>"#,
    )
    .unwrap();
    let out = dir.path().join("out");

    mdfetch()
        .args([
            "convert",
            page.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"completed\":1"))
        .stderr(predicate::str::contains("Done: 1/1 OK"));

    let written: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("_Saved Article.md"));

    let markdown = fs::read_to_string(out.join(&written[0])).unwrap();
    assert!(markdown.contains("Saved Article"));
    assert!(markdown.contains("Body text worth keeping."));
}

#[test]
fn test_convert_yaml_summary_with_events() {
    let dir = tempdir().unwrap();
    let page = dir.path().join("note.htm");
    fs::write(&page, "<html><body><p>Short note.</p></body></html>").unwrap();

    mdfetch()
        .args([
            "convert",
            page.to_str().unwrap(),
            "-o",
            dir.path().join("out").to_str().unwrap(),
            "--format",
            "yaml",
            "--events",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed: 1"))
        .stderr(predicate::str::contains("\"kind\":\"init\""))
        .stderr(predicate::str::contains("\"kind\":\"batch_done\""));
}

#[test]
fn test_adapters_list() {
    mdfetch()
        .arg("adapters")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\":\"weixin\""))
        .stdout(predicate::str::contains("\"name\":\"zhihu\""))
        .stdout(predicate::str::contains("\"name\":\"generic\""));
}

#[test]
fn test_adapters_resolve_weixin() {
    mdfetch()
        .args(["adapters", "--url", "https://mp.weixin.qq.com/s/abc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"adapter\":\"weixin\""))
        .stdout(predicate::str::contains("\"process\":\"isolated\""));
}

#[test]
fn test_adapters_resolve_unknown_falls_back() {
    mdfetch()
        .args(["adapters", "--url", "not a url"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"adapter\":\"generic\""))
        .stdout(predicate::str::contains("\"process\":\"shared\""));
}

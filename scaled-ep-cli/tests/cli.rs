//! End-to-end tests of the offline commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CONFIG: &str = r#"
[interface]
ip = "172.16.0.2"
ifindex = 4

[[endpoints]]
vni = 1
vip = "10.0.0.3"
backends = ["10.0.1.1"]

[[endpoints]]
vni = 1
vip = "10.0.0.4"
backends = []
"#;

fn sep() -> Command {
    let mut cmd = Command::cargo_bin("sep").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sep.toml");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

fn craft(dir: &TempDir, name: &str, args: &[&str]) -> PathBuf {
    let out = dir.path().join(name);
    sep()
        .arg("craft")
        .arg("--out")
        .arg(&out)
        .args(args)
        .assert()
        .success();
    out
}

fn decide(config: &Path, frames: &[&Path]) -> assert_cmd::assert::Assert {
    sep().arg("decide").arg("--config").arg(config).args(frames).assert()
}

#[test]
fn help_lists_commands() {
    sep()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("craft"))
        .stdout(predicate::str::contains("decide"))
        .stdout(predicate::str::contains("xdp"));
}

#[test]
fn single_backend_is_transmitted() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let frame = craft(&dir, "ok.bin", &[]);

    decide(&config, &[&frame])
        .success()
        .stdout(predicate::str::contains("TRANSMIT backend 10.0.1.1 (index 0"))
        .stdout(predicate::str::contains("via ifindex 4"))
        .stdout(predicate::str::contains(
            "directive: 192.168.1.10:40000 -> 10.0.1.1:80",
        ));
}

#[test]
fn rewritten_frame_is_written_and_keeps_its_length() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let frame = craft(&dir, "ok.bin", &[]);
    let out = dir.path().join("rewritten.bin");

    decide(&config, &[&frame]).success();
    sep()
        .arg("decide")
        .arg("--config")
        .arg(&config)
        .arg("--out")
        .arg(&out)
        .arg(&frame)
        .assert()
        .success();

    let original = std::fs::read(&frame).unwrap();
    let rewritten = std::fs::read(&out).unwrap();
    assert_eq!(original.len(), rewritten.len());
    // Outer MACs swapped.
    assert_eq!(&rewritten[0..6], &original[6..12]);
    assert_eq!(&rewritten[6..12], &original[0..6]);
}

#[test]
fn expired_ttl_is_dropped() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let frame = craft(&dir, "ttl0.bin", &["--ttl", "0"]);

    decide(&config, &[&frame])
        .success()
        .stdout(predicate::str::contains("DROP: outer ttl expired"));
}

#[test]
fn truncated_frame_is_aborted() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let frame = craft(&dir, "short.bin", &["--truncate", "20"]);

    decide(&config, &[&frame])
        .success()
        .stdout(predicate::str::contains("ABORT: truncated packet"));
}

#[test]
fn unknown_destination_is_aborted() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let frame = craft(&dir, "miss.bin", &["--dst", "10.0.0.99:80"]);

    decide(&config, &[&frame])
        .success()
        .stdout(predicate::str::contains(
            "ABORT: no scaled endpoint configuration",
        ));
}

#[test]
fn empty_endpoint_is_dropped_and_summarized() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let ok = craft(&dir, "ok.bin", &[]);
    let empty = craft(&dir, "empty.bin", &["--dst", "10.0.0.4:80"]);

    decide(&config, &[&ok, &empty])
        .success()
        .stdout(predicate::str::contains("DROP: no backend attached"))
        .stdout(predicate::str::contains("Summary"));
}

#[test]
fn out_requires_a_single_frame() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let a = craft(&dir, "a.bin", &[]);
    let b = craft(&dir, "b.bin", &[]);

    sep()
        .arg("decide")
        .arg("--config")
        .arg(&config)
        .arg("--out")
        .arg(dir.path().join("x.bin"))
        .arg(&a)
        .arg(&b)
        .assert()
        .failure()
        .stderr(predicate::str::contains("exactly one input frame"));
}

#[test]
fn craft_rejects_bad_protocol() {
    let dir = TempDir::new().unwrap();
    sep()
        .arg("craft")
        .arg("--out")
        .arg(dir.path().join("bad.bin"))
        .args(["--proto", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown protocol"));
}

//! End-to-end runs of the `cpk` binary on fixture trees.

mod util;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

/// `cpk` rooted in `dir`, with no ambient config leaking in
fn cpk(dir: &std::path::Path) -> Command
{
    let mut cmd = Command::cargo_bin("cpk").expect("bin");
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("CLASSPACK__LLM__API_KEY")
        .env_remove("CLASSPACK__LLM__BACKEND")
        .arg("--quiet")
        .arg("--no-color");
    cmd
}

#[test]
fn simple_context_has_only_the_root()
{
    let tmp = util::make_java_fixture();

    cpk(tmp.path())
        .args(["context", "com.app.Main", "--source", "src"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("// Class: com.app.Main\npackage com.app;"))
        .stdout(predicate::str::contains("// Class: com.app.BaseActivity").not());
}

#[test]
fn hierarchy_context_orders_superclass_before_references()
{
    let tmp = util::make_java_fixture();

    let out = cpk(tmp.path())
        .args(["context", "com.app.Main", "--source", "src", "--hierarchy"])
        .output()
        .expect("run");
    assert!(out.status.success());

    let stdout = String::from_utf8_lossy(&out.stdout);
    let headers: Vec<&str> = stdout
        .lines()
        .filter(|l| l.starts_with("// Class: "))
        .collect();
    assert_eq!(
        headers,
        vec![
            "// Class: com.app.Main",
            "// Class: com.app.BaseActivity",
            "// Class: com.app.net.Client"
        ]
    );
}

#[test]
fn json_output_lists_segments()
{
    let tmp = util::make_java_fixture();

    let out = cpk(tmp.path())
        .args(["context", "com.app.Main", "--source", "src", "--hierarchy", "--json"])
        .output()
        .expect("run");
    assert!(out.status.success());

    let v: Value = serde_json::from_slice(&out.stdout).expect("valid json");
    let units: Vec<&str> = v["segments"]
        .as_array()
        .expect("segments")
        .iter()
        .map(|s| s["unit"].as_str().unwrap())
        .collect();
    assert_eq!(units, vec!["com.app.Main", "com.app.BaseActivity", "com.app.net.Client"]);
    assert_eq!(v["mode"], "hierarchy");
    assert_eq!(v["truncated"], false);
}

#[test]
fn method_context_prints_only_the_method()
{
    let tmp = util::make_java_fixture();

    cpk(tmp.path())
        .args(["context", "com.app.Main#run", "--source", "src"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Method code:\n/** entry point */\npublic void run() {"))
        .stdout(predicate::str::contains("client.send(\"hello\");"))
        .stdout(predicate::str::contains("private Client client;").not());
}

#[test]
fn unknown_class_fails_cleanly()
{
    let tmp = util::make_java_fixture();

    cpk(tmp.path())
        .args(["context", "com.app.Nope", "--source", "src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown code unit: com.app.Nope"));
}

#[test]
fn refs_and_usages()
{
    let tmp = util::make_java_fixture();

    cpk(tmp.path())
        .args(["refs", "com.app.Main", "--source", "src"])
        .assert()
        .success()
        .stdout("com.app.net.Client\n");

    cpk(tmp.path())
        .args(["refs", "com.app.net.Client", "--usages", "--source", "src"])
        .assert()
        .success()
        .stdout("com.app.Main\n");

    cpk(tmp.path())
        .args(["refs", "--dot", "--source", "src"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph"));
}

#[test]
fn chunk_writes_numbered_files()
{
    let tmp = util::make_java_fixture();

    cpk(tmp.path())
        .args([
            "chunk",
            "com.app.Main",
            "--source",
            "src",
            "--hierarchy",
            "--max-tokens",
            "20",
            "-o",
            "out",
        ])
        .assert()
        .success();

    tmp.child("out/chunk_001.txt")
        .assert(predicate::str::starts_with("// Class: com.app.Main"));
    tmp.child("out/chunk_002.txt")
        .assert(predicate::path::exists());
}

#[test]
fn dry_run_analyze_never_contacts_a_backend()
{
    let tmp = util::make_java_fixture();

    cpk(tmp.path())
        .args(["--dry-run", "analyze", "com.app.Main", "--source", "src", "--hierarchy", "--ask", "why?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(dry run) would send"))
        .stdout(predicate::str::contains("Q: why?"));
}

#[test]
fn analyze_without_credentials_reports_configuration()
{
    let tmp = util::make_java_fixture();

    cpk(tmp.path())
        .args(["analyze", "com.app.Main", "--source", "src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}

#[test]
fn jsonl_roster_is_accepted()
{
    let tmp = assert_fs::TempDir::new().unwrap();
    tmp.child("roster.jsonl")
        .write_str(concat!(
            "{\"name\":\"a.A\",\"source\":\"class A {}\"}\n",
            "{\"name\":\"a.B\",\"source\":\"class B { a.A x; }\"}\n",
        ))
        .unwrap();

    cpk(tmp.path())
        .args(["refs", "a.A", "--usages", "--source", "roster.jsonl"])
        .assert()
        .success()
        .stdout("a.B\n");
}

#[test]
fn init_writes_config_once()
{
    let tmp = assert_fs::TempDir::new().unwrap();

    cpk(tmp.path())
        .arg("init")
        .assert()
        .success();
    tmp.child("classpack.toml")
        .assert(predicate::str::contains("max_tokens = 8000"));

    cpk(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    cpk(tmp.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn config_file_overrides_defaults()
{
    let tmp = util::make_java_fixture();
    tmp.child("classpack.toml")
        .write_str("[analysis]\npackage_blacklist = \"com.app.net.*\"\n")
        .unwrap();

    cpk(tmp.path())
        .args(["context", "com.app.Main", "--source", "src", "--hierarchy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("// Class: com.app.BaseActivity"))
        .stdout(predicate::str::contains("// Class: com.app.net.Client").not());
}

#[test]
fn completions_to_stdout()
{
    let tmp = assert_fs::TempDir::new().unwrap();

    cpk(tmp.path())
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cpk"));
}

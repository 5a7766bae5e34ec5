//! Shared fixtures for integration tests

#![allow(dead_code)]

use assert_fs::prelude::*;
use classpack::core::{CodeUnit, Roster};

/// Join source lines with '\n' and a trailing newline
fn java(lines: &[&str]) -> String
{
    let mut s = lines.join("\n");
    s.push('\n');
    s
}

/// A small decompiled-app tree under `src/`:
///
/// - `com.app.Main` extends `BaseActivity` (same package, no import)
/// - `com.app.Main` imports and references `com.app.net.Client`
/// - `com.app.util.Strings` is unrelated
pub fn make_java_fixture() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("src/com/app/Main.java")
        .write_str(&java(&[
            "package com.app;",
            "",
            "import com.app.net.Client;",
            "",
            "public class Main extends BaseActivity implements Runnable {",
            "    private Client client;",
            "",
            "    /** entry point */",
            "    public void run() {",
            "        client.send(\"hello\");",
            "    }",
            "}",
        ]))
        .expect("write Main.java");

    tmp.child("src/com/app/BaseActivity.java")
        .write_str(&java(&[
            "package com.app;",
            "",
            "public abstract class BaseActivity {",
            "    protected void onCreate() {}",
            "}",
        ]))
        .expect("write BaseActivity.java");

    tmp.child("src/com/app/net/Client.java")
        .write_str(&java(&[
            "package com.app.net;",
            "",
            "public class Client {",
            "    public void send(String msg) {}",
            "}",
        ]))
        .expect("write Client.java");

    tmp.child("src/com/app/util/Strings.java")
        .write_str(&java(&["package com.app.util;", "", "public final class Strings {}"]))
        .expect("write Strings.java");

    tmp
}

/// Every unit references the other two: A <-> B, B <-> C, C <-> A
pub fn cyclic_roster() -> Roster
{
    Roster::new(vec![
        CodeUnit::new("cyc.A", "class A { cyc.B b; cyc.C c; }"),
        CodeUnit::new("cyc.B", "class B { cyc.A a; cyc.C c; }"),
        CodeUnit::new("cyc.C", "class C { cyc.A a; cyc.B b; }"),
    ])
}

//! Shared fixtures for the integration tests
//!
//! Builds are run against shell-script stand-ins for `javac` and `jar`, so the tests need no
//! JDK. The scripts only exist on unix.

#![allow(dead_code)]

use camino::Utf8PathBuf;
use modide::{BuildConfiguration, IdeSettings, ModuleType, ProjectDescriptor};
use std::fs;
use std::sync::OnceLock;
use tempfile::TempDir;

/// `javac` stand-in.
///
/// - `-version` prints a version line
/// - a source containing `SYNTAX_ERROR` yields a javac-style error and exit code 1
/// - a source containing `SLOW` makes the compiler hang
/// - every other source produces an empty `<out>/<package dirs>/<Name>.class`
///
/// Each compile appends its arguments to `<out>/../javac-invocations.log`.
const FAKE_JAVAC: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "javac 17.0.2"
    exit 0
fi

out=""
list=$(mktemp)
while [ $# -gt 0 ]; do
    case "$1" in
        -d) out="$2"; shift 2 ;;
        -cp|-classpath|-encoding) shift 2 ;;
        @*)
            while IFS= read -r line; do
                line=${line#\"}
                line=${line%\"}
                echo "$line" >> "$list"
            done < "${1#@}"
            shift ;;
        *) echo "$1" >> "$list"; shift ;;
    esac
done

mkdir -p "$out"
cat "$list" >> "$out/../javac-invocations.log"

status=0
while IFS= read -r f; do
    [ -z "$f" ] && continue
    if grep -q SLOW "$f"; then
        rm -f "$list"
        exec sleep 30
    fi
    if grep -q SYNTAX_ERROR "$f"; then
        echo "$f:1: error: ';' expected" >&2
        echo "SYNTAX_ERROR" >&2
        echo "            ^" >&2
        status=1
        continue
    fi
    pkg=$(sed -n 's/^package \([A-Za-z0-9_.]*\);.*/\1/p' "$f" | head -n 1)
    name=$(basename "$f" .java)
    dir="$out/$(echo "$pkg" | tr . /)"
    mkdir -p "$dir"
    : > "$dir/$name.class"
done < "$list"
rm -f "$list"

if [ $status -ne 0 ]; then
    echo "1 error" >&2
fi
exit $status
"#;

/// `jar` stand-in: `jar cfm <archive> <manifest> -C <dir> . ...` writes the manifest followed
/// by the listed files into `<archive>`.
const FAKE_JAR: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
    echo "jar 17.0.2"
    exit 0
fi

archive="$2"
manifest="$3"
shift 3
{
    cat "$manifest"
    while [ $# -gt 0 ]; do
        if [ "$1" = "-C" ]; then
            (cd "$2" && find . -type f | sort)
            shift 3
        else
            shift
        fi
    done
} > "$archive"
echo "added manifest"
"#;

static TOOL_HOME: OnceLock<TempDir> = OnceLock::new();

/// A JDK-like directory with `bin/javac` and `bin/jar`, created once per test binary
#[cfg(unix)]
pub fn tool_home() -> Utf8PathBuf {
    let home = TOOL_HOME.get_or_init(|| {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        for (name, script) in [("javac", FAKE_JAVAC), ("jar", FAKE_JAR)] {
            let path = bin.join(name);
            fs::write(&path, script).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    });
    utf8(home.path())
}

pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::try_from(path.to_path_buf()).unwrap()
}

/// Settings pointing at the fake tools, with short timeouts
#[cfg(unix)]
pub fn settings() -> IdeSettings {
    IdeSettings {
        tool_home: Some(tool_home()),
        probe_timeout_secs: 5,
        compile_timeout_secs: 20,
        archive_timeout_secs: 20,
        cancel_grace_ms: 500,
        ..IdeSettings::default()
    }
}

/// A mod project on disk using the standard template layout
pub struct TestProject {
    pub dir: TempDir,
    pub root: Utf8PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = utf8(dir.path()).join("CoolMod");
        fs::create_dir_all(root.join("src/main/java")).unwrap();
        Self { dir, root }
    }

    pub fn source_root(&self) -> Utf8PathBuf {
        self.root.join("src/main/java")
    }

    /// Write `<source root>/<relative>` and return its path
    pub fn write_source(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.source_root().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn with_main_class(self) -> Self {
        self.write_source(
            "com/example/coolmod/CoolMod.java",
            "package com.example.coolmod;\n\npublic class CoolMod {\n    public static void main(String[] args) {}\n}\n",
        );
        self
    }

    pub fn descriptor(&self) -> ProjectDescriptor {
        ProjectDescriptor::new(self.root.clone(), "com.example.coolmod", ModuleType::Basic)
    }

    pub fn config(&self) -> BuildConfiguration {
        BuildConfiguration::for_project(&self.descriptor())
    }

    pub fn compiler_log(&self) -> Utf8PathBuf {
        self.root.join("build/javac-invocations.log")
    }

    pub fn path(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }
}

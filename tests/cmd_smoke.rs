//! End-to-end runs of the `cdg` binary against a temp project.

use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;

mod util;
use util::{make_py_project, write};

fn cdg(dir: &std::path::Path) -> Command
{
    let mut cmd = Command::cargo_bin("cdg").expect("bin");
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .arg("--no-color");
    cmd
}

#[test]
fn diff_before_any_scan_fails()
{
    let tmp = make_py_project();

    cdg(tmp.path())
        .arg("diff")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No scan history"));
}

#[test]
fn init_writes_config_and_gitignore()
{
    let tmp = make_py_project();

    cdg(tmp.path())
        .arg("init")
        .assert()
        .success();

    tmp.child(".codigest/config.toml")
        .assert(predicate::str::contains("[filter]"));
    tmp.child(".gitignore")
        .assert(predicate::str::contains(".codigest/"));

    cdg(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn scan_then_diff_and_semdiff()
{
    let tmp = make_py_project();

    cdg(tmp.path())
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("Files:   5"));

    cdg(tmp.path())
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));

    write(&tmp, "utils/helpers.py", "def answer(base):\n    return base\n");

    cdg(tmp.path())
        .args(["diff", "--save"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+def answer(base):"));
    tmp.child(".codigest/changes.diff")
        .assert(predicate::str::contains("--- a/utils/helpers.py"));

    cdg(tmp.path())
        .arg("semdiff")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "[MODIFIED] function answer(base) :: () -> (base)",
        ));

    cdg(tmp.path())
        .arg("scan")
        .assert()
        .success();
    tmp.child(".codigest/previous_changes.diff")
        .assert(predicate::str::contains("+    return base"));
}

#[test]
fn tree_lists_only_tracked_files()
{
    let tmp = make_py_project();

    cdg(tmp.path())
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("helpers.py:2"))
        .stdout(predicate::str::contains("out.py").not());
}

#[test]
fn tree_is_limited_to_its_path()
{
    let tmp = make_py_project();

    cdg(tmp.path())
        .args(["tree", "utils"])
        .assert()
        .success()
        .stdout(predicate::str::contains("helpers.py:2"))
        .stdout(predicate::str::contains("app.py").not())
        .stdout(predicate::str::contains("service.py").not());
}

#[test]
fn completions_to_stdout()
{
    let tmp = make_py_project();

    cdg(tmp.path())
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cdg"));
}

//! Shared test utilities for integration tests
//!
//! Provides a small Python project fixture and helpers used
//! across multiple test files.

#![allow(dead_code)]

use assert_fs::prelude::*;

/// A project with a `.git` marker, an import chain, a package,
/// ignored directories and a non-Python file.
///
/// Layout:
///   app.py            imports service
///   service.py        from utils import helpers
///   utils/__init__.py
///   utils/helpers.py
///   README.md
///   build/out.py      (ignored by default)
///   .venv/lib.py      (ignored by default)
pub fn make_py_project() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child(".git")
        .create_dir_all()
        .expect("git marker");

    let files = [
        ("app.py", "import service\n\ndef main():\n    return service.run()\n"),
        (
            "service.py",
            "from utils import helpers\n\ndef run():\n    return helpers.answer()\n",
        ),
        ("utils/__init__.py", ""),
        ("utils/helpers.py", "def answer():\n    return 42\n"),
        ("README.md", "# Fixture\n"),
        ("build/out.py", "x = 1\n"),
        (".venv/lib.py", "y = 2\n"),
    ];

    for (rel, body) in files
    {
        tmp.child(rel)
            .write_str(body)
            .expect("write fixture file");
    }

    tmp
}

/// Overwrite (or create) a file under the fixture root.
pub fn write(
    tmp: &assert_fs::TempDir,
    rel: &str,
    body: &str,
)
{
    tmp.child(rel)
        .write_str(body)
        .expect("write");
}

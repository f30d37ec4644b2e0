//! Local-import dependency expansion.
//!
//! Starting from a seed file set, parse every Python file for static
//! imports, map each reference to a file on disk, and keep going until
//! no new file turns up. Parsing runs in parallel per wave of newly
//! found files; resolution is sequential so the cache and visited set
//! stay deterministic.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::{
    core::symbols::{ImportRef, has_grammar},
    infra::{
        io::read_source,
        paths::{PathRecord, canonical},
    },
    parsers::PythonExtractor,
};

/// Top-level names of the Python standard library. References whose
/// first segment is listed here are never probed on disk.
pub const PY_STDLIB: &[&str] = &[
    "__future__", "_thread", "abc", "aifc", "argparse", "array", "ast", "asynchat",
    "asyncio", "asyncore", "atexit", "audioop", "base64", "bdb", "binascii", "bisect",
    "builtins", "bz2", "calendar", "cgi", "cgitb", "chunk", "cmath", "cmd", "code",
    "codecs", "codeop", "collections", "colorsys", "compileall", "concurrent",
    "configparser", "contextlib", "contextvars", "copy", "copyreg", "cProfile", "crypt",
    "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm", "decimal", "difflib",
    "dis", "doctest", "email", "encodings", "ensurepip", "enum", "errno", "faulthandler",
    "fcntl", "filecmp", "fileinput", "fnmatch", "fractions", "ftplib", "functools", "gc",
    "getopt", "getpass", "gettext", "glob", "graphlib", "grp", "gzip", "hashlib", "heapq",
    "hmac", "html", "http", "imaplib", "imghdr", "imp", "importlib", "inspect", "io",
    "ipaddress", "itertools", "json", "keyword", "lib2to3", "linecache", "locale",
    "logging", "lzma", "mailbox", "mailcap", "marshal", "math", "mimetypes", "mmap",
    "modulefinder", "msvcrt", "multiprocessing", "netrc", "nntplib", "numbers",
    "operator", "optparse", "os", "pathlib", "pdb", "pickle", "pickletools", "pipes",
    "pkgutil", "platform", "plistlib", "poplib", "posix", "pprint", "profile", "pstats",
    "pty", "pwd", "py_compile", "pyclbr", "pydoc", "queue", "quopri", "random", "re",
    "readline", "reprlib", "resource", "rlcompleter", "runpy", "sched", "secrets",
    "select", "selectors", "shelve", "shlex", "shutil", "signal", "site", "smtplib",
    "sndhdr", "socket", "socketserver", "sqlite3", "ssl", "stat", "statistics", "string",
    "stringprep", "struct", "subprocess", "sunau", "symtable", "sys", "sysconfig",
    "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios", "textwrap",
    "threading", "time", "timeit", "tkinter", "token", "tokenize", "tomllib", "trace",
    "traceback", "tracemalloc", "tty", "turtle", "types", "typing", "unicodedata",
    "unittest", "urllib", "uu", "uuid", "venv", "warnings", "wave", "weakref",
    "webbrowser", "winreg", "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp",
    "zipfile", "zipimport", "zlib", "zoneinfo",
];

/// Worklist resolver over one project root.
///
/// The reference cache and the stdlib set belong to the instance, so
/// two resolvers over different roots never share answers.
pub struct DependencyResolver {
    root: PathBuf,
    extractor: PythonExtractor,
    /// Absolute references only; relative ones depend on the importer
    cache: HashMap<String, Option<PathBuf>>,
    stdlib: HashSet<&'static str>,
}

impl DependencyResolver {
    pub fn new(root: &Path) -> Result<Self> {
        Ok(Self {
            root: canonical(root),
            extractor: PythonExtractor::new()?,
            cache: HashMap::new(),
            stdlib: PY_STDLIB.iter().copied().collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Grow `seeds` along import edges until fixpoint. The result is a
    /// sorted superset of the input.
    #[instrument(skip_all, fields(seeds = seeds.len()))]
    pub fn expand(&mut self, seeds: &[PathRecord]) -> Vec<PathRecord> {
        let mut visited: HashSet<PathBuf> = HashSet::with_capacity(seeds.len());
        let mut out: Vec<PathRecord> = Vec::with_capacity(seeds.len());

        for rec in seeds {
            if visited.insert(canonical(&rec.abs)) {
                out.push(rec.clone());
            }
        }

        let mut wave: Vec<PathBuf> = visited.iter().cloned().collect();
        let mut rounds = 0usize;

        while !wave.is_empty() {
            rounds += 1;
            wave.sort();

            let parsed: Vec<(PathBuf, Vec<ImportRef>)> = wave
                .par_iter()
                .filter(|p| has_grammar(p))
                .map(|p| (p.clone(), self.references(p)))
                .collect();

            let mut next = Vec::new();
            for (file, refs) in parsed {
                for import in &refs {
                    let Some(hit) = self.resolve(&file, import) else {
                        continue;
                    };
                    if visited.insert(hit.clone()) {
                        debug!(from = %file.display(), to = %hit.display(), "resolved import");
                        out.push(PathRecord::new(&self.root, hit.clone()));
                        next.push(hit);
                    }
                }
            }
            wave = next;
        }

        out.sort();
        debug!(files = out.len(), rounds, "dependency expansion finished");
        out
    }

    /// Imports of one file; unreadable or unparsable files have none.
    fn references(&self, file: &Path) -> Vec<ImportRef> {
        let parsed = read_source(file).and_then(|src| self.extractor.imports(&src));
        match parsed {
            Ok(refs) => refs,
            Err(err) => {
                debug!(file = %file.display(), %err, "skipping file without parsable imports");
                Vec::new()
            }
        }
    }

    /// Physical file for `import` as seen from `from`.
    pub fn resolve(&mut self, from: &Path, import: &ImportRef) -> Option<PathBuf> {
        if import.level > 0 {
            return self.resolve_relative(from, import);
        }

        let top = import.module.split('.').next().unwrap_or_default();
        if self.stdlib.contains(top) {
            return None;
        }

        if let Some(hit) = self.cache.get(&import.module) {
            return hit.clone();
        }

        let hit = self.resolve_absolute(from, &import.module);
        self.cache.insert(import.module.clone(), hit.clone());
        hit
    }

    fn resolve_relative(&self, from: &Path, import: &ImportRef) -> Option<PathBuf> {
        let mut dir = from.parent()?;
        for _ in 1..import.level {
            dir = dir.parent()?;
        }
        probe(&dir.join(module_path(&import.module)))
    }

    fn resolve_absolute(&self, from: &Path, module: &str) -> Option<PathBuf> {
        let rel = module_path(module);
        let src = self.root.join("src");

        from.parent()
            .into_iter()
            .chain([self.root.as_path(), src.as_path()])
            .find_map(|base| probe(&base.join(&rel)))
    }
}

/// `a.b.c` as `a/b/c`.
fn module_path(module: &str) -> PathBuf {
    module.split('.').filter(|s| !s.is_empty()).collect()
}

/// `<base>.py`, then `<base>/__init__.py`.
fn probe(base: &Path) -> Option<PathBuf> {
    let module_file = base.with_extension("py");
    if base.file_name().is_some() && module_file.is_file() {
        return Some(canonical(&module_file));
    }
    let package = base.join("__init__.py");
    package.is_file().then(|| canonical(&package))
}

/// One-shot expansion with a fresh resolver.
pub fn resolve_dependencies(root: &Path, files: &[PathRecord]) -> Result<Vec<PathRecord>> {
    Ok(DependencyResolver::new(root)?.expand(files))
}

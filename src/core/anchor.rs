//! Baseline store: a content-addressed snapshot of the last accepted
//! file set, kept under `<root>/.codigest/`.
//!
//! Layout:
//!   anchor/<rel>                         working copy of the last commit
//!   anchor_store/objects/ab/cdef...      blake3-addressed blobs
//!   anchor_store/commits/<id>.json       tree manifests, linked by parent
//!   anchor_store/HEAD                    id of the latest commit
//!   anchor_store/lock                    advisory lock (fd-lock)
//!
//! The working copy holds nothing but project files, so any relative
//! path (including one named like a store directory) round-trips.
//!
//! `commit` takes the lock exclusively; `diff` and `read_committed` take
//! it shared, so a diff never observes a half-written commit. Every diff
//! materializes its two snapshots in its own temp dir, removed on drop.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::{debug, info, instrument, warn};

use crate::infra::{
    config::ARTIFACT_DIR_NAME,
    paths::{PathRecord, canonical, normalize_rel},
};

/// Anchor directory name inside the artifact area.
pub const ANCHOR_DIR: &str = "anchor";

/// Store metadata directory, a sibling of the working copy.
const STORE_DIR: &str = "anchor_store";

/// One point in the linear baseline history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub id: String,
    pub parent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// rel path -> blob hash
    pub tree: BTreeMap<String, String>,
}

/// What a commit attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New commit with this id
    Created(String),
    /// Tree identical to HEAD; nothing written
    Unchanged,
    /// Backend failure, logged and swallowed
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Removed,
    Modified,
}

/// Text-level change for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub path: String,
    pub status: ChangeStatus,
    /// Git-style unified patch, including its `diff --git` header
    pub patch: String,
}

/// Handle on the baseline of one project root.
#[derive(Debug, Clone)]
pub struct ContextAnchor {
    root: PathBuf,
    artifact_dir: PathBuf,
    anchor_dir: PathBuf,
    store_dir: PathBuf,
}

impl ContextAnchor {
    pub fn new(root: &Path) -> Self {
        let root = canonical(root);
        let artifact_dir = root.join(ARTIFACT_DIR_NAME);
        let anchor_dir = artifact_dir.join(ANCHOR_DIR);
        let store_dir = artifact_dir.join(STORE_DIR);
        Self {
            root,
            artifact_dir,
            anchor_dir,
            store_dir,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn anchor_dir(&self) -> &Path {
        &self.anchor_dir
    }

    pub fn has_history(&self) -> bool {
        self.head_id().ok().flatten().is_some()
    }

    pub fn last_commit_time(&self) -> Option<DateTime<Utc>> {
        match self.head() {
            Ok(head) => head.map(|c| c.timestamp),
            Err(err) => {
                warn!(%err, "unreadable baseline head");
                None
            }
        }
    }

    /// "never", or the age of the last commit ("5 minutes ago").
    pub fn last_update_label(&self) -> String {
        match self.last_commit_time() {
            Some(ts) => relative_age(Utc::now().signed_duration_since(ts).num_seconds()),
            None => "never".to_string(),
        }
    }

    /// Commits newest first.
    pub fn history(&self) -> Result<Vec<Commit>> {
        let mut out = Vec::new();
        let mut next = self.head_id()?;
        while let Some(id) = next {
            let commit = self.load_commit(&id)?;
            next = commit.parent.clone();
            out.push(commit);
        }
        Ok(out)
    }

    /// Commit that logs and degrades to `Skipped` on failure.
    pub fn commit(&self, files: &[PathRecord]) -> CommitOutcome {
        let message = format!("Snapshot: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        match self.try_commit(files, &message) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "baseline commit failed");
                CommitOutcome::Skipped
            }
        }
    }

    /// Replace the working copy with `files` and record a commit if the
    /// resulting tree differs from HEAD.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub fn try_commit(&self, files: &[PathRecord], message: &str) -> Result<CommitOutcome> {
        self.ensure_layout()?;
        let mut lock = self.open_lock()?;
        let _guard = lock.write().context("Failed to lock baseline for commit")?;

        self.clear_working_copy()?;
        for rec in files.iter().filter(|r| is_baseline_path(r)) {
            let dst = self.anchor_dir.join(&rec.rel);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            if let Err(err) = fs::copy(&rec.abs, &dst) {
                warn!(path = %rec.rel, %err, "skipping unreadable file");
            }
        }

        let tree = self.stage()?;
        let head = self.head()?;
        if head.as_ref().is_some_and(|h| h.tree == tree) {
            debug!("tree unchanged; no commit");
            return Ok(CommitOutcome::Unchanged);
        }

        let parent = head.map(|h| h.id);
        let commit = Commit {
            id: commit_id(parent.as_deref(), &tree)?,
            parent,
            timestamp: Utc::now(),
            message: message.to_string(),
            tree,
        };

        let json = serde_json::to_vec_pretty(&commit).context("serialize commit")?;
        write_atomic(&self.commit_path(&commit.id), &json)?;
        write_atomic(&self.store_dir.join("HEAD"), commit.id.as_bytes())?;

        info!(id = %commit.id, files = commit.tree.len(), "baseline committed");
        Ok(CommitOutcome::Created(commit.id))
    }

    /// Unified diff that degrades to "" (as if there were no history).
    pub fn diff(&self, files: &[PathRecord]) -> String {
        match self.try_diff(files) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "baseline diff failed");
                String::new()
            }
        }
    }

    pub fn try_diff(&self, files: &[PathRecord]) -> Result<String> {
        Ok(self
            .diff_records(files)?
            .into_iter()
            .map(|r| r.patch)
            .collect())
    }

    /// Live selection vs. the last commit, one record per changed path in
    /// path order. Committed paths that fell out of the selection but still
    /// exist on disk are not reported.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub fn diff_records(&self, files: &[PathRecord]) -> Result<Vec<ChangeRecord>> {
        let lock = match self.open_existing_lock()? {
            Some(l) => l,
            None => return Ok(Vec::new()),
        };
        let _guard = lock.read().context("Failed to lock baseline for diff")?;

        let Some(head) = self.head()? else {
            return Ok(Vec::new());
        };

        let scratch = tempfile::Builder::new()
            .prefix("diff-")
            .tempdir_in(&self.artifact_dir)
            .context("Failed to create diff scratch dir")?;
        let base_dir = scratch.path().join("base");
        let live_dir = scratch.path().join("live");
        fs::create_dir_all(&base_dir)?;
        fs::create_dir_all(&live_dir)?;

        let mut selection = BTreeSet::new();
        let mut unreadable = BTreeSet::new();
        for rec in files.iter().filter(|r| is_baseline_path(r)) {
            selection.insert(rec.rel.as_str());
            if !rec.abs.is_file() {
                continue;
            }
            let dst = live_dir.join(&rec.rel);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            if let Err(err) = fs::copy(&rec.abs, &dst) {
                // A file we cannot read is left out of both sides rather
                // than reported as removed.
                warn!(path = %rec.rel, %err, "skipping unreadable file");
                let _ = fs::remove_file(&dst);
                unreadable.insert(rec.rel.as_str());
            }
        }

        for (rel, hash) in &head.tree {
            if unreadable.contains(rel.as_str()) {
                continue;
            }
            if !selection.contains(rel.as_str()) && self.root.join(rel).exists() {
                debug!(path = %rel, "out of scope; pruned from baseline side");
                continue;
            }
            let dst = base_dir.join(rel);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dst, self.read_blob(hash)?)
                .with_context(|| format!("Failed to extract {rel}"))?;
        }

        let base = snapshot_files(&base_dir);
        let live = snapshot_files(&live_dir);
        let paths: BTreeSet<&String> = base.keys().chain(live.keys()).collect();

        let mut out = Vec::new();
        for rel in paths {
            let old = base.get(rel).map(fs::read).transpose()?;
            let new = live.get(rel).map(fs::read).transpose()?;
            if let Some(record) = change_record(rel, old.as_deref(), new.as_deref()) {
                out.push(record);
            }
        }

        debug!(changes = out.len(), "baseline diff finished");
        Ok(out)
    }

    /// Changed paths (including deletions) as root records.
    pub fn changed_files(&self, files: &[PathRecord]) -> Result<Vec<PathRecord>> {
        Ok(self
            .diff_records(files)?
            .into_iter()
            .map(|r| PathRecord::new(&self.root, self.root.join(&r.path)))
            .collect())
    }

    /// Content of `rel` as of the last commit; "" when absent.
    pub fn read_committed(&self, rel: &str) -> String {
        match self.try_read_committed(rel) {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(None) => String::new(),
            Err(err) => {
                debug!(path = rel, %err, "committed content unavailable");
                String::new()
            }
        }
    }

    fn try_read_committed(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        let Some(lock) = self.open_existing_lock()? else {
            return Ok(None);
        };
        let _guard = lock.read().context("Failed to lock baseline for read")?;

        let Some(head) = self.head()? else {
            return Ok(None);
        };
        match head.tree.get(rel) {
            Some(hash) => Ok(Some(self.read_blob(hash)?)),
            None => Ok(None),
        }
    }

    fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.anchor_dir.clone(),
            self.store_dir.join("objects"),
            self.store_dir.join("commits"),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    fn open_lock(&self) -> Result<RwLock<File>> {
        let path = self.store_dir.join("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock {}", path.display()))?;
        Ok(RwLock::new(file))
    }

    /// Shared-lock handle, or None before the first commit.
    fn open_existing_lock(&self) -> Result<Option<RwLock<File>>> {
        if !self.store_dir.is_dir() {
            return Ok(None);
        }
        self.open_lock().map(Some)
    }

    fn head_id(&self) -> Result<Option<String>> {
        let path = self.store_dir.join("HEAD");
        if !path.exists() {
            return Ok(None);
        }
        let id = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let id = id.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }

    fn head(&self) -> Result<Option<Commit>> {
        match self.head_id()? {
            Some(id) => self.load_commit(&id).map(Some),
            None => Ok(None),
        }
    }

    fn commit_path(&self, id: &str) -> PathBuf {
        self.store_dir.join("commits").join(format!("{id}.json"))
    }

    fn load_commit(&self, id: &str) -> Result<Commit> {
        let path = self.commit_path(id);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read commit {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Corrupt commit {id}"))
    }

    fn object_path(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() < 3 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("Invalid object hash: {hash}");
        }
        let (fan, rest) = hash.split_at(2);
        Ok(self.store_dir.join("objects").join(fan).join(rest))
    }

    fn read_blob(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.object_path(hash)?;
        fs::read(&path).with_context(|| format!("Missing object {hash}"))
    }

    fn store_blob(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let hash = blake3::hash(&bytes).to_hex().to_string();
        let dst = self.object_path(&hash)?;
        if !dst.exists() {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            write_atomic(&dst, &bytes)?;
        }
        Ok(hash)
    }

    fn clear_working_copy(&self) -> Result<()> {
        for entry in fs::read_dir(&self.anchor_dir)? {
            let entry = entry?;
            let path = entry.path();
            let res = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            res.with_context(|| format!("Failed to clear {}", path.display()))?;
        }
        Ok(())
    }

    /// Hash the working copy into a tree.
    fn stage(&self) -> Result<BTreeMap<String, String>> {
        let mut tree = BTreeMap::new();
        for (rel, path) in snapshot_files(&self.anchor_dir) {
            let hash = self.store_blob(&path)?;
            tree.insert(rel, hash);
        }
        Ok(tree)
    }
}

/// In-root, and not version-control or artifact metadata.
fn is_baseline_path(rec: &PathRecord) -> bool {
    !rec.external
        && !rec.rel.is_empty()
        && !rec.rel.split('/').any(|c| c == ".git" || c == "..")
        && !rec.rel.starts_with(&format!("{ARTIFACT_DIR_NAME}/"))
}

/// Files under `dir` keyed by `/`-separated relative path.
fn snapshot_files(dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut out = BTreeMap::new();
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .hidden(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(%err, "skipping unreadable snapshot entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(dir) {
            out.insert(normalize_rel(rel), entry.path().to_path_buf());
        }
    }
    out
}

/// First 16 hex chars of blake3 over (parent, tree).
fn commit_id(parent: Option<&str>, tree: &BTreeMap<String, String>) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(parent.unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(&serde_json::to_vec(tree).context("serialize tree")?);
    let hex = hasher.finalize().to_hex();
    Ok(hex.as_str()[..16].to_string())
}

/// Git-style patch for one path, or None when both sides match.
fn change_record(rel: &str, old: Option<&[u8]>, new: Option<&[u8]>) -> Option<ChangeRecord> {
    let status = match (old, new) {
        (None, None) => return None,
        (Some(a), Some(b)) if a == b => return None,
        (None, Some(_)) => ChangeStatus::Added,
        (Some(_), None) => ChangeStatus::Removed,
        (Some(_), Some(_)) => ChangeStatus::Modified,
    };

    let old_label = if old.is_some() { format!("a/{rel}") } else { "/dev/null".to_string() };
    let new_label = if new.is_some() { format!("b/{rel}") } else { "/dev/null".to_string() };

    let mut patch = format!("diff --git a/{rel} b/{rel}\n");
    match status {
        ChangeStatus::Added => patch.push_str("new file mode 100644\n"),
        ChangeStatus::Removed => patch.push_str("deleted file mode 100644\n"),
        ChangeStatus::Modified => {}
    }

    let old_text = std::str::from_utf8(old.unwrap_or_default());
    let new_text = std::str::from_utf8(new.unwrap_or_default());
    match (old_text, new_text) {
        (Ok(a), Ok(b)) => {
            let diff = TextDiff::from_lines(a, b);
            let body = diff
                .unified_diff()
                .context_radius(3)
                .header(&old_label, &new_label)
                .to_string();
            patch.push_str(&body);
        }
        _ => patch.push_str(&format!("Binary files {old_label} and {new_label} differ\n")),
    }

    Some(ChangeRecord {
        path: rel.to_string(),
        status,
        patch,
    })
}

fn relative_age(secs: i64) -> String {
    let plural = |n: i64, unit: &str| {
        if n == 1 { format!("1 {unit} ago") } else { format!("{n} {unit}s ago") }
    };
    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => plural(s / 60, "minute"),
        s if s < 86_400 => plural(s / 3_600, "hour"),
        s => plural(s / 86_400, "day"),
    }
}

/// tmp + fsync + rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).with_context(|| format!("write tmp: {}", tmp.display()))?;
    File::open(&tmp)?.sync_all().ok();
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    if let Some(parent) = path.parent() {
        let _ = sync_dir(parent);
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(p: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let f = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_p: &Path) -> std::io::Result<()> {
    Ok(())
}

//! Content-addressed, append-only object store for committed contracts
//! (spec §4.7, §6.3). Generalizes the teacher's content-hash blob store
//! (`services::archivist`, blake3 CIDs) and parent-linked commit DAG
//! (`memory::dag`) into the two-object-type, two-ref-namespace layout this
//! spec names: `objects/`, `refs/heads/main`, `refs/tags/<tag>`, `log`.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

type Result<T> = std::result::Result<T, GovernanceError>;

fn io_err(context: &str, e: std::io::Error) -> GovernanceError {
    GovernanceError::HistoryIo(format!("{context}: {e}"))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("create_dir_all", e))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|e| io_err("open temp file", e))?;
        f.write_all(bytes).map_err(|e| io_err("write temp file", e))?;
        f.flush().map_err(|e| io_err("flush temp file", e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_err("rename into place", e))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitMeta {
    pub commit_id: String,
    pub dataset: String,
    pub parent: Option<String>,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub refs_by_name: BTreeMap<String, String>,
}

/// A staged-but-not-yet-committed set of named blob refs.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub dataset: String,
    pub message: String,
    pub parent: Option<String>,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub refs_by_name: BTreeMap<String, String>,
}

/// A filesystem-backed, content-addressed object store scoped to one
/// "contracts" repository (spec §4.7). One writer at a time per dataset; any
/// number of concurrent readers.
pub struct HistoryStore {
    root: PathBuf,
    dataset_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    refs_lock: RwLock<()>,
}

impl HistoryStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dataset_locks: Mutex::new(HashMap::new()),
            refs_lock: RwLock::new(()),
        }
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn object_path(&self, id: &str) -> PathBuf {
        self.objects_dir().join(id)
    }

    fn heads_main(&self) -> PathBuf {
        self.root.join("refs").join("heads").join("main")
    }

    fn tag_path(&self, tag: &str) -> PathBuf {
        self.root.join("refs").join("tags").join(tag)
    }

    fn log_path(&self) -> PathBuf {
        self.root.join("log")
    }

    fn dataset_lock(&self, dataset: &str) -> Arc<Mutex<()>> {
        let mut locks = self.dataset_locks.lock().expect("dataset lock table poisoned");
        locks.entry(dataset.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Runs `f` while holding `dataset`'s per-dataset critical section.
    /// Callers that need to read the dataset's history head and act on it
    /// (version assignment, then commit) must do both inside one call to
    /// this, not across two separate lock acquisitions — otherwise another
    /// writer can interleave between the read and the eventual commit
    /// (spec §5, §4.6: version assignment is part of the critical section).
    pub fn with_dataset_lock<T>(&self, dataset: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let dataset_guard = self.dataset_lock(dataset);
        let _dataset_guard = dataset_guard.lock().expect("dataset lock poisoned");
        f()
    }

    /// Stores `bytes`, returning its content id and whether this call wrote
    /// a new object (an identical blob already on disk is a no-op).
    pub fn put(&self, bytes: &[u8]) -> Result<(String, bool)> {
        let id = blake3::hash(bytes).to_hex().to_string();
        let path = self.object_path(&id);
        if path.exists() {
            return Ok((id, false));
        }
        write_atomic(&path, bytes)?;
        Ok((id, true))
    }

    fn read_object(&self, id: &str) -> Result<Vec<u8>> {
        fs::read(self.object_path(id)).map_err(|e| io_err(&format!("read object {id}"), e))
    }

    /// Groups the staged blob refs in `req` into a single commit, appends it
    /// to the log, and advances `refs/heads/main`. Serialized per-dataset via
    /// the keyed lock table (spec §5).
    pub fn commit(&self, req: CommitRequest) -> Result<String> {
        let dataset = req.dataset.clone();
        self.with_dataset_lock(&dataset, move || self.commit_locked(req))
    }

    /// Same as `commit`, but assumes the caller already holds `req.dataset`'s
    /// per-dataset lock (e.g. via `with_dataset_lock`). Calling this without
    /// holding that lock races with concurrent writers to the same dataset.
    pub(crate) fn commit_locked(&self, req: CommitRequest) -> Result<String> {
        for blob_id in req.refs_by_name.values() {
            if !self.object_path(blob_id).exists() {
                return Err(GovernanceError::HistoryIo(format!(
                    "commit references unknown blob {blob_id}"
                )));
            }
        }

        // Conflict detection is per-dataset, not against the repo-wide head,
        // so unrelated datasets keep committing in parallel (spec §5): two
        // datasets racing for the global head would otherwise spuriously
        // conflict with each other.
        let last_for_dataset = self.latest_commit_for_dataset(&req.dataset)?;
        if req.parent != last_for_dataset {
            return Err(GovernanceError::HistoryConflict { dataset: req.dataset.clone(), retries: 0 });
        }

        let meta = CommitMeta {
            commit_id: String::new(),
            dataset: req.dataset.clone(),
            parent: req.parent.clone(),
            author: req.author.clone(),
            timestamp: req.timestamp,
            message: req.message.clone(),
            refs_by_name: req.refs_by_name.clone(),
        };
        let canonical = serde_json::to_vec(&meta).map_err(|e| GovernanceError::HistoryIo(e.to_string()))?;
        let commit_id = blake3::hash(&canonical).to_hex().to_string();
        let meta = CommitMeta { commit_id: commit_id.clone(), ..meta };

        let _refs_guard = self.refs_lock.write().expect("refs lock poisoned");

        let record = serde_json::to_vec(&meta).map_err(|e| GovernanceError::HistoryIo(e.to_string()))?;
        write_atomic(&self.object_path(&commit_id), &record)?;

        let mut line = record;
        line.push(b'\n');
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .map_err(|e| io_err("open log", e))?;
        log.write_all(&line).map_err(|e| io_err("append log", e))?;
        log.flush().map_err(|e| io_err("flush log", e))?;

        write_atomic(&self.heads_main(), commit_id.as_bytes())?;

        tracing::info!(dataset = %req.dataset, commit_id = %commit_id, "contract version committed");
        Ok(commit_id)
    }

    /// Deletes object files this call's `put()`s created, used to undo a
    /// staged-but-never-committed write (spec §4.7 atomicity, §4.8 rollback).
    pub fn rollback_staged(&self, created_ids: &[String]) {
        for id in created_ids {
            let _ = fs::remove_file(self.object_path(id));
        }
    }

    pub fn ref_head(&self) -> Result<Option<String>> {
        let _guard = self.refs_lock.read().expect("refs lock poisoned");
        let path = self.heads_main();
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| io_err("read refs/heads/main", e))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    fn commit_meta(&self, commit_id: &str) -> Result<CommitMeta> {
        let bytes = self.read_object(commit_id)?;
        serde_json::from_slice(&bytes).map_err(|e| GovernanceError::HistoryIo(format!("parse commit {commit_id}: {e}")))
    }

    /// Reads the blob named `name` in the current head commit.
    pub fn ref_read(&self, name: &str) -> Result<Vec<u8>> {
        let head = self
            .ref_head()?
            .ok_or_else(|| GovernanceError::HistoryIo("repository has no commits yet".to_string()))?;
        let meta = self.commit_meta(&head)?;
        let blob_id = meta
            .refs_by_name
            .get(name)
            .ok_or_else(|| GovernanceError::HistoryIo(format!("no ref named {name} at head")))?;
        self.read_object(blob_id)
    }

    /// Produces a unified line diff of the blob named `name` between two
    /// commits, via the `similar` crate.
    pub fn diff(&self, commit_a: &str, commit_b: &str, name: &str) -> Result<String> {
        let meta_a = self.commit_meta(commit_a)?;
        let meta_b = self.commit_meta(commit_b)?;
        let blob_a = meta_a
            .refs_by_name
            .get(name)
            .ok_or_else(|| GovernanceError::HistoryIo(format!("no ref named {name} at {commit_a}")))?;
        let blob_b = meta_b
            .refs_by_name
            .get(name)
            .ok_or_else(|| GovernanceError::HistoryIo(format!("no ref named {name} at {commit_b}")))?;
        let text_a = String::from_utf8_lossy(&self.read_object(blob_a)?).into_owned();
        let text_b = String::from_utf8_lossy(&self.read_object(blob_b)?).into_owned();
        let diff = similar::TextDiff::from_lines(&text_a, &text_b);
        Ok(diff
            .unified_diff()
            .context_radius(3)
            .header(&format!("{commit_a}:{name}"), &format!("{commit_b}:{name}"))
            .to_string())
    }

    /// Returns up to `limit` commits, most recent first, optionally stopping
    /// once `since` (exclusive) is reached.
    pub fn log(&self, limit: usize, since: Option<&str>) -> Result<Vec<CommitMeta>> {
        let _guard = self.refs_lock.read().expect("refs lock poisoned");
        let path = self.log_path();
        if !path.exists() {
            return Ok(vec![]);
        }
        let text = fs::read_to_string(&path).map_err(|e| io_err("read log", e))?;
        let mut entries: Vec<CommitMeta> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        entries.reverse();
        if let Some(since) = since {
            if let Some(pos) = entries.iter().position(|m| m.commit_id == since) {
                entries.truncate(pos);
            }
        }
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn tag(&self, commit_id: &str, tag: &str) -> Result<()> {
        if self.commit_meta(commit_id).is_err() {
            return Err(GovernanceError::HistoryIo(format!("cannot tag unknown commit {commit_id}")));
        }
        write_atomic(&self.tag_path(tag), commit_id.as_bytes())
    }

    pub fn tag_commit(&self, tag: &str) -> Result<Option<String>> {
        let path = self.tag_path(tag);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|e| io_err("read tag", e))?;
        Ok(Some(text.trim().to_string()))
    }

    /// Looks up the most recent commit for `dataset` and reads its
    /// machine-readable blob, for callers that need the predecessor contract
    /// rather than a specific ref's raw bytes.
    pub fn latest_machine_blob_for_dataset(&self, dataset: &str) -> Result<Option<(String, Vec<u8>)>> {
        for meta in self.log(usize::MAX, None)? {
            if meta.dataset != dataset {
                continue;
            }
            let struct_name = meta.refs_by_name.keys().find(|k| k.ends_with(".struct"));
            if let Some(name) = struct_name {
                let blob_id = &meta.refs_by_name[name];
                return Ok(Some((meta.commit_id, self.read_object(blob_id)?)));
            }
        }
        Ok(None)
    }

    fn latest_commit_for_dataset(&self, dataset: &str) -> Result<Option<String>> {
        for meta in self.log(usize::MAX, None)? {
            if meta.dataset == dataset {
                return Ok(Some(meta.commit_id));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("objects")).unwrap();
        fs::create_dir_all(dir.path().join("refs").join("heads")).unwrap();
        fs::create_dir_all(dir.path().join("refs").join("tags")).unwrap();
        let store = HistoryStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn put_is_content_addressed_and_idempotent() {
        let (_dir, store) = store();
        let (id1, created1) = store.put(b"hello").unwrap();
        let (id2, created2) = store.put(b"hello").unwrap();
        assert_eq!(id1, id2);
        assert!(created1);
        assert!(!created2);
    }

    #[test]
    fn first_commit_has_no_parent_and_advances_head() {
        let (_dir, store) = store();
        let (blob_id, _) = store.put(b"contract v1").unwrap();
        let mut refs = BTreeMap::new();
        refs.insert("ds_v1.0.0".to_string(), blob_id);
        let commit_id = store
            .commit(CommitRequest {
                dataset: "ds".into(),
                message: "initial commit".into(),
                parent: None,
                author: "tester".into(),
                timestamp: Utc::now(),
                refs_by_name: refs,
            })
            .unwrap();
        assert_eq!(store.ref_head().unwrap(), Some(commit_id.clone()));
        let read_back = store.ref_read("ds_v1.0.0").unwrap();
        assert_eq!(read_back, b"contract v1");
    }

    #[test]
    fn commit_with_stale_parent_is_a_conflict() {
        let (_dir, store) = store();
        let (blob_id, _) = store.put(b"v1").unwrap();
        let mut refs = BTreeMap::new();
        refs.insert("ds_v1.0.0".to_string(), blob_id);
        store
            .commit(CommitRequest {
                dataset: "ds".into(),
                message: "v1".into(),
                parent: None,
                author: "tester".into(),
                timestamp: Utc::now(),
                refs_by_name: refs,
            })
            .unwrap();

        let (blob_id2, _) = store.put(b"v2").unwrap();
        let mut refs2 = BTreeMap::new();
        refs2.insert("ds_v1.1.0".to_string(), blob_id2);
        let result = store.commit(CommitRequest {
            dataset: "ds".into(),
            message: "v2 with stale parent".into(),
            parent: None,
            author: "tester".into(),
            timestamp: Utc::now(),
            refs_by_name: refs2,
        });
        assert!(matches!(result, Err(GovernanceError::HistoryConflict { .. })));
    }

    #[test]
    fn diff_reports_changed_lines_between_commits() {
        let (_dir, store) = store();
        let (b1, _) = store.put(b"line one\nline two\n").unwrap();
        let mut refs = BTreeMap::new();
        refs.insert("ds_v1.0.0".to_string(), b1);
        let c1 = store
            .commit(CommitRequest {
                dataset: "ds".into(),
                message: "v1".into(),
                parent: None,
                author: "tester".into(),
                timestamp: Utc::now(),
                refs_by_name: refs,
            })
            .unwrap();

        let (b2, _) = store.put(b"line one\nline two\nline three\n").unwrap();
        let mut refs2 = BTreeMap::new();
        refs2.insert("ds_v1.0.0".to_string(), b2);
        let c2 = store
            .commit(CommitRequest {
                dataset: "ds".into(),
                message: "v2".into(),
                parent: Some(c1.clone()),
                author: "tester".into(),
                timestamp: Utc::now(),
                refs_by_name: refs2,
            })
            .unwrap();

        let text = store.diff(&c1, &c2, "ds_v1.0.0").unwrap();
        assert!(text.contains("line three"));
    }
}

//! Working-set store (C2).
//!
//! Grounded on `memory_store_enhanced.py`'s `EnhancedMemoryStore` /
//! `IndexManager`: the three-top-level-map snapshot shape
//! (`{"threads": ..., "items": ..., "attachments": ...}`), the checksum
//! computed once in the attachment constructor, the word-length-3 /
//! case-folded inverted text index, and the "no query, no filters ⇒ empty
//! set" search semantics all come directly from that file. The Python
//! source is single-threaded; the single-writer-multi-reader mutex over
//! both the entity maps and the indexes together (so a search never
//! observes a half-indexed mutation) is new engineering this crate adds,
//! built the way the rest of this codebase reaches for `tokio::sync`
//! primitives rather than a database.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::conductor::error::{OrchestrationError, Result};
use crate::conductor::model::{Attachment, Item, Message, Metadata, Thread, ThreadStatus};

#[derive(Default)]
struct Indexes {
    thread_by_status: HashMap<ThreadStatus, HashSet<String>>,
    thread_by_metadata: HashMap<(String, String), HashSet<String>>,
    thread_text: HashMap<String, HashSet<String>>,
    item_by_type: HashMap<String, HashSet<String>>,
    item_by_tag: HashMap<String, HashSet<String>>,
    item_text: HashMap<String, HashSet<String>>,
    attachment_by_mime: HashMap<String, HashSet<String>>,
}

struct Data {
    threads: HashMap<String, Thread>,
    items: HashMap<String, Item>,
    attachments: HashMap<String, Attachment>,
    indexes: Indexes,
}

impl Data {
    fn new() -> Self {
        Self {
            threads: HashMap::new(),
            items: HashMap::new(),
            attachments: HashMap::new(),
            indexes: Indexes::default(),
        }
    }

    fn index_thread(&mut self, thread: &Thread) {
        self.indexes
            .thread_by_status
            .entry(thread.status)
            .or_default()
            .insert(thread.id.clone());
        for (k, v) in &thread.metadata {
            if let Some(s) = v.as_str() {
                self.indexes
                    .thread_by_metadata
                    .entry((k.clone(), s.to_lowercase()))
                    .or_default()
                    .insert(thread.id.clone());
            }
        }
        let text: String = thread
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        for word in index_words(&text) {
            self.indexes
                .thread_text
                .entry(word)
                .or_default()
                .insert(thread.id.clone());
        }
    }

    fn unindex_thread(&mut self, thread: &Thread) {
        if let Some(set) = self.indexes.thread_by_status.get_mut(&thread.status) {
            set.remove(&thread.id);
        }
        for set in self.indexes.thread_by_metadata.values_mut() {
            set.remove(&thread.id);
        }
        for set in self.indexes.thread_text.values_mut() {
            set.remove(&thread.id);
        }
    }

    fn index_item(&mut self, item: &Item) {
        self.indexes
            .item_by_type
            .entry(item.kind.clone())
            .or_default()
            .insert(item.id.clone());
        for tag in &item.tags {
            self.indexes
                .item_by_tag
                .entry(tag.to_lowercase())
                .or_default()
                .insert(item.id.clone());
        }
        let text = match &item.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        for word in index_words(&text) {
            self.indexes
                .item_text
                .entry(word)
                .or_default()
                .insert(item.id.clone());
        }
    }

    fn unindex_item(&mut self, item: &Item) {
        if let Some(set) = self.indexes.item_by_type.get_mut(&item.kind) {
            set.remove(&item.id);
        }
        for set in self.indexes.item_by_tag.values_mut() {
            set.remove(&item.id);
        }
        for set in self.indexes.item_text.values_mut() {
            set.remove(&item.id);
        }
    }

    fn index_attachment(&mut self, attachment: &Attachment) {
        self.indexes
            .attachment_by_mime
            .entry(attachment.mime_type.clone())
            .or_default()
            .insert(attachment.id.clone());
    }

    fn unindex_attachment(&mut self, attachment: &Attachment) {
        if let Some(set) = self.indexes.attachment_by_mime.get_mut(&attachment.mime_type) {
            set.remove(&attachment.id);
        }
    }

    fn rebuild_indexes(&mut self) {
        self.indexes = Indexes::default();
        let threads: Vec<Thread> = self.threads.values().cloned().collect();
        for t in &threads {
            self.index_thread(t);
        }
        let items: Vec<Item> = self.items.values().cloned().collect();
        for i in &items {
            self.index_item(i);
        }
        let attachments: Vec<Attachment> = self.attachments.values().cloned().collect();
        for a in &attachments {
            self.index_attachment(a);
        }
    }
}

/// Words shorter than 3 characters are skipped at index time; matching is
/// case-folded ASCII.
fn index_words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.chars().count() >= 3)
        .collect()
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    threads: HashMap<String, Thread>,
    items: HashMap<String, Item>,
    attachments: HashMap<String, Attachment>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Statistics {
    pub thread_count: usize,
    pub item_count: usize,
    pub attachment_count: usize,
    pub threads_by_status: HashMap<String, usize>,
    pub items_by_type: HashMap<String, usize>,
}

pub struct WorkingSetStore {
    data: RwLock<Data>,
    snapshot_path: PathBuf,
    snapshot_in_flight: AtomicBool,
    mutated_during_snapshot: AtomicBool,
}

impl WorkingSetStore {
    pub fn new(snapshot_path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(Data::new()),
            snapshot_path,
            snapshot_in_flight: AtomicBool::new(false),
            mutated_during_snapshot: AtomicBool::new(false),
        })
    }

    /// Loads a snapshot from disk and rebuilds indexes, if one exists. A
    /// corrupted or missing snapshot is logged and treated as an empty
    /// store rather than surfaced as an error.
    pub async fn load(&self) {
        let bytes = match tokio::fs::read(&self.snapshot_path).await {
            Ok(b) => b,
            Err(_) => return,
        };
        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => {
                let mut data = self.data.write().await;
                data.threads = snapshot.threads;
                data.items = snapshot.items;
                data.attachments = snapshot.attachments;
                data.rebuild_indexes();
            }
            Err(e) => {
                log::error!("corrupted working-set snapshot at {:?}: {e}", self.snapshot_path);
            }
        }
    }

    fn schedule_snapshot(self: &Arc<Self>) {
        if self
            .snapshot_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.mutated_during_snapshot.store(true, Ordering::SeqCst);
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                this.write_snapshot_once().await;
                if this
                    .mutated_during_snapshot
                    .swap(false, Ordering::SeqCst)
                {
                    continue;
                }
                this.snapshot_in_flight.store(false, Ordering::SeqCst);
                break;
            }
        });
    }

    async fn write_snapshot_once(&self) {
        let snapshot = {
            let data = self.data.read().await;
            Snapshot {
                threads: data.threads.clone(),
                items: data.items.clone(),
                attachments: data.attachments.clone(),
            }
        };
        let bytes = match serde_json::to_vec_pretty(&snapshot) {
            Ok(b) => b,
            Err(e) => {
                log::error!("failed to serialize working-set snapshot: {e}");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.snapshot_path, bytes).await {
            log::error!("failed to write working-set snapshot: {e}");
        }
    }

    // -- Threads ---------------------------------------------------------

    pub async fn create_thread(self: &Arc<Self>, metadata: Metadata) -> Thread {
        let mut thread = Thread::new(format!("thread_{}", short_id()));
        thread.metadata = metadata;
        {
            let mut data = self.data.write().await;
            data.index_thread(&thread);
            data.threads.insert(thread.id.clone(), thread.clone());
        }
        self.schedule_snapshot();
        thread
    }

    pub async fn get_thread(&self, id: &str) -> Option<Thread> {
        self.data.read().await.threads.get(id).cloned()
    }

    pub async fn add_message(self: &Arc<Self>, thread_id: &str, message: Message) -> Result<()> {
        let mut data = self.data.write().await;
        let thread = data
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::ValidationError(format!("thread {thread_id} not found")))?;
        data.unindex_thread(&thread);
        let thread = data.threads.get_mut(thread_id).unwrap();
        thread.messages.push(message);
        thread.updated_at = Utc::now();
        let thread = thread.clone();
        data.index_thread(&thread);
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    pub async fn update_thread_status(self: &Arc<Self>, thread_id: &str, status: ThreadStatus) -> Result<()> {
        let mut data = self.data.write().await;
        let thread = data
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::ValidationError(format!("thread {thread_id} not found")))?;
        data.unindex_thread(&thread);
        let thread = data.threads.get_mut(thread_id).unwrap();
        thread.status = status;
        thread.updated_at = Utc::now();
        let thread = thread.clone();
        data.index_thread(&thread);
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    pub async fn delete_thread(self: &Arc<Self>, thread_id: &str) -> bool {
        let mut data = self.data.write().await;
        if let Some(thread) = data.threads.remove(thread_id) {
            data.unindex_thread(&thread);
            drop(data);
            self.schedule_snapshot();
            true
        } else {
            false
        }
    }

    /// Generic update covering everything `update_thread_status` doesn't:
    /// `metadata` is reindexed since `thread_by_metadata` depends on it.
    pub async fn update_thread_metadata(self: &Arc<Self>, thread_id: &str, metadata: Metadata) -> Result<()> {
        let mut data = self.data.write().await;
        let thread = data
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::ValidationError(format!("thread {thread_id} not found")))?;
        data.unindex_thread(&thread);
        let thread = data.threads.get_mut(thread_id).unwrap();
        thread.metadata = metadata;
        thread.updated_at = Utc::now();
        let thread = thread.clone();
        data.index_thread(&thread);
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    /// Writes one key into the thread's scratch `context` map; agents use
    /// this to leave state for siblings or later stages without it being
    /// part of the searchable metadata.
    pub async fn update_thread_context(self: &Arc<Self>, thread_id: &str, key: String, value: serde_json::Value) -> Result<()> {
        let mut data = self.data.write().await;
        let thread = data
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| OrchestrationError::ValidationError(format!("thread {thread_id} not found")))?;
        thread.context.insert(key, value);
        thread.updated_at = Utc::now();
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    /// `query` is split on whitespace; each word (≥3 chars, case-folded)
    /// must match via the inverted index (AND across words); structural
    /// filters intersect with text results. A missing dimension is a
    /// wildcard, but an empty query with no filters at all returns the
    /// empty set rather than everything.
    pub async fn search_threads(
        &self,
        query: Option<&str>,
        status: Option<ThreadStatus>,
        metadata: Option<&(String, String)>,
        limit: usize,
    ) -> Vec<Thread> {
        let data = self.data.read().await;
        if query.is_none() && status.is_none() && metadata.is_none() {
            return vec![];
        }

        let mut candidates: Option<HashSet<String>> = None;
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            let words = index_words(q);
            if words.is_empty() {
                return vec![];
            }
            let mut set: Option<HashSet<String>> = None;
            for word in words {
                let matches = data.indexes.thread_text.get(&word).cloned().unwrap_or_default();
                set = Some(match set {
                    Some(existing) => existing.intersection(&matches).cloned().collect(),
                    None => matches,
                });
            }
            candidates = intersect_opt(candidates, set);
        } else if query.is_some() {
            // explicit empty text query behaves as a non-match unless other filters exist
            candidates = Some(HashSet::new());
        }

        if let Some(status) = status {
            let matches = data.indexes.thread_by_status.get(&status).cloned().unwrap_or_default();
            candidates = Some(intersect_opt(candidates, Some(matches)).unwrap());
        }
        if let Some((k, v)) = metadata {
            let matches = data
                .indexes
                .thread_by_metadata
                .get(&(k.clone(), v.to_lowercase()))
                .cloned()
                .unwrap_or_default();
            candidates = Some(intersect_opt(candidates, Some(matches)).unwrap());
        }

        let mut results: Vec<Thread> = candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| data.threads.get(&id).cloned())
            .collect();
        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        results.truncate(limit);
        results
    }

    // -- Items -------------------------------------------------------------

    pub async fn create_item(self: &Arc<Self>, kind: String, content: serde_json::Value, tags: HashSet<String>) -> Item {
        let mut item = Item::new(format!("item_{}", short_id()), kind, content);
        item.tags = tags;
        {
            let mut data = self.data.write().await;
            data.index_item(&item);
            data.items.insert(item.id.clone(), item.clone());
        }
        self.schedule_snapshot();
        item
    }

    pub async fn get_item(&self, id: &str) -> Option<Item> {
        self.data.read().await.items.get(id).cloned()
    }

    pub async fn link_items(self: &Arc<Self>, a: &str, b: &str) -> Result<()> {
        let mut data = self.data.write().await;
        if !data.items.contains_key(a) || !data.items.contains_key(b) {
            return Err(OrchestrationError::ValidationError("both items must exist to link".into()));
        }
        data.items.get_mut(a).unwrap().relations.insert(b.to_string());
        data.items.get_mut(b).unwrap().relations.insert(a.to_string());
        data.items.get_mut(a).unwrap().updated_at = Utc::now();
        data.items.get_mut(b).unwrap().updated_at = Utc::now();
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    pub async fn link_item_to_thread(self: &Arc<Self>, thread_id: &str, item_id: &str) -> Result<()> {
        let mut data = self.data.write().await;
        if !data.items.contains_key(item_id) {
            return Err(OrchestrationError::ValidationError(format!("item {item_id} not found")));
        }
        let thread = data
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| OrchestrationError::ValidationError(format!("thread {thread_id} not found")))?;
        thread.item_ids.push(item_id.to_string());
        thread.updated_at = Utc::now();
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    pub async fn link_attachment_to_thread(self: &Arc<Self>, thread_id: &str, attachment_id: &str) -> Result<()> {
        let mut data = self.data.write().await;
        if !data.attachments.contains_key(attachment_id) {
            return Err(OrchestrationError::ValidationError(format!(
                "attachment {attachment_id} not found"
            )));
        }
        let thread = data
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| OrchestrationError::ValidationError(format!("thread {thread_id} not found")))?;
        thread.attachment_ids.push(attachment_id.to_string());
        thread.updated_at = Utc::now();
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    pub async fn search_items(
        &self,
        query: Option<&str>,
        kind: Option<&str>,
        tags: Option<&HashSet<String>>,
        limit: usize,
    ) -> Vec<Item> {
        let data = self.data.read().await;
        if query.is_none() && kind.is_none() && tags.is_none() {
            return vec![];
        }

        let mut candidates: Option<HashSet<String>> = None;
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            let words = index_words(q);
            if words.is_empty() {
                return vec![];
            }
            let mut set: Option<HashSet<String>> = None;
            for word in words {
                let matches = data.indexes.item_text.get(&word).cloned().unwrap_or_default();
                set = Some(match set {
                    Some(existing) => existing.intersection(&matches).cloned().collect(),
                    None => matches,
                });
            }
            candidates = intersect_opt(candidates, set);
        } else if query.is_some() {
            candidates = Some(HashSet::new());
        }

        if let Some(kind) = kind {
            let matches = data.indexes.item_by_type.get(kind).cloned().unwrap_or_default();
            candidates = Some(intersect_opt(candidates, Some(matches)).unwrap());
        }
        if let Some(tags) = tags {
            let mut set: Option<HashSet<String>> = None;
            for tag in tags {
                let matches = data
                    .indexes
                    .item_by_tag
                    .get(&tag.to_lowercase())
                    .cloned()
                    .unwrap_or_default();
                set = Some(match set {
                    Some(existing) => existing.intersection(&matches).cloned().collect(),
                    None => matches,
                });
            }
            candidates = Some(intersect_opt(candidates, set).unwrap());
        }

        let mut results: Vec<Item> = candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| data.items.get(&id).cloned())
            .collect();
        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        results.truncate(limit);
        results
    }

    pub async fn update_item(self: &Arc<Self>, item_id: &str, content: serde_json::Value, tags: HashSet<String>) -> Result<()> {
        let mut data = self.data.write().await;
        let item = data
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::ValidationError(format!("item {item_id} not found")))?;
        data.unindex_item(&item);
        let item = data.items.get_mut(item_id).unwrap();
        item.content = content;
        item.tags = tags;
        item.updated_at = Utc::now();
        let item = item.clone();
        data.index_item(&item);
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    pub async fn delete_item(self: &Arc<Self>, item_id: &str) -> bool {
        let mut data = self.data.write().await;
        if let Some(item) = data.items.remove(item_id) {
            data.unindex_item(&item);
            drop(data);
            self.schedule_snapshot();
            true
        } else {
            false
        }
    }

    // -- Attachments ---------------------------------------------------------

    /// Reads the file at `file_path` exactly once to compute size and
    /// SHA-256; a missing file fails with `io_error` and creates nothing.
    pub async fn create_attachment(
        self: &Arc<Self>,
        file_path: String,
        mime_type: String,
        metadata: Metadata,
    ) -> Result<Attachment> {
        let bytes = tokio::fs::read(&file_path)
            .await
            .map_err(|e| OrchestrationError::IoError(format!("failed to read {file_path}: {e}")))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let checksum = hex::encode(hasher.finalize());
        let now = Utc::now();
        let attachment = Attachment {
            id: format!("attachment_{}", short_id()),
            file_path,
            mime_type,
            size: bytes.len() as u64,
            checksum,
            metadata,
            created_at: now,
            updated_at: now,
        };
        {
            let mut data = self.data.write().await;
            data.index_attachment(&attachment);
            data.attachments.insert(attachment.id.clone(), attachment.clone());
        }
        self.schedule_snapshot();
        Ok(attachment)
    }

    pub async fn get_attachment(&self, id: &str) -> Option<Attachment> {
        self.data.read().await.attachments.get(id).cloned()
    }

    /// `mime_type` isn't mutable here since it's the only indexed
    /// attachment field and changing it without re-reading the file would
    /// make `mime_type` and `checksum` disagree about what was hashed.
    pub async fn update_attachment_metadata(self: &Arc<Self>, attachment_id: &str, metadata: Metadata) -> Result<()> {
        let mut data = self.data.write().await;
        let attachment = data
            .attachments
            .get_mut(attachment_id)
            .ok_or_else(|| OrchestrationError::ValidationError(format!("attachment {attachment_id} not found")))?;
        attachment.metadata = metadata;
        attachment.updated_at = Utc::now();
        drop(data);
        self.schedule_snapshot();
        Ok(())
    }

    pub async fn delete_attachment(self: &Arc<Self>, attachment_id: &str) -> bool {
        let mut data = self.data.write().await;
        if let Some(attachment) = data.attachments.remove(attachment_id) {
            data.unindex_attachment(&attachment);
            drop(data);
            self.schedule_snapshot();
            true
        } else {
            false
        }
    }

    pub async fn statistics(&self) -> Statistics {
        let data = self.data.read().await;
        let mut threads_by_status = HashMap::new();
        for t in data.threads.values() {
            *threads_by_status.entry(format!("{:?}", t.status)).or_insert(0) += 1;
        }
        let mut items_by_type = HashMap::new();
        for i in data.items.values() {
            *items_by_type.entry(i.kind.clone()).or_insert(0) += 1;
        }
        Statistics {
            thread_count: data.threads.len(),
            item_count: data.items.len(),
            attachment_count: data.attachments.len(),
            threads_by_status,
            items_by_type,
        }
    }
}

fn intersect_opt(a: Option<HashSet<String>>, b: Option<HashSet<String>>) -> Option<HashSet<String>> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.intersection(&b).cloned().collect()),
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_query_with_no_filters_returns_empty() {
        let store = WorkingSetStore::new(PathBuf::from("/tmp/unused_snapshot.json"));
        store.create_thread(Metadata::new()).await;
        let results = store.search_threads(None, None, None, 10).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_by_status_and_metadata() {
        let store = WorkingSetStore::new(PathBuf::from("/tmp/unused_snapshot2.json"));
        let mut meta_prod = Metadata::new();
        meta_prod.insert("env".to_string(), serde_json::json!("prod"));
        let t1 = store.create_thread(meta_prod).await;
        let mut meta_dev = Metadata::new();
        meta_dev.insert("env".to_string(), serde_json::json!("dev"));
        store.create_thread(meta_dev).await;

        let results = store
            .search_threads(None, Some(ThreadStatus::Active), Some(&("env".to_string(), "prod".to_string())), 10)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, t1.id);
    }

    #[tokio::test]
    async fn attachment_creation_fails_on_missing_file() {
        let store = WorkingSetStore::new(PathBuf::from("/tmp/unused_snapshot3.json"));
        let err = store
            .create_attachment("/nonexistent/path/file.bin".to_string(), "text/plain".to_string(), Metadata::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "io_error");
    }

    #[tokio::test]
    async fn snapshot_round_trips_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = WorkingSetStore::new(path.clone());
        store.create_thread(Metadata::new()).await;
        store.create_item("finding".to_string(), serde_json::json!("hello world"), HashSet::new()).await;
        store.write_snapshot_once().await;

        let reloaded = WorkingSetStore::new(path);
        reloaded.load().await;
        let stats_before = store.statistics().await;
        let stats_after = reloaded.statistics().await;
        assert_eq!(stats_before.thread_count, stats_after.thread_count);
        assert_eq!(stats_before.item_count, stats_after.item_count);
    }

    #[test]
    fn index_words_skips_short_words_and_folds_case() {
        let words = index_words("Go to the Big House");
        assert!(words.contains("big"));
        assert!(words.contains("house"));
        assert!(!words.contains("go"));
        assert!(!words.contains("to"));
        assert!(!words.contains("the"));
    }
}

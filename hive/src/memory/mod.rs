//! Memory Store
//!
//! Durable record of specifications, execution results, agents and task
//! executions. The store is a single JSON document written through to disk
//! after every mutation (write to a temp file, then rename). Without a
//! configured path the store is ephemeral and lives only in process memory.
//!
//! A background retention sweep removes execution history older than the
//! configured retention window.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::agents::{AgentId, AgentRecord};
use crate::config::MemoryConfig;
use crate::specification::{Specification, SpecificationResult};

pub mod types;
pub mod document;

pub use types::*;
pub use document::{DocumentMetadata, MemoryDocument, SCHEMA_VERSION};

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Memory store errors
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Memory store not initialized")]
    NotInitialized,

    #[error("Storage {operation} failed: {source}")]
    Storage {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl MemoryError {
    fn storage(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Storage {
            operation: operation.into(),
            source,
        }
    }
}

/// File-backed (or ephemeral) memory store
pub struct MemoryStore {
    config: MemoryConfig,
    document: RwLock<Option<MemoryDocument>>,
    retention_task: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            document: RwLock::new(None),
            retention_task: Mutex::new(None),
        }
    }

    /// Ephemeral store with default limits
    pub fn in_memory() -> Self {
        Self::new(MemoryConfig::ephemeral())
    }

    pub fn path(&self) -> Option<&Path> {
        self.config.path.as_deref()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub async fn is_initialized(&self) -> bool {
        self.document.read().await.is_some()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the backing document if absent, otherwise load and migrate it,
    /// then start the retention sweep.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.document.write().await;
        if guard.is_some() {
            debug!("Memory store already initialized");
            return Ok(());
        }

        let document = match self.config.path.clone() {
            Some(path) => Self::load_or_create(&path).await?,
            None => MemoryDocument::default(),
        };

        info!(
            path = ?self.config.path,
            specifications = document.specifications.len(),
            agents = document.agents.len(),
            "Memory store initialized"
        );
        *guard = Some(document);
        drop(guard);

        self.start_retention_sweep();
        Ok(())
    }

    async fn load_or_create(path: &Path) -> Result<MemoryDocument> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MemoryError::storage("create directory", e))?;
        }

        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let (document, migrated) = MemoryDocument::decode(&bytes)?;
                if migrated {
                    Self::write_document(path, &document).await?;
                }
                Ok(document)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let document = MemoryDocument::default();
                Self::write_document(path, &document).await?;
                Ok(document)
            }
            Err(e) => Err(MemoryError::storage("read", e)),
        }
    }

    async fn write_document(path: &Path, document: &MemoryDocument) -> Result<()> {
        let bytes = document.encode()?;
        let temp_path = temp_path_for(path);

        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(|e| MemoryError::storage("write", e))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| MemoryError::storage("rename", e))?;
        Ok(())
    }

    /// Stop the retention sweep, flush and close the store
    pub async fn dispose(&self) -> Result<()> {
        self.stop_retention_sweep();

        let mut guard = self.document.write().await;
        if let (Some(document), Some(path)) = (guard.as_ref(), self.config.path.as_deref()) {
            Self::write_document(path, document).await?;
        }
        *guard = None;

        debug!("Memory store disposed");
        Ok(())
    }

    /// Dispose the store and delete its backing file
    pub async fn purge(&self) -> Result<()> {
        self.stop_retention_sweep();
        *self.document.write().await = None;

        if let Some(path) = self.config.path.as_deref() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(MemoryError::storage("remove", e)),
            }
        }

        info!(path = ?self.config.path, "Memory store purged");
        Ok(())
    }

    /// Apply a mutation and write the document through to disk.
    ///
    /// The mutation runs on a staged copy that replaces the live document only
    /// after the write succeeds, so a failed write leaves the store unchanged.
    async fn mutate<T>(&self, f: impl FnOnce(&mut MemoryDocument) -> T) -> Result<T> {
        let mut guard = self.document.write().await;
        let document = guard.as_mut().ok_or(MemoryError::NotInitialized)?;

        let Some(path) = self.config.path.as_deref() else {
            let output = f(document);
            document.refresh_metadata();
            return Ok(output);
        };

        let mut staged = document.clone();
        let output = f(&mut staged);
        staged.refresh_metadata();

        Self::write_document(path, &staged).await?;
        *document = staged;
        Ok(output)
    }

    async fn read<T>(&self, f: impl FnOnce(&MemoryDocument) -> T) -> Result<T> {
        let guard = self.document.read().await;
        let document = guard.as_ref().ok_or(MemoryError::NotInitialized)?;
        Ok(f(document))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or replace a specification; a re-submitted id keeps its
    /// original `stored_at` and goes back to pending
    pub async fn store_specification(&self, specification: &Specification) -> Result<()> {
        let specification = specification.clone();
        let id = specification.id.clone();

        self.mutate(move |doc| {
            let now = Utc::now();
            let stored_at = doc
                .specifications
                .get(&specification.id)
                .map(|entry| entry.stored_at)
                .unwrap_or(now);

            doc.specifications.insert(
                specification.id.clone(),
                SpecificationEntry {
                    specification,
                    status: SpecificationStatus::Pending,
                    stored_at,
                    updated_at: now,
                },
            );
        })
        .await?;

        debug!(specification_id = %id, "Specification stored");
        Ok(())
    }

    /// Store a specification result and flip the linked specification's status.
    ///
    /// Returns the id of the new entry.
    pub async fn store_execution_result(&self, result: &SpecificationResult) -> Result<String> {
        let entry = ExecutionResultEntry {
            id: uuid::Uuid::new_v4().to_string(),
            specification_id: result.specification_id.clone(),
            result: result.clone(),
            timestamp: Utc::now(),
        };
        let id = entry.id.clone();

        self.mutate(move |doc| {
            if let Some(spec) = doc.specifications.get_mut(&entry.specification_id) {
                spec.status = if entry.result.success {
                    SpecificationStatus::Completed
                } else {
                    SpecificationStatus::Failed
                };
                spec.updated_at = entry.timestamp;
            }
            doc.execution_results.insert(entry.id.clone(), entry);
        })
        .await?;

        Ok(id)
    }

    /// Record a newly created (or reactivated) agent, keeping any existing
    /// interaction history for the same id
    pub async fn store_agent_creation(&self, agent: &AgentRecord) -> Result<()> {
        let agent = agent.clone();
        self.mutate(move |doc| match doc.agents.get_mut(&agent.id) {
            Some(entry) => entry.agent = agent,
            None => {
                doc.agents.insert(agent.id.clone(), AgentEntry::new(agent));
            }
        })
        .await
    }

    /// Store a task execution and append it to the agent's interaction log
    pub async fn store_task_execution(&self, record: TaskExecutionRecord) -> Result<()> {
        self.mutate(move |doc| {
            if let Some(entry) = doc.agents.get_mut(&record.agent_id) {
                entry.record_interaction(record.interaction());
            }
            doc.task_executions.insert(record.id.clone(), record);
        })
        .await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_specification(&self, id: &str) -> Result<SpecificationEntry> {
        self.read(|doc| doc.specifications.get(id).cloned())
            .await?
            .ok_or_else(|| MemoryError::NotFound {
                kind: "specification",
                id: id.to_string(),
            })
    }

    /// Stored agent entries, oldest first
    pub async fn agents(&self) -> Result<Vec<AgentEntry>> {
        self.read(|doc| {
            let mut agents: Vec<AgentEntry> = doc.agents.values().cloned().collect();
            agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            agents
        })
        .await
    }

    /// Number of distinct tasks with a successful execution on record
    pub async fn get_completed_task_count(&self) -> Result<usize> {
        self.read(MemoryDocument::completed_task_count).await
    }

    pub async fn get_size(&self) -> Result<MemorySize> {
        self.read(|doc| {
            let bytes = doc.encode().map(|b| b.len() as u64).unwrap_or_default();
            doc.size(bytes)
        })
        .await
    }

    /// Case-insensitive substring search across every collection
    pub async fn query(&self, text: &str, limit: usize) -> Result<Vec<QueryHit>> {
        self.read(|doc| doc.query(text, limit)).await
    }

    pub async fn get_agent_context(&self, agent_id: &AgentId) -> Result<AgentContext> {
        let (interactions, tasks) = (self.config.recent_interactions, self.config.recent_tasks);
        self.read(|doc| doc.agent_context(agent_id, interactions, tasks)).await
    }

    // ========================================================================
    // Health and Retention
    // ========================================================================

    pub async fn check_health(&self) -> MemoryHealth {
        let guard = self.document.read().await;
        let Some(document) = guard.as_ref() else {
            return MemoryHealth::from_issues(vec![MemoryIssue::NotInitialized]);
        };

        let mut issues = Vec::new();

        if let Some(path) = self.config.path.as_deref() {
            if let Err(e) = tokio::fs::metadata(path).await {
                issues.push(MemoryIssue::StorageUnreachable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        match document.encode() {
            Ok(bytes) if bytes.len() as u64 > self.config.max_size_bytes => {
                issues.push(MemoryIssue::Oversized {
                    bytes: bytes.len() as u64,
                    limit: self.config.max_size_bytes,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to measure memory document size"),
        }

        issues.extend(document.orphaned_references());
        MemoryHealth::from_issues(issues)
    }

    /// Remove execution history older than `cutoff`
    pub async fn cleanup_older_than(&self, cutoff: chrono::DateTime<Utc>) -> Result<CleanupReport> {
        let report = self.mutate(|doc| doc.retain_since(cutoff)).await?;
        if report.removed() > 0 {
            info!(
                execution_results = report.execution_results,
                task_executions = report.task_executions,
                interactions = report.interactions,
                "Retention sweep removed expired entries"
            );
        }
        Ok(report)
    }

    /// Retention sweep using the configured window
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        let cutoff = Utc::now() - ChronoDuration::days(self.config.retention_days);
        self.cleanup_older_than(cutoff).await
    }

    fn start_retention_sweep(self: &Arc<Self>) {
        let period = self.config.cleanup_interval();
        let store: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                if let Err(e) = store.cleanup().await {
                    warn!(error = %e, "Retention sweep failed");
                }
            }
        });

        if let Some(previous) = self.replace_retention_task(Some(handle)) {
            previous.abort();
        }
    }

    fn stop_retention_sweep(&self) {
        if let Some(handle) = self.replace_retention_task(None) {
            handle.abort();
        }
    }

    fn replace_retention_task(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.retention_task.lock() {
            Ok(mut slot) => std::mem::replace(&mut *slot, handle),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), handle),
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.stop_retention_sweep();
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requires_initialize() {
        let store = MemoryStore::in_memory();
        assert!(matches!(
            store.get_completed_task_count().await,
            Err(MemoryError::NotInitialized)
        ));
        let health = store.check_health().await;
        assert!(!health.healthy);
        assert_eq!(health.issues, vec![MemoryIssue::NotInitialized]);
    }

    #[tokio::test]
    async fn test_specification_upsert() {
        let store = Arc::new(MemoryStore::in_memory());
        store.initialize().await.unwrap();

        let spec = Specification::new("spec-1", "First");
        store.store_specification(&spec).await.unwrap();
        let first = store.get_specification("spec-1").await.unwrap();

        let renamed = Specification::new("spec-1", "Renamed");
        store.store_specification(&renamed).await.unwrap();

        let size = store.get_size().await.unwrap();
        assert_eq!(size.specifications, 1);
        let entry = store.get_specification("spec-1").await.unwrap();
        assert_eq!(entry.specification.title, "Renamed");
        assert_eq!(entry.stored_at, first.stored_at);

        assert!(matches!(
            store.get_specification("nope").await,
            Err(MemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(temp_path_for(Path::new("/a/hive.json")), PathBuf::from("/a/hive.json.tmp"));
    }
}

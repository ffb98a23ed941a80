//! Persisted memory document
//!
//! The whole store is one JSON document holding four collections and a
//! metadata block. Older documents are upgraded in place on load.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::types::*;
use super::{MemoryError, Result};
use crate::agents::AgentId;

/// Current document schema version
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub specification_count: usize,
    pub execution_count: usize,
    pub agent_count: usize,
    pub task_execution_count: usize,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_updated: now,
            specification_count: 0,
            execution_count: 0,
            agent_count: 0,
            task_execution_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDocument {
    pub version: u32,
    #[serde(default)]
    pub specifications: BTreeMap<String, SpecificationEntry>,
    #[serde(default)]
    pub execution_results: BTreeMap<String, ExecutionResultEntry>,
    #[serde(default)]
    pub agents: BTreeMap<AgentId, AgentEntry>,
    #[serde(default)]
    pub task_executions: BTreeMap<String, TaskExecutionRecord>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            specifications: BTreeMap::new(),
            execution_results: BTreeMap::new(),
            agents: BTreeMap::new(),
            task_executions: BTreeMap::new(),
            metadata: DocumentMetadata::default(),
        }
    }
}

impl MemoryDocument {
    /// Decode a stored document, migrating older schema versions.
    ///
    /// Returns the document and whether a migration was applied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, bool)> {
        let mut value: Value = serde_json::from_slice(bytes)?;

        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(1) as u32;

        let migrated = match version {
            1 => {
                migrate_v1(&mut value)?;
                true
            }
            SCHEMA_VERSION => false,
            other => {
                return Err(MemoryError::Migration(format!(
                    "unsupported schema version {} (newest known is {})",
                    other, SCHEMA_VERSION
                )));
            }
        };

        let mut document: MemoryDocument = serde_json::from_value(value)?;
        document.refresh_metadata();
        Ok((document, migrated))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn refresh_metadata(&mut self) {
        self.metadata.last_updated = Utc::now();
        self.metadata.specification_count = self.specifications.len();
        self.metadata.execution_count = self.execution_results.len();
        self.metadata.agent_count = self.agents.len();
        self.metadata.task_execution_count = self.task_executions.len();
    }

    pub fn size(&self, bytes: u64) -> MemorySize {
        MemorySize {
            specifications: self.specifications.len(),
            execution_results: self.execution_results.len(),
            agents: self.agents.len(),
            task_executions: self.task_executions.len(),
            bytes,
        }
    }

    /// Rank entries by case-insensitive occurrence count of `text`
    pub fn query(&self, text: &str, limit: usize) -> Vec<QueryHit> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits = Vec::new();
        collect_hits(&mut hits, &needle, MemoryCategory::Specification, &self.specifications);
        collect_hits(&mut hits, &needle, MemoryCategory::ExecutionResult, &self.execution_results);
        collect_hits(&mut hits, &needle, MemoryCategory::Agent, &self.agents);
        collect_hits(&mut hits, &needle, MemoryCategory::TaskExecution, &self.task_executions);

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }

    /// Recent interactions and task executions for one agent, newest first
    pub fn agent_context(&self, agent_id: &AgentId, interactions: usize, tasks: usize) -> AgentContext {
        let recent_interactions = self
            .agents
            .get(agent_id)
            .map(|entry| entry.interactions.iter().rev().take(interactions).cloned().collect())
            .unwrap_or_default();

        let mut recent_tasks: Vec<TaskExecutionRecord> = self
            .task_executions
            .values()
            .filter(|record| &record.agent_id == agent_id)
            .cloned()
            .collect();
        recent_tasks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent_tasks.truncate(tasks);

        AgentContext {
            agent_id: agent_id.clone(),
            recent_interactions,
            recent_tasks,
        }
    }

    /// Cross references that point at missing entries
    pub fn orphaned_references(&self) -> Vec<MemoryIssue> {
        let mut issues = Vec::new();

        for (id, entry) in &self.execution_results {
            if !self.specifications.contains_key(&entry.specification_id) {
                issues.push(MemoryIssue::OrphanedReference {
                    category: MemoryCategory::ExecutionResult,
                    id: id.clone(),
                    missing: format!("specification {}", entry.specification_id),
                });
            }
        }

        for (id, record) in &self.task_executions {
            if !self.agents.contains_key(&record.agent_id) {
                issues.push(MemoryIssue::OrphanedReference {
                    category: MemoryCategory::TaskExecution,
                    id: id.clone(),
                    missing: format!("agent {}", record.agent_id),
                });
            }
            if let Some(spec_id) = &record.specification_id {
                if !self.specifications.contains_key(spec_id) {
                    issues.push(MemoryIssue::OrphanedReference {
                        category: MemoryCategory::TaskExecution,
                        id: id.clone(),
                        missing: format!("specification {}", spec_id),
                    });
                }
            }
        }

        issues
    }

    /// Drop execution records and interaction log lines older than `cutoff`
    pub fn retain_since(&mut self, cutoff: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();

        let before = self.execution_results.len();
        self.execution_results.retain(|_, entry| entry.timestamp >= cutoff);
        report.execution_results = before - self.execution_results.len();

        let before = self.task_executions.len();
        self.task_executions.retain(|_, record| record.timestamp >= cutoff);
        report.task_executions = before - self.task_executions.len();

        for entry in self.agents.values_mut() {
            let before = entry.interactions.len();
            entry.interactions.retain(|interaction| interaction.timestamp >= cutoff);
            report.interactions += before - entry.interactions.len();
        }

        report
    }

    /// Task ids that have at least one successful execution record
    pub fn completed_task_count(&self) -> usize {
        self.task_executions
            .values()
            .filter(|record| record.success)
            .map(|record| (record.specification_id.as_deref(), record.task_id.as_str()))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

fn collect_hits<K, V>(hits: &mut Vec<QueryHit>, needle: &str, category: MemoryCategory, entries: &BTreeMap<K, V>)
where
    K: ToString,
    V: Serialize,
{
    for (id, entry) in entries {
        let Ok(value) = serde_json::to_value(entry) else {
            continue;
        };
        let score = count_matches(&value, needle);
        if score > 0 {
            hits.push(QueryHit {
                category,
                id: id.to_string(),
                score,
                entry: value,
            });
        }
    }
}

/// Occurrences of `needle` in the string and number leaves of `value`.
/// Object keys are field names and never match.
fn count_matches(value: &Value, needle: &str) -> usize {
    match value {
        Value::String(s) => s.to_lowercase().matches(needle).count(),
        Value::Number(n) => n.to_string().matches(needle).count(),
        Value::Array(items) => items.iter().map(|v| count_matches(v, needle)).sum(),
        Value::Object(fields) => fields.values().map(|v| count_matches(v, needle)).sum(),
        Value::Null | Value::Bool(_) => 0,
    }
}

/// Version 1 documents stored bare agent records, had no task execution
/// collection and no metadata block
fn migrate_v1(value: &mut Value) -> Result<()> {
    let root = value
        .as_object_mut()
        .ok_or_else(|| MemoryError::Migration("document root is not an object".to_string()))?;

    if let Some(agents) = root.get_mut("agents").and_then(Value::as_object_mut) {
        for agent in agents.values_mut() {
            if agent.get("agent").is_some() {
                continue;
            }
            let record = serde_json::from_value(agent.take())
                .map_err(|e| MemoryError::Migration(format!("invalid version 1 agent record: {}", e)))?;
            *agent = serde_json::to_value(AgentEntry::new(record))?;
        }
    }

    root.entry("task_executions")
        .or_insert_with(|| Value::Object(Default::default()));
    root.remove("metadata");
    root.insert("version".to_string(), Value::from(SCHEMA_VERSION));

    info!("Migrated memory document from schema version 1 to {}", SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentRecord, AgentType};
    use crate::specification::{Specification, TaskType};
    use chrono::Duration;

    fn spec_entry(id: &str, title: &str) -> SpecificationEntry {
        let now = Utc::now();
        SpecificationEntry {
            specification: Specification::new(id, title),
            status: SpecificationStatus::Pending,
            stored_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_query_ranks_by_occurrences() {
        let mut doc = MemoryDocument::default();
        doc.specifications.insert("a".into(), spec_entry("a", "Payment gateway"));
        doc.specifications.insert("b".into(), spec_entry("b", "payment PAYMENT payment"));
        doc.specifications.insert("c".into(), spec_entry("c", "Unrelated"));

        let hits = doc.query("Payment", 100);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert!(hits[0].score > hits[1].score);

        assert!(doc.query("   ", 10).is_empty());
        assert_eq!(doc.query("payment", 1).len(), 1);
    }

    #[test]
    fn test_query_matches_quotes_and_backslashes() {
        let mut doc = MemoryDocument::default();
        doc.specifications.insert(
            "a".into(),
            spec_entry("a", r#"Port the "legacy" C:\tools importer"#),
        );

        for needle in [r#""legacy""#, r"C:\tools", "legacy", r#"the "legacy" c:\tools"#] {
            let hits = doc.query(needle, 10);
            assert_eq!(hits.len(), 1, "no hit for {}", needle);
            assert_eq!(hits[0].id, "a");
        }

        // Field names are not searchable content
        assert!(doc.query("specification", 10).is_empty());
    }

    #[test]
    fn test_orphan_detection() {
        let mut doc = MemoryDocument::default();
        let record = TaskExecutionRecord::new("t1", TaskType::Design, AgentId::from_string("ghost"), true)
            .for_specification("missing-spec");
        doc.task_executions.insert(record.id.clone(), record);

        let issues = doc.orphaned_references();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_retention() {
        let mut doc = MemoryDocument::default();
        let agent = AgentRecord::new(AgentType::Coder, None);
        let id = agent.id.clone();
        let mut entry = AgentEntry::new(agent);

        let mut old = TaskExecutionRecord::new("old", TaskType::Implementation, id.clone(), true);
        old.timestamp = Utc::now() - Duration::days(40);
        let fresh = TaskExecutionRecord::new("fresh", TaskType::Implementation, id.clone(), true);
        entry.record_interaction(old.interaction());
        entry.record_interaction(fresh.interaction());
        doc.agents.insert(id, entry);
        doc.task_executions.insert(old.id.clone(), old);
        doc.task_executions.insert(fresh.id.clone(), fresh);

        let report = doc.retain_since(Utc::now() - Duration::days(30));
        assert_eq!(report.task_executions, 1);
        assert_eq!(report.interactions, 1);
        assert_eq!(doc.task_executions.len(), 1);
        assert_eq!(doc.agents.len(), 1);
    }

    #[test]
    fn test_migrate_v1_document() {
        let agent = AgentRecord::new(AgentType::Tester, None);
        let mut agents = serde_json::Map::new();
        agents.insert(agent.id.to_string(), serde_json::to_value(&agent).unwrap());
        let legacy = serde_json::json!({
            "specifications": {},
            "execution_results": {},
            "agents": agents,
            "metadata": { "total": 1 }
        });

        let (doc, migrated) = MemoryDocument::decode(legacy.to_string().as_bytes()).unwrap();
        assert!(migrated);
        assert_eq!(doc.version, SCHEMA_VERSION);
        assert_eq!(doc.agents[&agent.id].agent.agent_type, AgentType::Tester);
        assert!(doc.task_executions.is_empty());
        assert_eq!(doc.metadata.agent_count, 1);
    }

    #[test]
    fn test_rejects_future_version() {
        let err = MemoryDocument::decode(br#"{"version": 9}"#).unwrap_err();
        assert!(matches!(err, MemoryError::Migration(_)));
    }
}

//! Specification Text Parser
//!
//! Parses the sectioned plain-text format hosts use to submit work:
//!
//! ```text
//! TITLE: Inventory service
//! DESCRIPTION: REST service tracking stock levels
//! REQUIREMENTS:
//! - REQ-001: Expose CRUD endpoints
//! ARCHITECTURE:
//! - Axum HTTP layer
//! TASKS:
//! TASK-001: Schema
//! - Type: design
//! - Description: Design the storage schema
//! - Agent: architect
//! - Dependencies: none
//! - Duration: 4
//! - Acceptance: Schema reviewed
//! ACCEPTANCE_CRITERIA:
//! - All endpoints covered by tests
//! PRIORITY: high
//! ESTIMATED_DURATION: 16 hours
//! DEPENDENCIES:
//! - PostgreSQL
//! ---END_SPEC---
//! ```
//!
//! Extraction is boundary based and tolerant: unknown task types become
//! `implementation`, unknown agents fall back to the task type's default agent,
//! and text without a title or without any task yields the three-task default
//! plan (design, implementation, testing).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Priority, Specification, TaskDefinition, TaskType};
use crate::agents::AgentType;

/// Marker terminating the specification body
pub const END_MARKER: &str = "---END_SPEC---";

static SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(TITLE|DESCRIPTION|REQUIREMENTS|ARCHITECTURE|TASKS|ACCEPTANCE_CRITERIA|PRIORITY|ESTIMATED_DURATION|DEPENDENCIES)[ \t]*:",
    )
    .expect("valid section regex")
});

static TASK_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*TASK-(\d+)[ \t]*:[ \t]*(.*)$").expect("valid task header regex")
});

static TASK_FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*[-*][ \t]*(type|description|agent|dependencies|duration|acceptance)[ \t]*:[ \t]*(.*)$",
    )
    .expect("valid task field regex")
});

static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[-*•]|\d+[.)])?[ \t]*(?:REQ-\d+[ \t]*:)?[ \t]*(.*)$").expect("valid list regex")
});

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid number regex"));

/// Outcome of parsing, including whether the default plan was substituted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSpecification {
    pub specification: Specification,
    pub used_fallback: bool,
}

/// Parse specification text, falling back to the default plan when needed
pub fn parse_specification(text: &str) -> Specification {
    parse_specification_detailed(text).specification
}

/// Parse specification text and report whether the fallback plan was used
pub fn parse_specification_detailed(text: &str) -> ParsedSpecification {
    let body = text.split(END_MARKER).next().unwrap_or(text);
    let sections = split_sections(body);

    let title = sections
        .get("TITLE")
        .and_then(|s| s.lines().map(str::trim).find(|l| !l.is_empty()))
        .map(str::to_string);

    let description = sections
        .get("DESCRIPTION")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let tasks = sections.get("TASKS").map(|s| parse_tasks(s)).unwrap_or_default();

    let requirements = sections.get("REQUIREMENTS").map(|s| parse_list(s)).unwrap_or_default();
    let architecture = sections.get("ARCHITECTURE").map(|s| parse_list(s)).unwrap_or_default();
    let acceptance_criteria = sections
        .get("ACCEPTANCE_CRITERIA")
        .map(|s| parse_list(s))
        .unwrap_or_default();
    let dependencies = sections
        .get("DEPENDENCIES")
        .map(|s| parse_external_dependencies(s))
        .unwrap_or_default();
    let priority = sections
        .get("PRIORITY")
        .map(|s| Priority::parse_lenient(s))
        .unwrap_or_default();

    let used_fallback = title.is_none() || tasks.is_empty();
    let tasks = if used_fallback {
        warn!(
            has_title = title.is_some(),
            task_count = tasks.len(),
            "Specification incomplete, using default three-task plan"
        );
        default_tasks()
    } else {
        tasks
    };

    let title = title.unwrap_or_else(|| "Untitled Specification".to_string());
    let description = if description.is_empty() && used_fallback {
        body.trim().to_string()
    } else {
        description
    };

    let task_hours: u32 = tasks.iter().map(|t| t.estimated_duration_hours).sum();
    let estimated_duration_hours = sections
        .get("ESTIMATED_DURATION")
        .and_then(|s| first_number(s))
        .unwrap_or(task_hours);

    let mut specification = Specification::new(specification_id(&title), title);
    specification.description = description;
    specification.requirements = requirements;
    specification.architecture = architecture;
    specification.tasks = tasks;
    specification.acceptance_criteria = acceptance_criteria;
    specification.priority = priority;
    specification.estimated_duration_hours = estimated_duration_hours;
    specification.dependencies = dependencies;

    debug!(
        spec_id = %specification.id,
        tasks = specification.tasks.len(),
        requirements = specification.requirements.len(),
        "Parsed specification"
    );

    ParsedSpecification {
        specification,
        used_fallback,
    }
}

/// Default plan: design, then implementation, then testing
pub fn default_tasks() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition {
            id: "task-001".to_string(),
            task_type: TaskType::Design,
            description: "Design the system architecture and component interfaces".to_string(),
            assigned_agent_type: AgentType::Architect,
            dependencies: Vec::new(),
            estimated_duration_hours: 4,
            acceptance_criteria: "Architecture documented and reviewed".to_string(),
        },
        TaskDefinition {
            id: "task-002".to_string(),
            task_type: TaskType::Implementation,
            description: "Implement the designed components".to_string(),
            assigned_agent_type: AgentType::Coder,
            dependencies: vec!["task-001".to_string()],
            estimated_duration_hours: 8,
            acceptance_criteria: "All components implemented".to_string(),
        },
        TaskDefinition {
            id: "task-003".to_string(),
            task_type: TaskType::Testing,
            description: "Write and run tests for the implementation".to_string(),
            assigned_agent_type: AgentType::Tester,
            dependencies: vec!["task-002".to_string()],
            estimated_duration_hours: 4,
            acceptance_criteria: "Tests pass with adequate coverage".to_string(),
        },
    ]
}

/// Stable id derived from the title so resubmitting the same text updates one record
fn specification_id(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(48).collect();
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("spec-{}", &suffix[..8])
    } else {
        format!("spec-{}", slug)
    }
}

fn split_sections(body: &str) -> HashMap<String, String> {
    let headers: Vec<(String, usize, usize)> = SECTION_RE
        .captures_iter(body)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            Some((name, whole.start(), whole.end()))
        })
        .collect();

    let mut sections = HashMap::new();
    for (idx, (name, _, content_start)) in headers.iter().enumerate() {
        let content_end = headers.get(idx + 1).map(|(_, start, _)| *start).unwrap_or(body.len());
        let content = body[*content_start..content_end].trim().to_string();
        sections.entry(name.clone()).or_insert(content);
    }

    sections
}

fn parse_tasks(section: &str) -> Vec<TaskDefinition> {
    let headers: Vec<(String, String, usize, usize)> = TASK_HEADER_RE
        .captures_iter(section)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().to_string();
            let heading = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            Some((number, heading, whole.start(), whole.end()))
        })
        .collect();

    headers
        .iter()
        .enumerate()
        .map(|(idx, (number, heading, _, block_start))| {
            let block_end = headers.get(idx + 1).map(|h| h.2).unwrap_or(section.len());
            parse_task_block(number, heading, &section[*block_start..block_end])
        })
        .collect()
}

fn parse_task_block(number: &str, heading: &str, block: &str) -> TaskDefinition {
    let mut fields: HashMap<String, String> = HashMap::new();
    for caps in TASK_FIELD_RE.captures_iter(block) {
        if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
            fields
                .entry(key.as_str().to_lowercase())
                .or_insert_with(|| value.as_str().trim().to_string());
        }
    }

    let id = format!("task-{}", number);
    let task_type = fields
        .get("type")
        .map(|t| TaskType::parse_lenient(t))
        .unwrap_or(TaskType::Implementation);

    let description = fields
        .get("description")
        .filter(|d| !d.is_empty())
        .cloned()
        .or_else(|| (!heading.is_empty()).then(|| heading.to_string()))
        .unwrap_or_else(|| format!("Task {}", id));

    let assigned_agent_type = fields
        .get("agent")
        .and_then(|a| a.parse::<AgentType>().ok())
        .unwrap_or_else(|| task_type.default_agent_type());

    TaskDefinition {
        dependencies: fields
            .get("dependencies")
            .map(|d| parse_task_dependencies(d))
            .unwrap_or_default(),
        estimated_duration_hours: fields.get("duration").and_then(|d| first_number(d)).unwrap_or(1),
        acceptance_criteria: fields.get("acceptance").cloned().unwrap_or_default(),
        id,
        task_type,
        description,
        assigned_agent_type,
    }
}

fn parse_task_dependencies(value: &str) -> Vec<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    value
        .split(',')
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty() && d != "none")
        .collect()
}

fn parse_external_dependencies(section: &str) -> Vec<String> {
    let items = parse_list(section);
    if items.len() == 1 && !items[0].contains(' ') && items[0].contains(',') {
        return items[0]
            .split(',')
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
    }

    items
        .into_iter()
        .filter(|item| !item.eq_ignore_ascii_case("none"))
        .collect()
}

fn parse_list(section: &str) -> Vec<String> {
    section
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            LIST_ITEM_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect()
}

fn first_number(text: &str) -> Option<u32> {
    NUMBER_RE.find(text).and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_SPEC: &str = r#"
TITLE: Inventory Service
DESCRIPTION: REST service tracking stock levels
across warehouses.
REQUIREMENTS:
- REQ-001: Expose CRUD endpoints for items
- REQ-002: Persist stock movements
ARCHITECTURE:
- HTTP layer
- Storage layer
TASKS:
TASK-001: Schema design
- Type: design
- Description: Design the storage schema
- Agent: architect
- Dependencies: none
- Duration: 4
- Acceptance: Schema reviewed
TASK-002:
- Type: implementation
- Description: Build the endpoints
- Agent: coder
- Dependencies: TASK-001
- Duration: 8
- Acceptance: Endpoints respond
TASK-003:
- Type: deployment
- Agent: wizard
- Dependencies: TASK-001, TASK-002
- Duration: about 3 hours
ACCEPTANCE_CRITERIA:
- All endpoints covered by tests
PRIORITY: high
ESTIMATED_DURATION: 20 hours
DEPENDENCIES:
- PostgreSQL
---END_SPEC---
TITLE: ignored after the marker
"#;

    #[test]
    fn test_parse_full_specification() {
        let parsed = parse_specification_detailed(FULL_SPEC);
        assert!(!parsed.used_fallback);

        let spec = parsed.specification;
        assert_eq!(spec.id, "spec-inventory-service");
        assert_eq!(spec.title, "Inventory Service");
        assert!(spec.description.starts_with("REST service"));
        assert_eq!(spec.requirements, vec![
            "Expose CRUD endpoints for items".to_string(),
            "Persist stock movements".to_string(),
        ]);
        assert_eq!(spec.architecture.len(), 2);
        assert_eq!(spec.priority, Priority::High);
        assert_eq!(spec.estimated_duration_hours, 20);
        assert_eq!(spec.dependencies, vec!["PostgreSQL".to_string()]);
        assert_eq!(spec.acceptance_criteria.len(), 1);

        assert_eq!(spec.tasks.len(), 3);
        let design = &spec.tasks[0];
        assert_eq!(design.id, "task-001");
        assert_eq!(design.task_type, TaskType::Design);
        assert_eq!(design.assigned_agent_type, AgentType::Architect);
        assert!(design.dependencies.is_empty());
        assert_eq!(design.estimated_duration_hours, 4);
        assert_eq!(design.acceptance_criteria, "Schema reviewed");

        let build = &spec.tasks[1];
        assert_eq!(build.dependencies, vec!["task-001".to_string()]);

        let odd = &spec.tasks[2];
        assert_eq!(odd.task_type, TaskType::Implementation);
        assert_eq!(odd.assigned_agent_type, AgentType::Coder);
        assert_eq!(odd.dependencies.len(), 2);
        assert_eq!(odd.estimated_duration_hours, 3);
        assert_eq!(odd.description, "Task task-003");
    }

    #[test]
    fn test_missing_tasks_section_uses_fallback() {
        let parsed = parse_specification_detailed("TITLE: Half done\nDESCRIPTION: no tasks here\n");
        assert!(parsed.used_fallback);

        let spec = parsed.specification;
        assert_eq!(spec.title, "Half done");
        let ids: Vec<&str> = spec.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["task-001", "task-002", "task-003"]);
        let agents: Vec<AgentType> = spec.tasks.iter().map(|t| t.assigned_agent_type).collect();
        assert_eq!(agents, vec![AgentType::Architect, AgentType::Coder, AgentType::Tester]);
    }

    #[test]
    fn test_free_text_uses_fallback() {
        let spec = parse_specification("build me something nice");
        assert_eq!(spec.title, "Untitled Specification");
        assert_eq!(spec.description, "build me something nice");
        assert_eq!(spec.tasks.len(), 3);
        assert_eq!(spec.estimated_duration_hours, 16);
    }

    #[test]
    fn test_inline_dependency_list() {
        let deps = parse_external_dependencies("tokio, serde, tracing");
        assert_eq!(deps, vec!["tokio", "serde", "tracing"]);
        assert!(parse_external_dependencies("none").is_empty());
    }

    #[test]
    fn test_specification_id_slug() {
        assert_eq!(specification_id("  Hello, World!  "), "spec-hello-world");
        assert!(specification_id("???").starts_with("spec-"));
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::{parse_timestamp, ExecutionRecord, Page};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const BUILTIN: &str = include_str!("../fixtures/executions.json");

fn timestamp(value: &Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().and_then(parse_timestamp)
}

/// The executions the server answers from, steps included.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    executions: Vec<ExecutionRecord>,
}

impl Dataset {
    pub fn new(executions: Vec<ExecutionRecord>) -> Self {
        Self { executions }
    }

    pub fn builtin() -> Result<Self> {
        let executions = serde_json::from_str(BUILTIN).context("Failed to parse built-in fixtures")?;
        Ok(Self::new(executions))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixtures file: {:?}", path))?;
        let executions = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixtures file: {:?}", path))?;
        Ok(Self::new(executions))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// One page of executions, most recently finished first. Executions still
    /// running sort before finished ones. Steps are not included.
    pub fn page(&self, page: u64, page_size: u64, batch: Option<&str>) -> Page<ExecutionRecord> {
        let mut matching: Vec<&ExecutionRecord> = self
            .executions
            .iter()
            .filter(|e| batch.map_or(true, |b| e.name == b))
            .collect();
        matching.sort_by_key(|e| {
            let finished = timestamp(&e.finished);
            std::cmp::Reverse((finished.is_none(), finished))
        });

        let items = matching
            .iter()
            .skip(page.saturating_mul(page_size) as usize)
            .take(page_size as usize)
            .map(|e| without_steps(e))
            .collect();
        Page {
            total: matching.len() as u64,
            items,
        }
    }

    /// Latest execution of every batch name, by start time.
    pub fn last_executions(&self) -> Page<ExecutionRecord> {
        let mut latest: BTreeMap<&str, &ExecutionRecord> = BTreeMap::new();
        for execution in &self.executions {
            let newer = match latest.get(execution.name.as_str()) {
                Some(current) => timestamp(&execution.started) > timestamp(&current.started),
                None => true,
            };
            if newer {
                latest.insert(execution.name.as_str(), execution);
            }
        }
        let items: Vec<ExecutionRecord> = latest.values().map(|e| without_steps(e)).collect();
        Page {
            total: items.len() as u64,
            items,
        }
    }

    /// The execution with its steps ordered by start time.
    pub fn execution(&self, id: &str) -> Option<ExecutionRecord> {
        let mut execution = self.executions.iter().find(|e| e.id == id)?.clone();
        execution.steps.sort_by_key(|s| timestamp(&s.started));
        Some(execution)
    }
}

fn without_steps(execution: &ExecutionRecord) -> ExecutionRecord {
    ExecutionRecord {
        steps: Vec::new(),
        ..execution.clone()
    }
}

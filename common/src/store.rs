use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FetchError;
use crate::rpc::Method;

/// State of one tracked query.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Loading,
    Error { message: String },
    Data { value: Value },
}

impl FetchOutcome {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchOutcome::Loading)
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            FetchOutcome::Data { value } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FetchOutcome::Error { message } => Some(message),
            _ => None,
        }
    }
}

impl From<Result<Value, FetchError>> for FetchOutcome {
    fn from(result: Result<Value, FetchError>) -> Self {
        match result {
            Ok(value) => FetchOutcome::Data { value },
            Err(e) => FetchOutcome::Error {
                message: e.to_string(),
            },
        }
    }
}

/// Identity of a tracked query: the primary method, its params in canonical
/// JSON form, and the parameterless calls batched alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    pub method: Method,
    pub query: String,
    pub auxiliary: Vec<Method>,
}

impl FetchKey {
    pub fn new(method: Method, params: &Value) -> Self {
        Self {
            method,
            query: canonical(params),
            auxiliary: Vec::new(),
        }
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.method, self.query)?;
        for aux in &self.auxiliary {
            write!(f, "+{}", aux)?;
        }
        Ok(())
    }
}

/// JSON text with object keys sorted, so params equal by value give equal keys.
fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

/// Handed out when a fetch starts; only the ticket of the latest fetch for
/// a key can complete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: FetchKey,
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    outcome: FetchOutcome,
}

/// Outcome store shared by every view that reads the same query.
///
/// Writes replace the whole outcome at a key. A view that wants its own
/// isolated state simply owns a separate store.
#[derive(Debug, Default)]
pub struct FetchStore {
    slots: DashMap<FetchKey, Slot>,
    generations: AtomicU64,
}

impl FetchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as loading and supersedes any fetch still in flight for it.
    pub fn begin(&self, key: &FetchKey) -> Ticket {
        let generation = self.next_generation();
        self.slots.insert(
            key.clone(),
            Slot {
                generation,
                outcome: FetchOutcome::Loading,
            },
        );
        Ticket {
            key: key.clone(),
            generation,
        }
    }

    /// Stores the outcome of the fetch identified by `ticket`. Returns false
    /// when a newer fetch started meanwhile, in which case nothing changes.
    pub fn complete(&self, ticket: Ticket, outcome: FetchOutcome) -> bool {
        if let Some(mut slot) = self.slots.get_mut(&ticket.key) {
            if slot.generation == ticket.generation {
                slot.outcome = outcome;
                return true;
            }
        }
        log::debug!(
            "Discarding stale response for {} (generation {})",
            ticket.key,
            ticket.generation
        );
        false
    }

    pub fn get(&self, key: &FetchKey) -> Option<FetchOutcome> {
        self.slots.get(key).map(|slot| slot.outcome.clone())
    }

    pub fn is_loading(&self, key: &FetchKey) -> bool {
        self.slots
            .get(key)
            .map(|slot| slot.outcome.is_loading())
            .unwrap_or(false)
    }

    /// Drops the slot of a key no view reads anymore. A fetch still in
    /// flight for it completes into nothing.
    pub fn remove(&self, key: &FetchKey) -> Option<FetchOutcome> {
        self.slots.remove(key).map(|(_, slot)| slot.outcome)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A view's query. The owner updates params as its inputs change and asks
/// `needs_fetch` to decide whether a new request must go out.
#[derive(Debug, Clone)]
pub struct Query {
    method: Method,
    params: Value,
    auxiliary: Vec<Method>,
    fetched: Option<FetchKey>,
    invalidated: bool,
}

impl Query {
    pub fn new(method: Method, params: Value) -> Self {
        Self {
            method,
            params,
            auxiliary: Vec::new(),
            fetched: None,
            invalidated: false,
        }
    }

    /// Adds a parameterless call sent in the same batch, after the primary one.
    pub fn with_auxiliary(mut self, method: Method) -> Self {
        self.auxiliary.push(method);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn auxiliary(&self) -> &[Method] {
        &self.auxiliary
    }

    pub fn current_key(&self) -> FetchKey {
        let mut key = FetchKey::new(self.method.clone(), &self.params);
        key.auxiliary = self.auxiliary.clone();
        key
    }

    pub fn set_params(&mut self, params: Value) {
        self.params = params;
    }

    /// Forces the next `needs_fetch` to answer true even if nothing changed.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub fn needs_fetch(&self) -> bool {
        self.invalidated || self.fetched.as_ref() != Some(&self.current_key())
    }

    /// Key of the last fetch issued for this query.
    pub fn fetched_key(&self) -> Option<&FetchKey> {
        self.fetched.as_ref()
    }

    /// Records that a fetch for the current key is being issued.
    pub fn mark_fetched(&mut self) -> FetchKey {
        let key = self.current_key();
        self.fetched = Some(key.clone());
        self.invalidated = false;
        key
    }
}

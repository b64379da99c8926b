use serde_json::{json, Map, Value};
use url::form_urlencoded;

use crate::execution::{ExecutionRecord, Page};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Pagination and filter of a list view. `page` is 0-based here and 1-based
/// in URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    pub page: u32,
    pub page_size: u32,
    pub batch: Option<String>,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            batch: None,
        }
    }
}

impl PaginationState {
    pub fn from_query(query: &str) -> Self {
        Self::from_query_with_size(query, DEFAULT_PAGE_SIZE)
    }

    /// Reads `page`, `size` and `batch`. Unparsable values fall back to the
    /// defaults, an empty `batch` means no filter.
    pub fn from_query_with_size(query: &str, default_size: u32) -> Self {
        let mut state = Self {
            page_size: default_size.max(1),
            ..Self::default()
        };
        for (name, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match name.as_ref() {
                "page" => {
                    if let Ok(page) = value.trim().parse::<i64>() {
                        state.page = page.saturating_sub(1).clamp(0, u32::MAX as i64) as u32;
                    }
                }
                "size" => {
                    if let Ok(size) = value.trim().parse::<u32>() {
                        if size > 0 {
                            state.page_size = size;
                        }
                    }
                }
                "batch" => {
                    state.batch = Some(value.into_owned()).filter(|b| !b.is_empty());
                }
                _ => {}
            }
        }
        state
    }

    /// URL form of the state, page back to 1-based.
    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.append_pair("page", &self.page.saturating_add(1).to_string());
        serializer.append_pair("size", &self.page_size.to_string());
        if let Some(batch) = &self.batch {
            serializer.append_pair("batch", batch);
        }
        serializer.finish()
    }

    /// RPC params of the paginated listing.
    pub fn to_params(&self) -> Value {
        let mut params = Map::new();
        params.insert("page".into(), json!(self.page));
        params.insert("pageSize".into(), json!(self.page_size));
        if let Some(batch) = &self.batch {
            params.insert("batch".into(), json!(batch));
        }
        Value::Object(params)
    }

    pub fn page_count(&self, total: u64) -> u64 {
        total.div_ceil(self.page_size.max(1) as u64).max(1)
    }
}

/// Reconciles URL parameters with the state a view already holds.
///
/// The URL only matters on first load; after that the in-memory state wins
/// and nothing needs refetching.
pub fn reconcile(url_query: &str, current: Option<&PaginationState>) -> (PaginationState, bool) {
    reconcile_with_size(url_query, current, DEFAULT_PAGE_SIZE)
}

pub fn reconcile_with_size(
    url_query: &str,
    current: Option<&PaginationState>,
    default_size: u32,
) -> (PaginationState, bool) {
    match current {
        Some(state) => (state.clone(), false),
        None => (
            PaginationState::from_query_with_size(url_query, default_size),
            true,
        ),
    }
}

/// A user-driven change to a list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageChange {
    /// 1-based, as shown to the user.
    Page(u32),
    Size(u32),
    Batch(Option<String>),
    Next,
    Previous,
}

/// Keeps a list view's pagination and its location in step. Changes are
/// pushed as new history entries without reloading the view.
#[derive(Debug, Clone)]
pub struct QuerySync {
    path: String,
    default_size: u32,
    state: Option<PaginationState>,
    history: Vec<String>,
}

impl QuerySync {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_size: DEFAULT_PAGE_SIZE,
            state: None,
            history: Vec::new(),
        }
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.default_size = size.max(1);
        self
    }

    /// Called when the view is shown for `url_query`.
    pub fn load(&mut self, url_query: &str) -> (PaginationState, bool) {
        let (state, refetch) = reconcile_with_size(url_query, self.state.as_ref(), self.default_size);
        if self.history.is_empty() {
            let query = url_query.trim_start_matches('?');
            self.history.push(if query.is_empty() {
                self.path.clone()
            } else {
                format!("{}?{}", self.path, query)
            });
        }
        self.state = Some(state.clone());
        (state, refetch)
    }

    /// Applies `change`, pushes the matching location and returns the new state.
    pub fn change(&mut self, change: PageChange) -> PaginationState {
        let mut state = self.state.clone().unwrap_or_else(|| PaginationState {
            page_size: self.default_size,
            ..PaginationState::default()
        });
        match change {
            PageChange::Page(page) => state.page = page.saturating_sub(1),
            PageChange::Size(size) => state.page_size = size.max(1),
            PageChange::Batch(batch) => {
                state.batch = batch.filter(|b| !b.is_empty());
                state.page = 0;
            }
            PageChange::Next => state.page = state.page.saturating_add(1),
            PageChange::Previous => state.page = state.page.saturating_sub(1),
        }
        self.history.push(format!("{}?{}", self.path, state.to_query()));
        self.state = Some(state.clone());
        state
    }

    pub fn state(&self) -> Option<&PaginationState> {
        self.state.as_ref()
    }

    /// Current location, `path?query`.
    pub fn location(&self) -> String {
        match &self.state {
            Some(state) => format!("{}?{}", self.path, state.to_query()),
            None => self.path.clone(),
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

/// Splits a payload into the primary result and the auxiliary one. Accepts
/// both the two-element batch shape and a bare single result.
pub fn split_payload(value: &Value) -> (Value, Option<Value>) {
    match value {
        Value::Array(items) if !items.is_empty() => (items[0].clone(), items.get(1).cloned()),
        other => (other.clone(), None),
    }
}

/// Distinct batch names of a listing, sorted.
pub fn batch_names(page: &Page<ExecutionRecord>) -> Vec<String> {
    let mut names: Vec<String> = page
        .items
        .iter()
        .map(|r| r.name.clone())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_round_trip_is_one_based() {
        let (state, refetch) = reconcile("page=3&size=20&batch=nightly", None);
        assert!(refetch);
        assert_eq!(
            state,
            PaginationState {
                page: 2,
                page_size: 20,
                batch: Some("nightly".into())
            }
        );
        assert_eq!(state.to_query(), "page=3&size=20&batch=nightly");
    }

    #[test]
    fn defaults_when_url_is_empty() {
        let (state, _) = reconcile("", None);
        assert_eq!(state, PaginationState::default());
        assert_eq!(state.to_query(), "page=1&size=10");
    }

    #[test]
    fn bad_values_fall_back() {
        let state = PaginationState::from_query("?page=zero&size=0&batch=");
        assert_eq!(state, PaginationState::default());
        assert_eq!(PaginationState::from_query("page=0").page, 0);
        assert_eq!(PaginationState::from_query("page=-4").page, 0);
    }

    #[test]
    fn encoded_batch_names() {
        let state = PaginationState::from_query("batch=daily%20export");
        assert_eq!(state.batch.as_deref(), Some("daily export"));
        assert_eq!(state.to_query(), "page=1&size=10&batch=daily+export");
    }

    #[test]
    fn existing_state_wins_over_url() {
        let current = PaginationState {
            page: 4,
            page_size: 50,
            batch: None,
        };
        let (state, refetch) = reconcile("page=1", Some(&current));
        assert_eq!(state, current);
        assert!(!refetch);
    }

    #[test]
    fn params_skip_empty_filter() {
        let state = PaginationState::default();
        assert_eq!(state.to_params(), json!({"page": 0, "pageSize": 10}));
        let filtered = PaginationState {
            batch: Some("nightly".into()),
            ..state
        };
        assert_eq!(
            filtered.to_params(),
            json!({"page": 0, "pageSize": 10, "batch": "nightly"})
        );
    }

    #[test]
    fn changes_push_locations() {
        let mut sync = QuerySync::new("/executions");
        sync.load("page=2");
        sync.change(PageChange::Next);
        sync.change(PageChange::Batch(Some("nightly".into())));
        let state = sync.change(PageChange::Size(25));

        assert_eq!(state.page, 0);
        assert_eq!(state.page_size, 25);
        assert_eq!(
            sync.history(),
            [
                "/executions?page=2",
                "/executions?page=3&size=10",
                "/executions?page=1&size=10&batch=nightly",
                "/executions?page=1&size=25&batch=nightly",
            ]
        );
        assert_eq!(sync.location(), "/executions?page=1&size=25&batch=nightly");
    }

    #[test]
    fn reload_keeps_in_memory_state() {
        let mut sync = QuerySync::new("/executions").with_page_size(20);
        let (first, refetch) = sync.load("");
        assert!(refetch);
        assert_eq!(first.page_size, 20);
        sync.change(PageChange::Page(5));
        let (state, refetch) = sync.load("page=1");
        assert!(!refetch);
        assert_eq!(state.page, 4);
    }

    #[test]
    fn previous_stops_at_first_page() {
        let mut sync = QuerySync::new("/executions");
        sync.load("");
        assert_eq!(sync.change(PageChange::Previous).page, 0);
    }

    #[test]
    fn split_accepts_both_shapes() {
        let batch = json!([{"total": 1}, {"total": 2}]);
        assert_eq!(
            split_payload(&batch),
            (json!({"total": 1}), Some(json!({"total": 2})))
        );
        let single = json!({"total": 1});
        assert_eq!(split_payload(&single), (json!({"total": 1}), None));
    }

    #[test]
    fn page_count_rounds_up() {
        let state = PaginationState::default();
        assert_eq!(state.page_count(0), 1);
        assert_eq!(state.page_count(10), 1);
        assert_eq!(state.page_count(11), 2);
    }

    #[test]
    fn batch_names_are_distinct() {
        let page: Page<ExecutionRecord> = serde_json::from_value(json!({
            "total": 3,
            "items": [{"id": "1", "name": "b"}, {"id": "2", "name": "a"}, {"id": "3", "name": "b"}]
        }))
        .unwrap();
        assert_eq!(batch_names(&page), ["a", "b"]);
    }
}

use std::fmt;

use crate::extensions::Extensions;

/// A path plus its query string, without the leading `?`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub path: String,
    pub query: String,
}

impl Location {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, query),
            None => (s, ""),
        };
        let path = path.trim_end_matches('/');
        Self {
            path: if path.is_empty() {
                "/".to_string()
            } else if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            },
            query: query.to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            f.write_str(&self.path)
        } else {
            write!(f, "{}?{}", self.path, self.query)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Executions,
    LastExecutions,
    Execution { id: String },
    Extension { path: String },
}

impl Route {
    /// Matches a path against the built-in routes, then the extension ones.
    /// Anything else lands on the home page.
    pub fn resolve(location: &Location, extensions: &Extensions) -> Route {
        let path = location.path.as_str();
        match path {
            "/" => return Route::Home,
            "/executions" => return Route::Executions,
            "/last-executions" => return Route::LastExecutions,
            _ => {}
        }
        if let Some(id) = path.strip_prefix("/execution/") {
            if !id.is_empty() && !id.contains('/') {
                // ids are percent-encoded in the path, malformed ones pass through
                let id = urlencoding::decode(id).map(|d| d.into_owned()).unwrap_or_else(|_| id.to_string());
                return Route::Execution { id };
            }
        }
        if extensions.extra_routes().iter().any(|r| r.path == path) {
            return Route::Extension {
                path: path.to_string(),
            };
        }
        log::debug!("No route for {}, redirecting home", path);
        Route::Home
    }
}

/// Side menu entry. `key` defaults to the path when an extension leaves it empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub key: String,
    pub path: String,
    pub title: String,
}

impl MenuEntry {
    pub fn new(key: impl Into<String>, path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            title: title.into(),
        }
    }
}

pub fn menu(extensions: &Extensions) -> Vec<MenuEntry> {
    let mut entries = vec![
        MenuEntry::new("home", "/", "Home"),
        MenuEntry::new("executions", "/executions", "Execution history"),
        MenuEntry::new("last-executions", "/last-executions", "Last Executions"),
    ];
    entries.extend(extensions.extra_routes().into_iter().map(|mut entry| {
        if entry.key.is_empty() {
            entry.key = entry.path.clone();
        }
        entry
    }));
    entries
}

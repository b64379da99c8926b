use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::report::Column;
use crate::routes::MenuEntry;
use crate::rpc::Method;

pub type RouteProvider = Arc<dyn Fn() -> Vec<MenuEntry> + Send + Sync>;
pub type CommentFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;
pub type ColumnTransform = Arc<dyn Fn(Vec<Column>, &Method) -> Vec<Column> + Send + Sync>;
pub type HeaderProvider = Arc<dyn Fn() -> Vec<(String, String)> + Send + Sync>;
pub type Bootstrap = Arc<dyn Fn(&mut Config) + Send + Sync>;

/// Optional behaviour overrides handed to the composition root at startup.
/// Every hook left unset behaves as identity or no-op.
#[derive(Clone, Default)]
pub struct Extensions {
    pub routes: Option<RouteProvider>,
    pub comment_formatter: Option<CommentFormatter>,
    pub table_columns: Option<ColumnTransform>,
    pub headers: Option<HeaderProvider>,
    pub bootstrap: Option<Bootstrap>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(mut self, routes: impl Fn() -> Vec<MenuEntry> + Send + Sync + 'static) -> Self {
        self.routes = Some(Arc::new(routes));
        self
    }

    pub fn with_comment_formatter(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.comment_formatter = Some(Arc::new(f));
        self
    }

    pub fn with_table_columns(
        mut self,
        f: impl Fn(Vec<Column>, &Method) -> Vec<Column> + Send + Sync + 'static,
    ) -> Self {
        self.table_columns = Some(Arc::new(f));
        self
    }

    pub fn with_headers(mut self, f: impl Fn() -> Vec<(String, String)> + Send + Sync + 'static) -> Self {
        self.headers = Some(Arc::new(f));
        self
    }

    pub fn with_bootstrap(mut self, f: impl Fn(&mut Config) + Send + Sync + 'static) -> Self {
        self.bootstrap = Some(Arc::new(f));
        self
    }

    pub fn extra_routes(&self) -> Vec<MenuEntry> {
        self.routes.as_ref().map(|f| f()).unwrap_or_default()
    }

    pub fn format_comment(&self, comment: &str) -> String {
        match &self.comment_formatter {
            Some(f) => f(comment),
            None => comment.to_string(),
        }
    }

    pub fn wrap_columns(&self, columns: Vec<Column>, method: &Method) -> Vec<Column> {
        match &self.table_columns {
            Some(f) => f(columns, method),
            None => columns,
        }
    }

    pub fn extra_headers(&self) -> Vec<(String, String)> {
        self.headers.as_ref().map(|f| f()).unwrap_or_default()
    }

    /// Runs the bootstrap hook over the loaded configuration.
    pub fn bootstrap(&self, config: &mut Config) {
        if let Some(f) = &self.bootstrap {
            f(config);
        }
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("routes", &self.routes.is_some())
            .field("comment_formatter", &self.comment_formatter.is_some())
            .field("table_columns", &self.table_columns.is_some())
            .field("headers", &self.headers.is_some())
            .field("bootstrap", &self.bootstrap.is_some())
            .finish()
    }
}

use anyhow::{anyhow, Result};
use common::query::batch_names;
use common::{
    project, report_columns, split_payload, Config, ExecutionRecord, Extensions, FetchOutcome,
    FetchStore, Location, Method, Page, PageChange, PaginationState, ProjectionOptions, Query,
    QuerySync, ReportRow, Route, RpcClient,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render::{self, OutputFormat};

const WELCOME: &str = "Welcome to the batch UI. Please select a link from the menu.";

/// Composition root: one client and one outcome store shared by every view.
pub struct Dashboard {
    config: Config,
    client: RpcClient,
    store: FetchStore,
    extensions: Extensions,
}

impl Dashboard {
    pub fn new(mut config: Config, extensions: Extensions) -> Result<Self> {
        extensions.bootstrap(&mut config);
        let client = RpcClient::from_config(&config.client, &extensions)?;
        Ok(Self {
            config,
            client,
            store: FetchStore::new(),
            extensions,
        })
    }

    pub async fn open(&self, location: &Location, format: OutputFormat) -> Result<()> {
        log::debug!("Opening {}", location);
        match Route::resolve(location, &self.extensions) {
            Route::Home => {
                self.home();
                Ok(())
            }
            Route::Executions => ExecutionsView::new(self, &location.query).show(format).await,
            Route::LastExecutions => self.last_executions(format).await,
            Route::Execution { id } => self.execution(&id, format).await,
            Route::Extension { path } => {
                println!("{} is provided by an extension and has no terminal view.", path);
                Ok(())
            }
        }
    }

    pub fn home(&self) {
        println!("{}", WELCOME);
        println!("{}", render::menu(&common::routes::menu(&self.extensions)));
    }

    async fn load(&self, query: &mut Query) -> Result<Value> {
        if query.needs_fetch() {
            render::loading();
        }
        data(self.client.refresh(&self.store, query).await)
    }

    pub async fn load_last_executions(&self) -> Result<Vec<ReportRow>> {
        let mut query = Query::new(Method::LastExecutions, json!({}));
        let page: Page<ExecutionRecord> = serde_json::from_value(self.load(&mut query).await?)?;
        Ok(project(
            &page.items,
            &ProjectionOptions::sorted_by("finished", true).with_duration(),
        ))
    }

    pub async fn last_executions(&self, format: OutputFormat) -> Result<()> {
        let rows = self.load_last_executions().await?;
        if format == OutputFormat::Table {
            println!("Last Executions");
        }
        let columns = self
            .extensions
            .wrap_columns(report_columns(true, false), &Method::LastExecutions);
        render::print_rows(&rows, &columns, format, &self.extensions)
    }

    pub async fn load_execution(&self, id: &str) -> Result<(ExecutionRecord, Vec<ReportRow>)> {
        let mut query = Query::new(Method::Execution, json!({ "id": id }));
        let record: ExecutionRecord = serde_json::from_value(self.load(&mut query).await?)?;
        let steps = project(
            &record.steps,
            &ProjectionOptions::sorted_by("started", false).with_duration(),
        );
        Ok((record, steps))
    }

    pub async fn execution(&self, id: &str, format: OutputFormat) -> Result<()> {
        let (record, steps) = self.load_execution(id).await?;
        let columns = self
            .extensions
            .wrap_columns(report_columns(true, true), &Method::Execution);
        if format != OutputFormat::Table {
            return render::print_rows(&steps, &columns, format, &self.extensions);
        }

        let duration = common::report::duration(record.started.as_deref(), record.finished.as_deref());
        println!("Job Execution #{}", id);
        println!("{}", render::details(&record, &duration, &self.extensions));
        println!("Steps");
        render::print_rows(&steps, &columns, format, &self.extensions)
    }

    /// Interactive paging over the execution history. Other routes are just
    /// opened once.
    pub async fn browse(&self, location: &Location, format: OutputFormat) -> Result<()> {
        if Route::resolve(location, &self.extensions) != Route::Executions {
            return self.open(location, format).await;
        }

        let mut view = ExecutionsView::new(self, &location.query);
        if let Err(e) = view.show(format).await {
            eprintln!("Error: {}", e);
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        eprint!("> ");
        while let Some(line) = lines.next_line().await? {
            match parse_command(&line) {
                Some(BrowseCommand::Quit) => break,
                Some(BrowseCommand::Refresh) => view.query.invalidate(),
                Some(BrowseCommand::Change(change)) => view.apply(change),
                None => {
                    eprintln!("Commands: n, p, page N, size N, batch [NAME], r, q");
                    eprint!("> ");
                    continue;
                }
            }
            if let Err(e) = view.show(format).await {
                eprintln!("Error: {}", e);
            }
            eprint!("> ");
        }
        Ok(())
    }
}

fn data(outcome: FetchOutcome) -> Result<Value> {
    match outcome {
        FetchOutcome::Data { value } => Ok(value),
        FetchOutcome::Error { message } => Err(anyhow!(message)),
        FetchOutcome::Loading => Err(anyhow!("Request still in flight")),
    }
}

/// What the execution history view renders.
#[derive(Debug)]
pub struct ExecutionsModel {
    pub state: PaginationState,
    pub rows: Vec<ReportRow>,
    pub total: u64,
    pub batches: Vec<String>,
}

/// Paginated execution history with its batch filter. The batch names come
/// from the last-executions call sent in the same batch request.
pub struct ExecutionsView<'a> {
    dashboard: &'a Dashboard,
    sync: QuerySync,
    query: Query,
}

impl<'a> ExecutionsView<'a> {
    pub fn new(dashboard: &'a Dashboard, url_query: &str) -> Self {
        let mut sync = QuerySync::new("/executions").with_page_size(dashboard.config.client.page_size);
        let (state, _) = sync.load(url_query);
        let query = Query::new(Method::Executions, state.to_params())
            .with_auxiliary(Method::LastExecutions);
        Self {
            dashboard,
            sync,
            query,
        }
    }

    pub fn apply(&mut self, change: PageChange) {
        let state = self.sync.change(change);
        self.query.set_params(state.to_params());
    }

    pub fn location(&self) -> String {
        self.sync.location()
    }

    pub async fn load(&mut self) -> Result<ExecutionsModel> {
        let value = self.dashboard.load(&mut self.query).await?;
        let (primary, auxiliary) = split_payload(&value);
        let page: Page<ExecutionRecord> = serde_json::from_value(primary)?;
        let batches = match auxiliary {
            Some(aux) => batch_names(&serde_json::from_value(aux)?),
            None => Vec::new(),
        };
        Ok(ExecutionsModel {
            state: self.sync.state().cloned().unwrap_or_default(),
            rows: project(&page.items, &ProjectionOptions::default()),
            total: page.total,
            batches,
        })
    }

    pub async fn show(&mut self, format: OutputFormat) -> Result<()> {
        let model = self.load().await?;
        let extensions = &self.dashboard.extensions;
        let columns = extensions.wrap_columns(report_columns(false, false), &Method::Executions);
        if format != OutputFormat::Table {
            return render::print_rows(&model.rows, &columns, format, extensions);
        }

        println!("Job Executions");
        println!("{}", render::batch_selector(&model.batches, model.state.batch.as_deref()));
        render::print_rows(&model.rows, &columns, format, extensions)?;
        println!("{}", render::page_footer(&model.state, model.total));
        println!("{}", self.location());
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum BrowseCommand {
    Change(PageChange),
    Refresh,
    Quit,
}

fn parse_command(line: &str) -> Option<BrowseCommand> {
    let line = line.trim();
    let (word, rest) = match line.split_once(' ') {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    match word {
        "n" | "next" => Some(BrowseCommand::Change(PageChange::Next)),
        "p" | "prev" | "previous" => Some(BrowseCommand::Change(PageChange::Previous)),
        "page" => rest.parse().ok().map(|n| BrowseCommand::Change(PageChange::Page(n))),
        "size" => rest
            .parse()
            .ok()
            .filter(|n: &u32| *n > 0)
            .map(|n| BrowseCommand::Change(PageChange::Size(n))),
        "batch" => Some(BrowseCommand::Change(PageChange::Batch(
            Some(rest.to_string()).filter(|b| !b.is_empty()),
        ))),
        "r" | "refresh" => Some(BrowseCommand::Refresh),
        "q" | "quit" | "exit" => Some(BrowseCommand::Quit),
        _ => None,
    }
}

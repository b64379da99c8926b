pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod extensions;
pub mod query;
pub mod report;
pub mod routes;
pub mod rpc;
pub mod store;

pub use client::RpcClient;
pub use config::{ClientConfig, Config, LoggingConfig, ServerConfig};
pub use error::FetchError;
pub use execution::{parse_timestamp, ExecutionRecord, Page, Status, StatusCategory};
pub use extensions::Extensions;
pub use query::{reconcile, split_payload, PageChange, PaginationState, QuerySync};
pub use report::{project, report_columns, Column, ProjectionOptions, ReportRow};
pub use routes::{Location, MenuEntry, Route};
pub use rpc::{Method, RpcCall, RpcReply, RpcRequest, RpcResponse};
pub use store::{FetchKey, FetchOutcome, FetchStore, Query};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_ENDPOINT: &str = "/jsonrpc";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

// Looked up in the working directory when neither --config nor the env var is set
pub const DEFAULT_CONFIG_PATH: &str = "batchui.yaml";
pub const CONFIG_ENV: &str = "BATCHUI_CONFIG";

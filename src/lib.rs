pub mod audit;
pub mod db;
pub mod export;
pub mod json;
pub mod store;

pub use db::{
    BackendConfig, ColumnSpec, Dialect, Ident, QueryExecutor, RetryPolicy, SchemaManager, ServerConfig, SqlValue,
    Statement, StatementBuilder, StoreConfig, StoreError, StoreResult,
};
pub use store::{Record, Selector, Store};

mod backend;
pub mod codec;
mod connection;
mod error;
mod executor;
mod ident;
mod query;
pub mod retry;
mod schema;

pub use backend::*;
pub use connection::*;
pub use error::*;
pub use executor::QueryExecutor;
pub use ident::*;
pub use query::*;
pub use retry::RetryPolicy;
pub use schema::*;

#[cfg(test)]
pub(crate) use executor::tests::ScriptedBackend;

pub mod cache;
pub mod client;
pub mod error;
pub mod normalize;
pub mod process;

pub use cache::ForestCache;
pub use client::{Forester, NewTree};
pub use error::QueryError;
pub use process::{Executor, Invocation, ProcessBackend, QueryOutcome, Runner, SystemBackend};

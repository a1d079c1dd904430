//! Core types for tempora.

mod chunk;
mod graph;
mod message;
mod query;

pub use chunk::*;
pub use graph::*;
pub use message::*;
pub use query::*;

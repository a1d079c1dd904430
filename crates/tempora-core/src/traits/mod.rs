//! Core traits for tempora collaborators.

mod graph_store;
mod llm;

pub use graph_store::*;
pub use llm::*;

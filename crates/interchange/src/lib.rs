//! statecheck-interchange: typed deserialization of definition documents.
//!
//! Provides shallow typed structs for a state-machine definition document
//! (`StartAt` + `States`, with nested `Branches` and `ItemProcessor` /
//! `Iterator` graphs) and a single [`from_document()`] entry point that turns
//! a `serde_json::Value` into a [`DefinitionDocument`].
//!
//! Only the graph shape is interpreted here. Type-specific payload (choice
//! rules, data paths, templates) is kept as raw JSON so the evaluator can
//! deep-parse it into its own domain types.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_document, from_str, InterchangeError};
pub use types::*;

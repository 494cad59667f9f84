//! Dataset access - hub downloads, local mirrors, JSONL parsing

mod hub;
mod jsonl;

pub use hub::{DatasetRef, DatasetSource};
pub use jsonl::read_jsonl;

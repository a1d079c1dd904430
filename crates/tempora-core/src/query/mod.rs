//! Query-side processing: keyword tiering.

mod json_parser;
mod keywords;

pub use json_parser::{extract_json, remove_code_blocks};
pub use keywords::{parse_keywords, KeywordTiering, HIGH_LEVEL_KEY, LOW_LEVEL_KEY, TEMPORAL_KEY};

//! Saved-object files on disk

mod ndjson;

pub use ndjson::{NdjsonReader, NdjsonWriter, decode_ndjson, encode_ndjson};

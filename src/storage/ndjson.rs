//! NDJSON (newline delimited JSON) encoding
//!
//! The saved objects API speaks NDJSON in both directions: export responses
//! are a stream of objects and imports upload one as a form file. Exports
//! written to disk use the same format so they can be imported unchanged.

use crate::etl::{Extractor, Loader};

use eyre::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Decode a stream of JSON values separated by whitespace.
pub fn decode_ndjson(body: &[u8]) -> serde_json::Result<Vec<Value>> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<Value>()
        .collect()
}

/// Encode values one per line, each line newline terminated.
pub fn encode_ndjson(items: &[Value]) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Reads saved objects from an NDJSON file
pub struct NdjsonReader {
    path: PathBuf,
}

impl NdjsonReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read(&self) -> Result<Vec<Value>> {
        let content = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read NDJSON file: {}", self.path.display()))?;
        decode_ndjson(&content)
            .with_context(|| format!("Failed to parse NDJSON file: {}", self.path.display()))
    }
}

impl Extractor for NdjsonReader {
    type Item = Value;

    async fn extract(&self) -> Result<Vec<Self::Item>> {
        self.read()
    }
}

/// Writes saved objects to an NDJSON file, replacing its content
pub struct NdjsonWriter {
    path: PathBuf,
}

impl NdjsonWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn write(&self, items: &[Value]) -> Result<()> {
        let content = encode_ndjson(items).context("Failed to encode NDJSON")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write NDJSON file: {}", self.path.display()))?;
        Ok(())
    }
}

impl Loader for NdjsonWriter {
    type Item = Value;

    async fn load(&self, items: Vec<Self::Item>) -> Result<usize> {
        self.write(&items)?;
        Ok(items.len())
    }
}

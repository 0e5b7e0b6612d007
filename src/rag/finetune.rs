use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::formatter::Document;

pub const DEFAULT_FINETUNE_PATH: &str = "logistics_finetune.jsonl";

/// Completion paired with every record. The leading space is part of the
/// training target.
pub const FINETUNE_COMPLETION: &str =
    " What is the main cost driver? Answer based on the data above.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinetuneExample {
    pub prompt: String,
    pub completion: String,
}

pub fn finetune_examples(documents: &[Document]) -> Vec<FinetuneExample> {
    documents
        .iter()
        .map(|doc| FinetuneExample {
            prompt: doc.clone(),
            completion: FINETUNE_COMPLETION.to_string(),
        })
        .collect()
}

/// Writes one JSON object per line and returns the number of lines written.
pub fn write_jsonl<W: Write>(mut writer: W, examples: &[FinetuneExample]) -> Result<usize> {
    for example in examples {
        serde_json::to_writer(&mut writer, example)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(examples.len())
}

pub fn export_finetune_jsonl(path: &Path, documents: &[Document]) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create fine-tuning file {:?}", path))?;
    let written = write_jsonl(BufWriter::new(file), &finetune_examples(documents))
        .with_context(|| format!("Failed to write fine-tuning examples to {:?}", path))?;
    tracing::info!(path = ?path, examples = written, "fine-tuning dataset written");
    Ok(written)
}

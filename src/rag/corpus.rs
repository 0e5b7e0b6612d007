use super::formatter::{format_record, Document};
use crate::dataset::{FormatError, Record};

/// Formats every record in order. Document `i` is derived solely from record
/// `i`; this position is the identifier the vector index hands back.
pub fn build_corpus(records: &[Record]) -> Result<Vec<Document>, FormatError> {
    let documents = records
        .iter()
        .map(format_record)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(documents = documents.len(), "text corpus built");
    Ok(documents)
}

pub mod answer;
pub mod corpus;
pub mod finetune;
pub mod formatter;
pub mod prompt;
pub mod snapshot;

pub use answer::{answer_query, RagAnswer};
pub use corpus::build_corpus;
pub use finetune::{
    export_finetune_jsonl, FinetuneExample, DEFAULT_FINETUNE_PATH, FINETUNE_COMPLETION,
};
pub use formatter::{format_record, Document};
pub use prompt::{
    render_prompt, LookupError, PromptAssembler, RetrievalError, RetrievedDocument, DEFAULT_TOP_K,
};
pub use snapshot::RagSnapshot;

use anyhow::{Context, Result};
use logistics_rag::analysis::cost_report;
use logistics_rag::cli::{parse_args, Command};
use logistics_rag::config::{LlmSettings, Settings};
use logistics_rag::dataset::{load_records, Record};
use logistics_rag::rag::{
    answer_query, build_corpus, export_finetune_jsonl, PromptAssembler, RagSnapshot,
};
use logistics_rag::search::EmbeddingEngine;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "logistics_rag=debug,info"
    } else {
        "logistics_rag=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Loads the dataset, embeds the corpus (or reuses the cache) and freezes the
/// result into a snapshot.
fn build_snapshot(
    settings: &Settings,
    records: &[Record],
) -> Result<(RagSnapshot, EmbeddingEngine)> {
    let documents = build_corpus(records).context("Failed to build text corpus")?;
    let embedder = EmbeddingEngine::new(&settings.embedding_model)
        .with_context(|| format!("Failed to load embedding model '{}'", settings.embedding_model))?;

    let snapshot = match &settings.index_cache {
        Some(cache) => RagSnapshot::build_cached(documents, &embedder, settings.metric, cache)?,
        None => RagSnapshot::build(documents, &embedder, settings.metric)?,
    };
    Ok((snapshot, embedder))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = parse_args();
    init_tracing(cli.verbose);
    let settings = Settings::from_cli(&cli);

    let records = load_records(&settings.dataset_path)
        .with_context(|| format!("Failed to load delivery data from {:?}", settings.dataset_path))?;

    match cli.command {
        Command::Ask {
            query,
            top_k,
            timeout_secs,
        } => {
            let (snapshot, embedder) = build_snapshot(&settings, &records)?;
            let llm = LlmSettings::from_env(timeout_secs);
            let provider = llm.provider();
            let result =
                answer_query(&snapshot, &embedder, &provider, &llm.model, &query, top_k).await?;
            println!("{}", result.answer.trim());
        }
        Command::Prompt { query, top_k } => {
            let (snapshot, embedder) = build_snapshot(&settings, &records)?;
            let prompt = PromptAssembler::new(&snapshot, &embedder)
                .assemble(&query, top_k)
                .context("Failed to assemble retrieval prompt")?;
            println!("{prompt}");
        }
        Command::ExportFinetune { output } => {
            let documents = build_corpus(&records).context("Failed to build text corpus")?;
            let written = export_finetune_jsonl(&output, &documents)?;
            println!("Wrote {written} examples to {}", output.display());
        }
        Command::Analyze { json } => {
            let report = cost_report(&records);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
    }

    Ok(())
}

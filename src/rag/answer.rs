use anyhow::{Context, Result};

use super::prompt::PromptAssembler;
use super::snapshot::RagSnapshot;
use crate::api_connection::endpoints::{ChatCompletionRequest, Provider};
use crate::search::Embedder;

#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub prompt: String,
    pub answer: String,
}

/// Retrieves context for `query`, sends the assembled prompt to the language
/// model and returns both the prompt and the streamed answer.
pub async fn answer_query<E: Embedder + ?Sized>(
    snapshot: &RagSnapshot,
    embedder: &E,
    provider: &Provider,
    model: &str,
    query: &str,
    top_k: usize,
) -> Result<RagAnswer> {
    let prompt = PromptAssembler::new(snapshot, embedder)
        .assemble(query, top_k)
        .context("Failed to assemble retrieval prompt")?;

    tracing::info!(model, top_k, prompt_chars = prompt.len(), "requesting completion");
    let answer = provider
        .stream_chat_completion(ChatCompletionRequest::streaming(model, &prompt))
        .await
        .context("Language model request failed")?;

    Ok(RagAnswer { prompt, answer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::endpoints::DEFAULT_CHAT_MODEL;
    use crate::api_connection::ApiConnectionError;
    use crate::search::testing::FixedEmbedder;
    use crate::search::DistanceMetric;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const KEY_ENV_VAR: &str = "LOGISTICS_RAG_ANSWER_TEST_KEY";

    fn snapshot_and_embedder() -> (RagSnapshot, FixedEmbedder) {
        let documents = vec![
            "Vendor A handled 100 packages in the North region.".to_string(),
            "Vendor B handled 90 packages in the South region.".to_string(),
        ];
        let embedder = FixedEmbedder::new(vec![0.0, 1.0])
            .with(&documents[0], vec![1.0, 0.0])
            .with(&documents[1], vec![0.0, 1.0]);
        let snapshot = RagSnapshot::build(documents, &embedder, DistanceMetric::Euclidean).unwrap();
        (snapshot, embedder)
    }

    /// Answers one request with `response`, returning the request body.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 2048];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some((head, body)) = text.split_once("\r\n\r\n") {
                    let length = head
                        .to_lowercase()
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:").map(str::trim))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if body.len() >= length || n == 0 {
                        stream.write_all(response.as_bytes()).await.unwrap();
                        stream.shutdown().await.ok();
                        return body.to_string();
                    }
                }
                if n == 0 {
                    return text;
                }
            }
        });
        (format!("http://{addr}/v1"), handle)
    }

    #[tokio::test]
    async fn test_answer_query_streams_answer_for_retrieved_context() {
        std::env::set_var(KEY_ENV_VAR, "answer-test-key");
        let events = [
            r#"data: {"choices":[{"delta":{"content":"Vendor B "}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"serves the South."}}]}"#,
            "data: [DONE]",
        ]
        .join("\n\n");
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close";
        let response = format!("{head}\r\n\r\n{events}\n\n");
        let (base_url, server) = serve_once(response).await;
        let provider = Provider::together(KEY_ENV_VAR)
            .with_base_url(base_url)
            .with_timeout(Duration::from_secs(10));
        let (snapshot, embedder) = snapshot_and_embedder();

        let result = answer_query(&snapshot, &embedder, &provider, DEFAULT_CHAT_MODEL, "south?", 1)
            .await
            .unwrap();
        assert_eq!(result.answer, "Vendor B serves the South.");
        assert_eq!(
            result.prompt,
            "Vendor B handled 90 packages in the South region.\n\nQuestion: south?\nAnswer:"
        );

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(body["messages"][0]["content"], result.prompt.as_str());
        assert_eq!(body["model"], DEFAULT_CHAT_MODEL);
    }

    #[tokio::test]
    async fn test_answer_query_surfaces_client_errors() {
        let provider = Provider::together("LOGISTICS_RAG_ANSWER_TEST_MISSING_KEY");
        let (snapshot, embedder) = snapshot_and_embedder();

        let err = answer_query(&snapshot, &embedder, &provider, DEFAULT_CHAT_MODEL, "q", 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiConnectionError>(),
            Some(ApiConnectionError::MissingApiKey(_))
        ));
    }
}

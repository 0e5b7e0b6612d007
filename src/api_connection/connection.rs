use dotenv::dotenv;
use futures_util::StreamExt;
use reqwest::Client;
use std::env;
use std::time::Duration;
use thiserror::Error;

use super::endpoints::{
    ChatCompletionChunk, ChatCompletionRequest, Provider, DEFAULT_REQUEST_TIMEOUT,
    TOGETHER_BASE_URL,
};
use super::stream::{collect_fragments, SseDecoder, SseEvent};

#[derive(Debug, Error)]
pub enum ApiConnectionError {
    #[error("API key not found in environment: {0}")]
    MissingApiKey(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("API error {status}: {error_body}")]
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    #[error("Completion did not finish within {0:?}")]
    Timeout(Duration),
    #[error("Malformed stream chunk {payload:?}: {source}")]
    MalformedChunk {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Provider reported an error mid-stream: {0}")]
    StreamError(String),
}

impl Provider {
    /// Together backend whose key is read from `api_key_env_var_name` at call time.
    pub fn together(api_key_env_var_name: &str) -> Self {
        dotenv().ok();
        Self::Together {
            api_key: api_key_env_var_name.to_string(),
            base_url: TOGETHER_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Points the provider at another OpenAI-compatible server.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        match &mut self {
            Provider::Together { base_url, .. } => {
                *base_url = url.into().trim_end_matches('/').to_string();
            }
        }
        self
    }

    /// Bounds the whole call, from connect to the last streamed fragment.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        match &mut self {
            Provider::Together { timeout, .. } => *timeout = limit,
        }
        self
    }

    /// Sends a streamed completion and returns the concatenated answer text.
    ///
    /// The answer is assembled from every content fragment until the stream
    /// ends, whether it ends with `[DONE]` or by the server closing the body.
    pub async fn stream_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<String, ApiConnectionError> {
        match self {
            Provider::Together {
                api_key: api_key_env_var_name,
                base_url,
                timeout,
            } => {
                dotenv().ok();
                let actual_api_key = env::var(api_key_env_var_name).map_err(|_| {
                    ApiConnectionError::MissingApiKey(api_key_env_var_name.clone())
                })?;

                let url = format!("{}/chat/completions", base_url);
                let call = send_streaming(url, actual_api_key, request);
                tokio::time::timeout(*timeout, call)
                    .await
                    .map_err(|_| ApiConnectionError::Timeout(*timeout))?
            }
        }
    }
}

async fn send_streaming(
    url: String,
    api_key: String,
    mut request: ChatCompletionRequest,
) -> Result<String, ApiConnectionError> {
    request.stream = true;
    let client = Client::new();

    tracing::debug!(%url, model = %request.model, "sending streamed chat completion");
    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .header("Accept", "text/event-stream")
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        return Err(ApiConnectionError::ApiError { status, error_body });
    }

    let mut decoder = SseDecoder::new();
    let mut chunks: Vec<ChatCompletionChunk> = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(bytes) = body.next().await {
        for event in decoder.push(&bytes?)? {
            if let SseEvent::Chunk(chunk) = event {
                chunks.push(chunk);
            }
        }
        if decoder.is_done() {
            break;
        }
    }
    for event in decoder.finish()? {
        if let SseEvent::Chunk(chunk) = event {
            chunks.push(chunk);
        }
    }

    let answer = collect_fragments(chunks);
    tracing::debug!(chars = answer.len(), "streamed completion finished");
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_endpoint_settings() {
        let provider = Provider::together("SOME_KEY_VAR")
            .with_base_url("http://127.0.0.1:9000/v1/")
            .with_timeout(Duration::from_millis(250));
        match provider {
            Provider::Together {
                api_key,
                base_url,
                timeout,
            } => {
                assert_eq!(api_key, "SOME_KEY_VAR");
                assert_eq!(base_url, "http://127.0.0.1:9000/v1");
                assert_eq!(timeout, Duration::from_millis(250));
            }
        }
    }

    #[test]
    fn test_default_provider_targets_together() {
        match Provider::together("SOME_KEY_VAR") {
            Provider::Together {
                base_url, timeout, ..
            } => {
                assert_eq!(base_url, TOGETHER_BASE_URL);
                assert_eq!(timeout, DEFAULT_REQUEST_TIMEOUT);
            }
        }
    }
}

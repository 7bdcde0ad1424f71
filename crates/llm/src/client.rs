use async_trait::async_trait;
use docrefine_common::{AppConfig, DocRefineError, Result};
use futures::StreamExt;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::llm_trait::LanguageModel;
use crate::types::{GenerateOptions, GenerateRequest, GenerateResponse};

/// Delay before the first retry; doubled on every further attempt
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Ollama API client bound to a single model
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    options: GenerateOptions,
    stream: bool,
    max_retries: u32,
    retry_delay: Duration,
    client: Client,
}

impl OllamaClient {
    /// Create new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocRefineError::network(format!("Failed to create HTTP client: {}", e)))?;

        info!("Ollama client initialized: {} (model: {})", base_url, model);
        Ok(Self {
            base_url,
            model,
            options: GenerateOptions::default(),
            stream: false,
            max_retries: 3,
            retry_delay: DEFAULT_RETRY_DELAY,
            client,
        })
    }

    /// Create client from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            config.ollama_base_url.clone(),
            config.llm_model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_options(GenerateOptions {
            temperature: Some(config.temperature),
            top_p: Some(config.top_p),
            num_predict: Some(config.num_predict),
        })
        .with_streaming(config.stream)
        .with_max_retries(config.max_retries))
    }

    /// Set generation options sent with every request
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Receive generations as an NDJSON stream instead of one JSON body
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set how many attempts a single call makes before failing
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the delay before the first retry
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Base URL of the Ollama server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request for a prompt using the client's streaming mode
    pub fn build_request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: Some(self.stream),
            options: Some(self.options.clone()),
        }
    }

    /// Generate text with Ollama (with retry logic)
    pub async fn generate_request(&self, request: GenerateRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        debug!(
            "Sending generate request to Ollama - Model: {}, Prompt length: {}, Stream: {:?}",
            request.model,
            request.prompt.len(),
            request.stream
        );

        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.try_generate(&url, &request).await {
                Ok(response) => {
                    debug!("Received response from Ollama - Length: {}", response.len());
                    return Ok(response);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = self.retry_delay * 2u32.pow(attempt - 1);
                        warn!(
                            "Ollama request failed (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt, self.max_retries, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DocRefineError::llm("All retries failed")))
    }

    /// Single attempt to generate text
    async fn try_generate(&self, url: &str, request: &GenerateRequest) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| DocRefineError::network(format!("Failed to send request: {}", e)))?
            .error_for_status()
            .map_err(|e| DocRefineError::llm(format!("Ollama API error: {}", e)))?;

        if request.stream == Some(true) {
            return read_stream(response).await;
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DocRefineError::llm(format!("Failed to parse response: {}", e)))?;

        Ok(result.response)
    }

    /// Generate with streaming enabled on the wire, whatever the client's
    /// mode. Returns the concatenated response.
    pub async fn generate_stream(&self, prompt: &str) -> Result<String> {
        let mut request = self.build_request(prompt);
        request.stream = Some(true);
        self.generate_request(request).await
    }

    /// Test connection to Ollama
    pub async fn test_connection(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DocRefineError::network(format!("Failed to connect to Ollama: {}", e)))?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_request(self.build_request(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

async fn read_stream(response: Response) -> Result<String> {
    let mut collector = StreamCollector::default();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DocRefineError::network(format!("Failed to read response stream: {}", e)))?;
        if collector.push(&chunk)? {
            break;
        }
    }

    collector.finish()
}

/// Joins the `response` fragments of an Ollama NDJSON stream
///
/// Any malformed line fails the whole generation, as does a stream that ends
/// before the line marked `done`.
#[derive(Debug, Default)]
struct StreamCollector {
    pending: Vec<u8>,
    response: String,
    done: bool,
}

impl StreamCollector {
    /// Feed raw body bytes. Returns `true` once the final line has arrived.
    fn push(&mut self, bytes: &[u8]) -> Result<bool> {
        self.pending.extend_from_slice(bytes);

        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.accept_line(&line)?;
            if self.done {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn accept_line(&mut self, line: &[u8]) -> Result<()> {
        let line = std::str::from_utf8(line)
            .map_err(|e| DocRefineError::llm(format!("Stream line is not UTF-8: {}", e)))?
            .trim();
        if line.is_empty() {
            return Ok(());
        }

        let chunk: GenerateResponse = serde_json::from_str(line)
            .map_err(|e| DocRefineError::llm(format!("Malformed stream line {:?}: {}", line, e)))?;
        self.response.push_str(&chunk.response);
        self.done = chunk.done;
        Ok(())
    }

    fn finish(mut self) -> Result<String> {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.accept_line(&rest)?;
        }

        if !self.done {
            return Err(DocRefineError::llm(format!(
                "Stream ended before the final response ({} chars received)",
                self.response.len()
            )));
        }

        Ok(self.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> OllamaClient {
        OllamaClient::new("http://localhost:11434/", "llama3.2", Duration::from_secs(5)).unwrap()
    }

    fn mock_client(server: &MockServer) -> OllamaClient {
        OllamaClient::new(server.uri(), "llama3.2", Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10))
    }

    fn generated(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "response": text,
            "done": true,
        }))
    }

    fn collect(body: &str) -> Result<String> {
        let mut collector = StreamCollector::default();
        collector.push(body.as_bytes())?;
        collector.finish()
    }

    #[test]
    fn test_client_creation() {
        let client = client();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.model_name(), "llama3.2");
    }

    #[test]
    fn test_from_config() {
        let config = AppConfig::default();
        let client = OllamaClient::from_config(&config).unwrap();
        let request = client.build_request("Summarize this");
        assert_eq!(request.model, config.llm_model);
        assert_eq!(request.stream, Some(false));
        assert_eq!(request.options.unwrap().num_predict, Some(config.num_predict));

        let streaming = AppConfig {
            stream: true,
            ..AppConfig::default()
        };
        let client = OllamaClient::from_config(&streaming).unwrap();
        assert_eq!(client.build_request("x").stream, Some(true));
    }

    #[test]
    fn test_max_retries_floor() {
        let client = client().with_max_retries(0);
        assert_eq!(client.max_retries, 1);
    }

    #[test]
    fn test_stream_collector() {
        let body = concat!(
            r#"{"model":"m","response":"Hel","done":false}"#, "\n",
            "\n",
            r#"{"model":"m","response":"lo","done":true}"#, "\n",
            r#"{"model":"m","response":" ignored","done":false}"#, "\n",
        );
        assert_eq!(collect(body).unwrap(), "Hello");
    }

    #[test]
    fn test_stream_collector_split_across_chunks() {
        let mut collector = StreamCollector::default();
        assert!(!collector.push(br#"{"model":"m","respo"#).unwrap());
        assert!(!collector.push(b"nse\":\"caf\xc3").unwrap());
        assert!(collector.push(b"\xa9\",\"done\":true}\n").unwrap());
        assert_eq!(collector.finish().unwrap(), "caf\u{e9}");
    }

    #[test]
    fn test_stream_collector_last_line_without_newline() {
        let body = r#"{"model":"m","response":"end","done":true}"#;
        assert_eq!(collect(body).unwrap(), "end");
    }

    #[test]
    fn test_stream_collector_rejects_malformed_line() {
        let body = concat!(r#"{"model":"m","response":"Hel","done":false}"#, "\n", "{garbage\n");
        let err = collect(body).unwrap_err();
        assert!(matches!(err, DocRefineError::Llm(_)));
    }

    #[test]
    fn test_stream_collector_rejects_truncated_stream() {
        let body = concat!(r#"{"model":"m","response":"Hel","done":false}"#, "\n");
        let err = collect(body).unwrap_err();
        assert!(matches!(err, DocRefineError::Llm(_)));
    }

    #[tokio::test]
    async fn test_generate_sends_model_and_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama3.2",
                "prompt": "Summarize: A",
                "stream": false,
                "options": { "num_predict": 64 },
            })))
            .respond_with(generated("summary"))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).with_options(GenerateOptions {
            num_predict: Some(64),
            ..Default::default()
        });
        assert_eq!(client.generate("Summarize: A").await.unwrap(), "summary");
    }

    #[tokio::test]
    async fn test_empty_generation_is_returned_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(generated(""))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).with_max_retries(2);
        assert_eq!(client.generate("p").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(generated("recovered"))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).with_max_retries(3);
        assert_eq!(client.generate("p").await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = mock_client(&server).with_max_retries(3);
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, DocRefineError::Llm(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_client_error_status_maps_to_llm() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "model not found"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).with_max_retries(1);
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, DocRefineError::Llm(_)));
    }

    #[tokio::test]
    async fn test_unparseable_body_maps_to_llm() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = mock_client(&server).with_max_retries(1);
        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, DocRefineError::Llm(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_maps_to_network() {
        let client = OllamaClient::new("http://127.0.0.1:9", "llama3.2", Duration::from_secs(2))
            .unwrap()
            .with_max_retries(1);

        let err = client.generate("p").await.unwrap_err();
        assert!(matches!(err, DocRefineError::Network(_)));

        let err = client.test_connection().await.unwrap_err();
        assert!(matches!(err, DocRefineError::Network(_)));
    }

    #[tokio::test]
    async fn test_streaming_generation() {
        let server = MockServer::start().await;
        let body = concat!(
            r#"{"model":"llama3.2","response":"Hel","done":false}"#, "\n",
            r#"{"model":"llama3.2","response":"lo","done":true}"#, "\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let client = mock_client(&server).with_streaming(true);
        assert_eq!(client.generate("p").await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_streaming_garbage_fails_without_partial_output() {
        let server = MockServer::start().await;
        let body = concat!(r#"{"model":"llama3.2","response":"Hel","done":false}"#, "\n", "{garbage\n");
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(2)
            .mount(&server)
            .await;

        let client = mock_client(&server).with_max_retries(2);
        let err = client.generate_stream("p").await.unwrap_err();
        assert!(matches!(err, DocRefineError::Llm(_)));
    }

    #[tokio::test]
    async fn test_connection_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = mock_client(&server);
        assert!(client.test_connection().await.unwrap());
        assert!(!client.test_connection().await.unwrap());
    }
}

//! Gemini (Vertex AI) generation client

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;

use super::client::{require, HttpClient};
use crate::config::{LlmConfig, PipelineConfig};
use crate::decode::{generation_text, stream_fragment, value_text};
use crate::error::{Error, Result};
use crate::providers::generator::{compose_prompt, Generator};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

/// Gemini `generateContent` / `streamGenerateContent` client
pub struct GeminiGenerator {
    http: HttpClient,
    endpoint: Option<String>,
    llm: LlmConfig,
}

impl GeminiGenerator {
    pub fn new(http: HttpClient, config: &PipelineConfig) -> Self {
        Self {
            http,
            endpoint: config.llm_endpoint(),
            llm: config.llm.clone(),
        }
    }

    fn request(&self, question: &str, contexts: &[String]) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: compose_prompt(question, contexts),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.llm.temperature,
                max_output_tokens: self.llm.max_output_tokens,
                top_p: self.llm.top_p,
            },
        }
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<String> {
        let url = require(&self.endpoint, "LLM_ENDPOINT")?;
        let request = self.http.post(url).json(&self.request(question, contexts));

        tracing::info!(
            "Calling LLM endpoint (stream={}, contexts={})",
            self.llm.stream,
            contexts.len()
        );

        if !self.llm.stream {
            let body = self.http.send_json("llm", request).await?;
            return Ok(generation_text(&body));
        }

        let response = self.http.send("llm", request).await?;
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| Error::remote("llm", format!("Stream error: {}", e)))?;
            buffer.extend_from_slice(&bytes);
        }

        let answer = collect_stream_body(&String::from_utf8_lossy(&buffer));
        tracing::info!("LLM stream completed; length={}", answer.len());
        Ok(answer)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Assemble the full answer from a streamed body
///
/// Accepts a JSON array of partial responses, newline-delimited JSON, or
/// server-sent `data:` lines. Lines that are not JSON are kept verbatim.
pub fn collect_stream_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return match value {
            Value::Array(items) => items.iter().filter_map(stream_fragment).collect(),
            other => stream_fragment(&other).unwrap_or_else(|| value_text(&other)),
        };
    }

    let mut answer = String::new();
    for raw_line in body.lines() {
        let mut line = raw_line.trim();
        if let Some(rest) = line.strip_prefix("data:") {
            line = rest.trim();
        }
        let line = line
            .trim_start_matches(['[', ','])
            .trim_end_matches([']', ','])
            .trim();
        if line.is_empty() || line == "[DONE]" {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                if let Some(fragment) = stream_fragment(&value) {
                    answer.push_str(&fragment);
                }
            }
            Err(_) => answer.push_str(line),
        }
    }
    answer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_json_array_stream() {
        let body = r#"[{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}
,
{"candidates":[{"content":{"parts":[{"text":"lo"}]}}],"usageMetadata":{}}
]"#;
        assert_eq!(collect_stream_body(body), "Hello");
    }

    #[test]
    fn test_collects_ndjson_and_sse() {
        let ndjson = "{\"text\":\"a\"}\n{\"text\":\"b\"}\n";
        assert_eq!(collect_stream_body(ndjson), "ab");

        let sse = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"x\"}]}}]}\n\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"y\"}]}}]}\n";
        assert_eq!(collect_stream_body(sse), "xy");
    }

    #[test]
    fn test_non_json_lines_kept_verbatim() {
        assert_eq!(collect_stream_body("plain\n{\"text\":\"!\"}"), "plain!");
    }

    #[test]
    fn test_request_shape() {
        let config = PipelineConfig::default();
        let http = HttpClient::new(&config.endpoints).unwrap();
        let generator = GeminiGenerator::new(http, &config);
        let body = serde_json::to_value(generator.request("q", &["c".to_string()])).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert!(body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Context:\nc"));
    }
}

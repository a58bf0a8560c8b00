use serde::{Deserialize, Serialize};
use log::{debug, trace, error};
use std::time::{Duration, Instant};

use crate::error::Error;
use crate::request::{ChatRequest, ChatResponse};

pub const BACKEND_NAME: &str = "proxy";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

// ===== Message Types =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub temperature: f32
  , pub max_tokens: u32
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyChatResponse
{   pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<Usage>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChoiceMessage
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage
{   #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage
{   #[serde(default)]
    pub total_tokens: Option<u64>
}

/// Translate a normalized request into the proxy's chat schema.
/// The system message, when present, always comes first.
pub fn build_payload(request: &ChatRequest) -> ProxyChatRequest
{   let mut messages = Vec::with_capacity(2);
    if let Some(system_prompt) = &request.system_prompt
    {   messages.push(ChatMessage
        {   role: "system".to_string()
          , content: system_prompt.clone()
        });
    }
    messages.push(ChatMessage
    {   role: "user".to_string()
      , content: request.message.clone()
    });

    ProxyChatRequest
    {   model: request.model.clone()
      , messages
      , temperature: request.temperature
      , max_tokens: request.max_tokens
    }
}

// ===== Proxy Adapter =====

/// Chat-completion proxy adapter. Holds one pooled HTTP client for
/// the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ProxyAdapter
{   base_url: String
  , timeout: Duration
  , http_client: reqwest::Client
}

impl ProxyAdapter
{   pub fn new(
      config: &crate::config::ProxyConfig
    ) -> crate::error::Result<Self>
    {   debug!("Creating ProxyAdapter for {}", config.base_url);
        let http_client = reqwest::Client::builder()
          .build()
          .map_err(|e| {
            error!("HTTP client build failed: {}", e);
            Error::InvalidConfiguration(e.to_string())
          })?;
        Ok(ProxyAdapter
        {   base_url: config.base_url.trim_end_matches('/').to_string()
          , timeout: config.timeout()
          , http_client
        })
    }

    /// Override the per-call bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self
    {   self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &'static str
    {   BACKEND_NAME
    }

    /// The proxy fronts arbitrary models; it decides itself.
    pub fn supports(&self, model: &str) -> bool
    {   !model.is_empty()
    }

    pub fn call_timeout(&self) -> Duration
    {   self.timeout
    }

    pub fn base_url(&self) -> &str
    {   &self.base_url
    }

    /// One chat completion, no retries.
    pub async fn send(
      &self
    , request: &ChatRequest
    ) -> crate::error::Result<ChatResponse>
    {   debug!("Proxy send for model: {}", request.model);
        let started = Instant::now();

        let payload = build_payload(request);
        trace!("Proxy request: {:?}", payload);

        let response = self.http_client
          .post(format!("{}/chat/completions", self.base_url))
          .header("Content-Type", "application/json")
          .json(&payload)
          .send()
          .await
          .map_err(|e| {
            error!("Proxy HTTP error: {}", e);
            Error::from(e)
          })?;

        let status = response.status();
        trace!("Proxy response status: {}", status);

        if status != reqwest::StatusCode::OK
        {   let body = response.text().await
              .unwrap_or_else(|e| {
                format!("<unreadable body: {}>", e)
              });
            error!("Proxy error {}: {}", status.as_u16(), body);
            return Err(Error::UpstreamError
            {   status: status.as_u16()
              , body
            });
        }

        let body = response.text().await.map_err(|e| {
          error!("Proxy body read error: {}", e);
          Error::from(e)
        })?;
        let chat_response: ProxyChatResponse
          = serde_json::from_str(&body).map_err(|e| {
            error!("Proxy parse error: {}", e);
            Error::internal(format!("Undecodable upstream reply: {}", e))
          })?;

        let tokens_used = chat_response.usage
          .as_ref()
          .and_then(|u| u.total_tokens);

        let choice = chat_response.choices
          .into_iter()
          .next()
          .ok_or_else(|| {
            error!("No choices in proxy response");
            Error::internal("proxy response contained no choices")
          })?;
        trace!("Proxy finish reason: {:?}", choice.finish_reason);

        let response_text = choice.message.content.ok_or_else(|| {
          error!("Proxy choice had no content");
          Error::internal("proxy response contained no content")
        })?;

        Ok(ChatResponse
        {   response_text
          , model: request.model.clone()
          , tokens_used
          , conversation_id: request.conversation_id.clone()
          , timestamp: chrono::Utc::now()
          , processing_time_seconds: started.elapsed().as_secs_f64()
        })
    }

    /// `GET /health` within five seconds answered with 200.
    pub async fn health(&self) -> bool
    {   let result = self.http_client
          .get(format!("{}/health", self.base_url))
          .timeout(HEALTH_TIMEOUT)
          .send()
          .await;
        match result
        {   Ok(response) => response.status() == reqwest::StatusCode::OK
          , Err(e) => {
              debug!("Proxy health probe failed: {}", e);
              false
            }
        }
    }

    /// Relay the proxy's model catalog verbatim.
    pub async fn list_models(
      &self
    ) -> crate::error::Result<serde_json::Value>
    {   debug!("Fetching proxy model list");
        let response = self.http_client
          .get(format!("{}/models", self.base_url))
          .timeout(self.timeout)
          .send()
          .await
          .map_err(|e| {
            error!("Failed to fetch models: {}", e);
            Error::from(e)
          })?;

        let status = response.status();
        if !status.is_success()
        {   let body = response.text().await.unwrap_or_default();
            error!("Failed to fetch models: {} {}", status, body);
            return Err(Error::UpstreamError
            {   status: status.as_u16()
              , body
            });
        }

        response.json().await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn payload_puts_system_prompt_first()
    {   let request = ChatRequest::new("hi")
          .with_model("gpt-x")
          .with_system_prompt("be terse");
        let payload = build_payload(&request);
        assert_eq!(payload.model, "gpt-x");
        assert_eq!(
          payload.messages,
          vec![
            ChatMessage
            {   role: "system".to_string()
              , content: "be terse".to_string()
            }
          , ChatMessage
            {   role: "user".to_string()
              , content: "hi".to_string()
            }
          ]
        );
    }

    #[test]
    fn payload_without_system_prompt_has_one_message()
    {   let request = ChatRequest::new("hi")
          .with_temperature(1.5)
          .with_max_tokens(42);
        let json = serde_json::to_value(build_payload(&request)).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 1.5);
        assert_eq!(json["max_tokens"], 42);
    }

    #[test]
    fn usage_is_optional_in_replies()
    {   let reply: ProxyChatResponse = serde_json::from_str(
          r#"{"choices":[{"message":{"content":"yo"}}]}"#
        ).unwrap();
        assert!(reply.usage.is_none());
        assert_eq!(reply.choices[0].message.content.as_deref(), Some("yo"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed()
    {   let adapter = ProxyAdapter::new(&crate::config::ProxyConfig
        {   base_url: "http://localhost:4000/".to_string()
          , timeout_secs: 60
        }).unwrap();
        assert_eq!(adapter.base_url(), "http://localhost:4000");
        assert_eq!(adapter.call_timeout(), Duration::from_secs(60));
    }
}

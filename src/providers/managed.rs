use serde::{Deserialize, Serialize};
use log::{debug, trace, error, warn};
use std::time::Instant;

use crate::error::Error;
use crate::request::{ChatRequest, ChatResponse};

pub const BACKEND_NAME: &str = "managed";
pub const UNAVAILABLE: &str = "backend unavailable";

// ===== Message Types =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>
  , #[serde(default)]
    pub parts: Vec<Part>
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig
{   pub temperature: f32
  , pub max_output_tokens: u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest
{   pub contents: Vec<Content>
  , pub generation_config: GenerationConfig
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse
{   #[serde(default)]
    pub candidates: Vec<Candidate>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate
{   #[serde(default)]
    pub content: Option<Content>
  , #[serde(default)]
    pub finish_reason: Option<String>
}

impl GenerateContentResponse
{   /// Text of the first candidate, parts concatenated.
    pub fn text(&self) -> Option<String>
    {   let content = self.candidates.first()?.content.as_ref()?;
        let texts: Vec<&str> = content.parts
          .iter()
          .filter_map(|p| p.text.as_deref())
          .collect();
        if texts.is_empty()
        {   None
        } else
        {   Some(texts.concat())
        }
    }
}

/// Translate a normalized request into a generation call. Only the
/// user message is sent; system prompts are not supported here.
pub fn build_payload(request: &ChatRequest) -> GenerateContentRequest
{   GenerateContentRequest
    {   contents: vec![
          Content
          {   role: Some("user".to_string())
            , parts: vec![Part { text: Some(request.message.clone()) }]
          }
        ]
      , generation_config: GenerationConfig
        {   temperature: request.temperature
          , max_output_tokens: request.max_tokens
        }
    }
}

/// Model names end up in the URL path.
fn is_valid_model_name(model: &str) -> bool
{   !model.is_empty()
      && model.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')
      })
}

// ===== Platform Client =====

/// Initialized platform client: project, region and credentials.
#[derive(Debug, Clone)]
pub struct ManagedClient
{   endpoint: String
  , project: String
  , region: String
  , access_token: String
  , http_client: reqwest::Client
}

impl ManagedClient
{   /// Fails when the project or credentials are missing.
    pub fn init(
      config: &crate::config::ManagedConfig
    ) -> crate::error::Result<Self>
    {   if config.project.is_empty()
        {   return Err(Error::InvalidConfiguration(
              "managed model project is not set".to_string()
            ));
        }
        let access_token = config.access_token
          .clone()
          .filter(|t| !t.is_empty())
          .ok_or_else(|| {
            Error::InvalidConfiguration(
              "managed model credentials are not set".to_string()
            )
          })?;
        let http_client = reqwest::Client::builder()
          .build()
          .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        Ok(ManagedClient
        {   endpoint: config.endpoint()
          , project: config.project.clone()
          , region: config.region.clone()
          , access_token
          , http_client
        })
    }

    fn generate_url(&self, model: &str) -> String
    {   format!(
          "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
          self.endpoint, self.project, self.region, model
        )
    }

    async fn generate(
      &self
    , model: &str
    , payload: &GenerateContentRequest
    ) -> crate::error::Result<GenerateContentResponse>
    {   let response = self.http_client
          .post(self.generate_url(model))
          .bearer_auth(&self.access_token)
          .json(payload)
          .send()
          .await
          .map_err(|e| {
            if e.is_connect()
            {   Error::TransportError(e.to_string())
            } else
            {   Error::InternalError(format!("Managed model error: {}", e))
            }
          })?;

        let status = response.status();
        trace!("Managed model response status: {}", status);

        if !status.is_success()
        {   let body = response.text().await.unwrap_or_default();
            return Err(Error::InternalError(format!(
              "Managed model error ({}): {}", status.as_u16(), body
            )));
        }

        response.json().await.map_err(|e| {
          Error::InternalError(format!("Managed model error: {}", e))
        })
    }
}

// ===== Managed Model Adapter =====

/// Managed model adapter. Without an initialized client every call
/// fails before touching the network.
#[derive(Debug, Clone)]
pub struct ManagedModelAdapter
{   client: Option<ManagedClient>
}

impl ManagedModelAdapter
{   /// Initialize the platform client; failure is logged and leaves
    /// the adapter unavailable rather than aborting startup.
    pub fn new(config: &crate::config::ManagedConfig) -> Self
    {   debug!("Creating ManagedModelAdapter");
        let client = match ManagedClient::init(config)
        {   Ok(client) => Some(client)
          , Err(e) => {
              warn!("Managed model initialization failed: {}", e);
              None
            }
        };
        ManagedModelAdapter { client }
    }

    pub fn unavailable() -> Self
    {   ManagedModelAdapter { client: None }
    }

    pub fn name(&self) -> &'static str
    {   BACKEND_NAME
    }

    pub fn supports(&self, model: &str) -> bool
    {   is_valid_model_name(model)
    }

    pub fn is_available(&self) -> bool
    {   self.client.is_some()
    }

    pub async fn send(
      &self
    , request: &ChatRequest
    ) -> crate::error::Result<ChatResponse>
    {   let Some(client) = &self.client else
        {   error!("Managed model send while unavailable");
            return Err(Error::internal(UNAVAILABLE));
        };
        debug!("Managed model send for: {}", request.model);
        let started = Instant::now();

        let payload = build_payload(request);
        trace!("Managed model request: {:?}", payload);

        let reply = client
          .generate(&request.model, &payload)
          .await
          .map_err(|e| {
            error!("Managed model request failed: {}", e);
            e
          })?;

        trace!(
          "Managed model finish reason: {:?}",
          reply.candidates.first().and_then(|c| c.finish_reason.as_deref())
        );

        let response_text = reply.text().ok_or_else(|| {
          error!("Managed model reply had no text");
          Error::internal("Managed model error: response contained no text")
        })?;

        Ok(ChatResponse
        {   response_text
          , model: request.model.clone()
          , tokens_used: None
          , conversation_id: request.conversation_id.clone()
          , timestamp: chrono::Utc::now()
          , processing_time_seconds: started.elapsed().as_secs_f64()
        })
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn payload_ignores_system_prompt()
    {   let request = ChatRequest::new("hi")
          .with_system_prompt("be terse")
          .with_max_tokens(64);
        let json = serde_json::to_value(build_payload(&request)).unwrap();
        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 64);
    }

    #[test]
    fn reply_text_joins_first_candidate_parts()
    {   let reply: GenerateContentResponse = serde_json::from_str(
          r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"he"},{"text":"llo"}]}},
              {"content":{"parts":[{"text":"other"}]}}]}"#
        ).unwrap();
        assert_eq!(reply.text().as_deref(), Some("hello"));

        let empty: GenerateContentResponse
          = serde_json::from_str("{}").unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn missing_credentials_leave_adapter_unavailable()
    {   let adapter = ManagedModelAdapter::new(
          &crate::config::ManagedConfig::default()
        );
        assert!(!adapter.is_available());

        let adapter = ManagedModelAdapter::new(&crate::config::ManagedConfig
        {   project: "demo".to_string()
          , access_token: Some("token".to_string())
          , ..Default::default()
        });
        assert!(adapter.is_available());
    }

    #[test]
    fn model_names_are_path_safe()
    {   let adapter = ManagedModelAdapter::unavailable();
        assert!(adapter.supports("gemini-1.5-pro@002"));
        assert!(!adapter.supports("../secrets"));
        assert!(!adapter.supports(""));
    }

    #[tokio::test]
    async fn unavailable_adapter_fails_internally()
    {   let adapter = ManagedModelAdapter::unavailable();
        let result = adapter.send(&ChatRequest::new("hi")).await;
        assert_eq!(result, Err(Error::InternalError(UNAVAILABLE.to_string())));
    }
}

//! Normalized request and response types for the gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-pro";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const MAX_TOKENS_LIMIT: u32 = 4000;
pub const MAX_TEMPERATURE: f32 = 2.0;

fn default_model() -> String
{   DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32
{   DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32
{   DEFAULT_MAX_TOKENS
}

/// Normalized chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest
{   /// User message
    pub message: String
  , /// Model to use
    #[serde(default = "default_model")]
    pub model: String
  , /// Sampling temperature, 0.0 ..= 2.0
    #[serde(default = "default_temperature")]
    pub temperature: f32
  , /// Max tokens to generate, 1 ..= 4000
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32
  , /// Optional system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>
  , /// Opaque conversation id, echoed back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>
  , /// Explicit backend selection; the dispatcher default
    /// is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<crate::BackendKind>
}

impl ChatRequest
{   /// New request with every optional field at its default
    pub fn new(message: impl Into<String>) -> Self
    {   ChatRequest
        {   message: message.into()
          , model: default_model()
          , temperature: DEFAULT_TEMPERATURE
          , max_tokens: DEFAULT_MAX_TOKENS
          , system_prompt: None
          , conversation_id: None
          , backend: None
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self
    {   self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self
    {   self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self
    {   self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(
      mut self
    , system_prompt: impl Into<String>
    ) -> Self
    {   self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_conversation_id(
      mut self
    , conversation_id: impl Into<String>
    ) -> Self
    {   self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_backend(mut self, backend: crate::BackendKind) -> Self
    {   self.backend = Some(backend);
        self
    }

    /// Boundary validation. Requests that fail here never
    /// reach the dispatcher.
    pub fn validate(&self) -> crate::error::Result<()>
    {   use crate::error::Error;

        if self.message.is_empty()
        {   return Err(Error::InvalidRequest(
              "message must not be empty".to_string()
            ));
        }
        if self.model.is_empty()
        {   return Err(Error::InvalidRequest(
              "model must not be empty".to_string()
            ));
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature)
        {   return Err(Error::InvalidRequest(format!(
              "temperature must be within 0.0..=2.0, got {}",
              self.temperature
            )));
        }
        if !(1..=MAX_TOKENS_LIMIT).contains(&self.max_tokens)
        {   return Err(Error::InvalidRequest(format!(
              "max_tokens must be within 1..=4000, got {}",
              self.max_tokens
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON request body.
    pub fn from_json(body: &str) -> crate::error::Result<Self>
    {   let request: ChatRequest = serde_json::from_str(body)
          .map_err(|e| {
            crate::error::Error::InvalidRequest(e.to_string())
          })?;
        request.validate()?;
        Ok(request)
    }
}

/// Normalized chat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse
{   /// Generated text
    #[serde(rename = "response")]
    pub response_text: String
  , /// Model as requested
    pub model: String
  , /// Tokens used, when the backend reports it
    pub tokens_used: Option<u64>
  , /// Echo of the request's conversation id
    pub conversation_id: Option<String>
  , pub timestamp: DateTime<Utc>
  , /// Wall-clock seconds from dispatch start to outcome
    #[serde(rename = "processing_time")]
    pub processing_time_seconds: f64
}

/// Result of a single backend call as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome
{   Success(ChatResponse)
  , Timeout
  , UpstreamError
    {   status: u16
      , body: String
    }
  , TransportError(String)
  , InternalError(String)
}

impl BackendOutcome
{   pub fn class(&self) -> OutcomeClass
    {   match self
        {   BackendOutcome::Success(_) => OutcomeClass::Success
          , BackendOutcome::Timeout => OutcomeClass::Timeout
          , BackendOutcome::UpstreamError { .. } => {
              OutcomeClass::UpstreamError
            }
          , BackendOutcome::TransportError(_) => {
              OutcomeClass::TransportError
            }
          , BackendOutcome::InternalError(_) => {
              OutcomeClass::InternalError
            }
        }
    }

    pub fn into_result(self) -> crate::error::Result<ChatResponse>
    {   use crate::error::Error;
        match self
        {   BackendOutcome::Success(response) => Ok(response)
          , BackendOutcome::Timeout => Err(Error::Timeout)
          , BackendOutcome::UpstreamError { status, body } => {
              Err(Error::UpstreamError { status, body })
            }
          , BackendOutcome::TransportError(msg) => {
              Err(Error::TransportError(msg))
            }
          , BackendOutcome::InternalError(msg) => {
              Err(Error::InternalError(msg))
            }
        }
    }
}

impl From<crate::error::Result<ChatResponse>> for BackendOutcome
{   fn from(result: crate::error::Result<ChatResponse>) -> Self
    {   use crate::error::Error;
        match result
        {   Ok(response) => BackendOutcome::Success(response)
          , Err(Error::Timeout) => BackendOutcome::Timeout
          , Err(Error::UpstreamError { status, body }) => {
              BackendOutcome::UpstreamError { status, body }
            }
          , Err(Error::TransportError(msg)) => {
              BackendOutcome::TransportError(msg)
            }
          , Err(Error::InternalError(msg)) => {
              BackendOutcome::InternalError(msg)
            }
          , Err(other) => {
              BackendOutcome::InternalError(other.to_string())
            }
        }
    }
}

/// Metric label for a backend outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeClass
{   Success
  , Timeout
  , UpstreamError
  , TransportError
  , InternalError
}

impl OutcomeClass
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   OutcomeClass::Success => "success"
          , OutcomeClass::Timeout => "timeout"
          , OutcomeClass::UpstreamError => "error"
          , OutcomeClass::TransportError => "transport_error"
          , OutcomeClass::InternalError => "internal_error"
        }
    }
}

impl std::fmt::Display for OutcomeClass
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   f.write_str(self.as_str())
    }
}

/// Error body returned at the boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse
{   /// "HTTP <status>"
    pub error: String
  , pub message: String
  , pub timestamp: DateTime<Utc>
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>
}

impl ErrorResponse
{   pub fn from_error(
      error: &crate::error::Error
    , request_id: Option<String>
    ) -> Self
    {   ErrorResponse
        {   error: format!("HTTP {}", error.status_code())
          , message: error.to_string()
          , timestamp: Utc::now()
          , request_id
        }
    }
}

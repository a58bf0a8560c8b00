use thiserror::Error;

/// Classified failure of a gateway operation.
/// Every failure leaving the dispatcher is exactly one of
/// `Timeout`, `UpstreamError`, `TransportError` or `InternalError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error
{   /// Upstream did not answer within the call bound
    #[error("Request timeout")]
    Timeout
  , /// Upstream answered with a non-success status
    #[error("Upstream error ({status}): {body}")]
    UpstreamError
    {   status: u16
      , body: String
    }
  , /// Connection could not be established or was interrupted
    #[error("Connection error: {0}")]
    TransportError(String)
  , /// Local precondition failure or unexpected failure
    #[error("Internal error: {0}")]
    InternalError(String)
  , /// Request rejected at the boundary, before dispatch
    #[error("Invalid request: {0}")]
    InvalidRequest(String)
  , /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String)
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error
{   /// Boundary status code for this failure.
    pub fn status_code(&self) -> u16
    {   match self
        {   Error::Timeout => 504
          , Error::UpstreamError { .. } => 502
          , Error::TransportError(_) => 502
          , Error::InternalError(_) => 500
          , Error::InvalidRequest(_) => 422
          , Error::InvalidConfiguration(_) => 500
        }
    }

    /// Metric label for this failure.
    pub fn outcome_class(&self) -> crate::request::OutcomeClass
    {   use crate::request::OutcomeClass;
        match self
        {   Error::Timeout => OutcomeClass::Timeout
          , Error::UpstreamError { .. } => OutcomeClass::UpstreamError
          , Error::TransportError(_) => OutcomeClass::TransportError
          , Error::InternalError(_)
          | Error::InvalidRequest(_)
          | Error::InvalidConfiguration(_) => {
              OutcomeClass::InternalError
            }
        }
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self
    {   Error::InternalError(msg.into())
    }
}

/// Classify a reqwest failure that happened before a status
/// line was received.
impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   if e.is_timeout()
        {   Error::Timeout
        } else if e.is_connect() || e.is_request() || e.is_body()
        {   Error::TransportError(e.to_string())
        } else if e.is_decode()
        {   Error::InternalError(
              format!("Undecodable upstream reply: {}", e)
            )
        } else
        {   Error::InternalError(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::request::OutcomeClass;

    #[test]
    fn status_codes_follow_gateway_classes()
    {   assert_eq!(Error::Timeout.status_code(), 504);
        assert_eq!(
          Error::UpstreamError
          {   status: 429
            , body: "slow down".to_string()
          }.status_code(),
          502
        );
        assert_eq!(
          Error::TransportError("refused".into()).status_code(),
          502
        );
        assert_eq!(
          Error::internal("backend unavailable").status_code(),
          500
        );
    }

    #[test]
    fn upstream_error_keeps_body_in_message()
    {   let e = Error::UpstreamError
        {   status: 500
          , body: "boom".to_string()
        };
        assert_eq!(e.to_string(), "Upstream error (500): boom");
        assert_eq!(e.outcome_class(), OutcomeClass::UpstreamError);
    }
}

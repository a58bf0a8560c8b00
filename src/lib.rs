pub mod error;
pub mod config;
pub mod logging;
pub mod request;
pub mod metrics;
pub mod audit;
pub mod providers;
pub mod dispatcher;
use serde::{Deserialize, Serialize};

/*

aigate: the dispatch and resilience core of an AI gateway.
One normalized chat request goes in, one normalized response
(or one classified failure) comes out, whichever backend
served it.

aigate/
├── Cargo.toml
├── src/
│   ├── lib.rs          # Backend selector and re-exports
│   ├── error.rs        # Failure taxonomy and status mapping
│   ├── config.rs       # Environment driven configuration
│   ├── logging.rs      # env_logger JSON-line setup
│   ├── request.rs      # Normalized request/response types
│   ├── metrics.rs      # Outcome counters and duration histogram
│   ├── audit.rs        # Fire-and-forget audit records
│   ├── dispatcher.rs   # Adapter selection, timeout, metrics
│   └── providers/
│       ├── mod.rs      # Closed adapter set
│       ├── proxy.rs    # Chat-completion proxy (LiteLLM shape)
│       └── managed.rs  # Managed model platform (Vertex shape)
└── tests/

*/

pub use config::GatewayConfig;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use metrics::MetricsSink;
pub use request::{BackendOutcome, ChatRequest, ChatResponse, OutcomeClass};

/// The closed set of backends a request can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind
{   /// Chat-completion relay fronting many models
    Proxy
  , /// Cloud-hosted generative model platform
    Managed
}

impl BackendKind
{   /// Name used in metric labels and logs
    pub fn as_str(&self) -> &'static str
    {   match self
        {   BackendKind::Proxy => "proxy"
          , BackendKind::Managed => "managed"
        }
    }
}

impl std::fmt::Display for BackendKind
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind
{   type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self>
    {   match s.trim().to_lowercase().as_str()
        {   "proxy" | "litellm" => Ok(BackendKind::Proxy)
          , "managed" | "vertex" | "vertex_ai" => {
              Ok(BackendKind::Managed)
            }
          , other => Err(Error::InvalidConfiguration(
              format!("unknown backend: {}", other)
            ))
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn backend_names_parse()
    {   assert_eq!("proxy".parse::<BackendKind>(), Ok(BackendKind::Proxy));
        assert_eq!(
          "Vertex_AI".parse::<BackendKind>(),
          Ok(BackendKind::Managed)
        );
        assert!("openai".parse::<BackendKind>().is_err());
    }
}

//! Backend adapters

pub mod proxy;
pub mod managed;

// Re-export for convenience
pub use proxy::ProxyAdapter;
pub use managed::ManagedModelAdapter;

use std::time::Duration;

use crate::request::{ChatRequest, ChatResponse};
use crate::BackendKind;

/// The closed set of adapters. Each variant translates the
/// normalized request into its backend's shape and back.
#[derive(Debug, Clone)]
pub enum Adapter
{   Proxy(ProxyAdapter)
  , Managed(ManagedModelAdapter)
}

impl Adapter
{   pub fn kind(&self) -> BackendKind
    {   match self
        {   Adapter::Proxy(_) => BackendKind::Proxy
          , Adapter::Managed(_) => BackendKind::Managed
        }
    }

    pub fn name(&self) -> &'static str
    {   match self
        {   Adapter::Proxy(a) => a.name()
          , Adapter::Managed(a) => a.name()
        }
    }

    pub fn supports(&self, model: &str) -> bool
    {   match self
        {   Adapter::Proxy(a) => a.supports(model)
          , Adapter::Managed(a) => a.supports(model)
        }
    }

    /// Bound the dispatcher enforces on `send`. The managed path
    /// relies on the platform's own limits.
    pub fn call_timeout(&self) -> Option<Duration>
    {   match self
        {   Adapter::Proxy(a) => Some(a.call_timeout())
          , Adapter::Managed(_) => None
        }
    }

    pub async fn send(
      &self
    , request: &ChatRequest
    ) -> crate::error::Result<ChatResponse>
    {   match self
        {   Adapter::Proxy(a) => a.send(request).await
          , Adapter::Managed(a) => a.send(request).await
        }
    }
}

impl From<ProxyAdapter> for Adapter
{   fn from(adapter: ProxyAdapter) -> Self
    {   Adapter::Proxy(adapter)
    }
}

impl From<ManagedModelAdapter> for Adapter
{   fn from(adapter: ManagedModelAdapter) -> Self
    {   Adapter::Managed(adapter)
    }
}

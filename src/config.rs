//! Configuration for the gateway backends

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PROXY_URL: &str = "http://litellm-service:4000";
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MANAGED_REGION: &str = "us-central1";
pub const DEFAULT_AUDIT_CAPACITY: usize = 1024;

/// Chat-completion proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig
{   /// Base URL; `/chat/completions` is appended
    pub base_url: String
  , /// Upper bound on one chat completion call, in seconds
    pub timeout_secs: u64
}

impl ProxyConfig
{   pub fn timeout(&self) -> Duration
    {   Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProxyConfig
{   fn default() -> Self
    {   ProxyConfig
        {   base_url: DEFAULT_PROXY_URL.to_string()
          , timeout_secs: DEFAULT_PROXY_TIMEOUT_SECS
        }
    }
}

/// Managed generative-model platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedConfig
{   /// Cloud project id; empty means not configured
    pub project: String
  , pub region: String
  , /// API endpoint override, defaults to the regional endpoint
    pub api_base: Option<String>
  , /// OAuth access token
    pub access_token: Option<String>
}

impl ManagedConfig
{   pub fn endpoint(&self) -> String
    {   match &self.api_base
        {   Some(base) => base.trim_end_matches('/').to_string()
          , None => format!(
              "https://{}-aiplatform.googleapis.com",
              self.region
            )
        }
    }
}

impl Default for ManagedConfig
{   fn default() -> Self
    {   ManagedConfig
        {   project: String::new()
          , region: DEFAULT_MANAGED_REGION.to_string()
          , api_base: None
          , access_token: None
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig
{   pub proxy: ProxyConfig
  , pub managed: ManagedConfig
  , /// Backend used when a request names none
    pub default_backend: crate::BackendKind
  , /// Pending audit records before new ones are dropped
    pub audit_capacity: usize
  , pub log_level: String
}

impl Default for GatewayConfig
{   fn default() -> Self
    {   GatewayConfig
        {   proxy: ProxyConfig::default()
          , managed: ManagedConfig::default()
          , default_backend: crate::BackendKind::Proxy
          , audit_capacity: DEFAULT_AUDIT_CAPACITY
          , log_level: "info".to_string()
        }
    }
}

impl GatewayConfig
{   /// Load from process environment, falling back to defaults.
    pub fn from_env() -> crate::error::Result<Self>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> crate::error::Result<Self>
    where F: Fn(&str) -> Option<String>
    {   use crate::error::Error;

        let mut config = GatewayConfig::default();

        if let Some(url) = lookup("LITELLM_URL")
        {   config.proxy.base_url = url;
        }
        if let Some(secs) = lookup("PROXY_TIMEOUT_SECS")
        {   config.proxy.timeout_secs = secs.parse().map_err(|_| {
              Error::InvalidConfiguration(format!(
                "PROXY_TIMEOUT_SECS is not a number: {}", secs
              ))
            })?;
        }
        if let Some(project) = lookup("VERTEX_AI_PROJECT")
        {   config.managed.project = project;
        }
        if let Some(region) = lookup("VERTEX_AI_REGION")
        {   config.managed.region = region;
        }
        config.managed.api_base = lookup("VERTEX_AI_ENDPOINT");
        config.managed.access_token
          = lookup("VERTEX_AI_ACCESS_TOKEN");
        if let Some(backend) = lookup("DEFAULT_BACKEND")
        {   config.default_backend = backend.parse()?;
        }
        if let Some(capacity) = lookup("AUDIT_CAPACITY")
        {   config.audit_capacity = capacity.parse().map_err(|_| {
              Error::InvalidConfiguration(format!(
                "AUDIT_CAPACITY is not a number: {}", capacity
              ))
            })?;
        }
        if let Some(level) = lookup("LOG_LEVEL")
        {   config.log_level = level.to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::error::Result<()>
    {   use crate::error::Error;

        if self.proxy.base_url.is_empty()
        {   return Err(Error::InvalidConfiguration(
              "proxy base url is empty".to_string()
            ));
        }
        if self.proxy.timeout_secs == 0
        {   return Err(Error::InvalidConfiguration(
              "proxy timeout must be positive".to_string()
            ));
        }
        if self.audit_capacity == 0
        {   return Err(Error::InvalidConfiguration(
              "audit capacity must be positive".to_string()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::collections::HashMap;

    fn lookup_from(
      pairs: &[(&str, &str)]
    ) -> impl Fn(&str) -> Option<String>
    {   let map: HashMap<String, String> = pairs
          .iter()
          .map(|(k, v)| (k.to_string(), v.to_string()))
          .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_deployment()
    {   let config = GatewayConfig::from_lookup(lookup_from(&[]))
          .unwrap();
        assert_eq!(config.proxy.base_url, DEFAULT_PROXY_URL);
        assert_eq!(config.proxy.timeout(), Duration::from_secs(60));
        assert_eq!(config.managed.region, "us-central1");
        assert_eq!(
          config.managed.endpoint(),
          "https://us-central1-aiplatform.googleapis.com"
        );
        assert_eq!(config.default_backend, crate::BackendKind::Proxy);
    }

    #[test]
    fn environment_overrides_apply()
    {   let config = GatewayConfig::from_lookup(lookup_from(&[
          ("LITELLM_URL", "http://localhost:4000")
        , ("PROXY_TIMEOUT_SECS", "5")
        , ("VERTEX_AI_PROJECT", "demo")
        , ("DEFAULT_BACKEND", "managed")
        , ("LOG_LEVEL", "DEBUG")
        ])).unwrap();
        assert_eq!(config.proxy.base_url, "http://localhost:4000");
        assert_eq!(config.proxy.timeout_secs, 5);
        assert_eq!(config.managed.project, "demo");
        assert_eq!(
          config.default_backend,
          crate::BackendKind::Managed
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn bad_numbers_are_rejected()
    {   assert!(GatewayConfig::from_lookup(lookup_from(&[
          ("PROXY_TIMEOUT_SECS", "soon")
        ])).is_err());
        assert!(GatewayConfig::from_lookup(lookup_from(&[
          ("PROXY_TIMEOUT_SECS", "0")
        ])).is_err());
    }
}

use std::sync::Arc;
use std::time::Instant;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::audit::{AuditLog, AuditRecord};
use crate::error::Error;
use crate::metrics::MetricsSink;
use crate::providers::{Adapter, ManagedModelAdapter, ProxyAdapter};
use crate::request::{BackendOutcome, ChatRequest, ChatResponse};
use crate::BackendKind;

/// Metric label used when a backend name cannot be resolved
pub const UNKNOWN_BACKEND: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus
{   Healthy
  , Unhealthy
}

impl From<bool> for HealthStatus
{   fn from(ok: bool) -> Self
    {   if ok { HealthStatus::Healthy } else { HealthStatus::Unhealthy }
    }
}

/// Per-backend health as reported by `backend_health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth
{   pub proxy: HealthStatus
  , pub managed: HealthStatus
}

/// Owns the adapters, the audit writer and a handle on the metrics
/// sink. Shared by reference across request tasks; nothing in here
/// is mutated per request.
pub struct Dispatcher
{   adapters: Vec<Adapter>
  , default_backend: BackendKind
  , metrics: Arc<MetricsSink>
  , audit: AuditLog
}

impl Dispatcher
{   /// Build every adapter from configuration and start the audit
    /// writer. Must be called inside a tokio runtime.
    pub fn new(
      config: &crate::config::GatewayConfig
    , metrics: Arc<MetricsSink>
    ) -> crate::error::Result<Self>
    {   config.validate()?;
        debug!("Creating Dispatcher, default backend {}", config.default_backend);
        let proxy = ProxyAdapter::new(&config.proxy)?;
        let managed = ManagedModelAdapter::new(&config.managed);
        let audit = AuditLog::spawn(config.audit_capacity);
        Ok(Self::from_parts(
          vec![proxy.into(), managed.into()]
        , config.default_backend
        , metrics
        , audit
        ))
    }

    /// Assemble from already constructed parts.
    pub fn from_parts(
      adapters: Vec<Adapter>
    , default_backend: BackendKind
    , metrics: Arc<MetricsSink>
    , audit: AuditLog
    ) -> Self
    {   Dispatcher
        {   adapters
          , default_backend
          , metrics
          , audit
        }
    }

    pub fn metrics(&self) -> &Arc<MetricsSink>
    {   &self.metrics
    }

    fn adapter(&self, kind: BackendKind) -> Option<&Adapter>
    {   self.adapters.iter().find(|a| a.kind() == kind)
    }

    /// Route to the request's explicit backend, or the default one.
    pub async fn handle(
      &self
    , request: &ChatRequest
    ) -> crate::error::Result<ChatResponse>
    {   let started = Instant::now();
        let kind = request.backend.unwrap_or(self.default_backend);

        let outcome = match self.adapter(kind)
        {   Some(adapter) => self.call(adapter, request).await
          , None => {
              error!("Backend {} is not configured", kind);
              BackendOutcome::InternalError(
                format!("unknown backend: {}", kind)
              )
            }
        };
        self.finish(kind.as_str(), request, outcome, started)
    }

    /// Route by backend name, as selected at the boundary. Names
    /// outside the known set fail with `InternalError`.
    pub async fn handle_named(
      &self
    , backend: &str
    , request: &ChatRequest
    ) -> crate::error::Result<ChatResponse>
    {   match backend.parse::<BackendKind>()
        {   Ok(kind) => {
              let routed = ChatRequest
              {   backend: Some(kind)
                , ..request.clone()
              };
              self.handle(&routed).await
            }
          , Err(_) => {
              let started = Instant::now();
              error!("Unknown backend requested: {}", backend);
              let outcome = BackendOutcome::InternalError(
                format!("unknown backend: {}", backend)
              );
              self.finish(UNKNOWN_BACKEND, request, outcome, started)
            }
        }
    }

    async fn call(
      &self
    , adapter: &Adapter
    , request: &ChatRequest
    ) -> BackendOutcome
    {   if !adapter.supports(&request.model)
        {   return BackendOutcome::InternalError(format!(
              "model {} is not supported by backend {}",
              request.model, adapter.name()
            ));
        }

        let result = match adapter.call_timeout()
        {   Some(bound) => {
              // Dropping the send future on expiry closes its
              // connection instead of returning it half-read.
              match tokio::time::timeout(bound, adapter.send(request)).await
              {   Ok(result) => result
                , Err(_) => {
                    warn!(
                      "{} call exceeded {:?} for model {}",
                      adapter.name(), bound, request.model
                    );
                    Err(Error::Timeout)
                  }
              }
            }
          , None => adapter.send(request).await
        };
        BackendOutcome::from(result)
    }

    /// Stamp the elapsed time, record metrics exactly once, audit
    /// successes, and convert to the caller-facing result.
    fn finish(
      &self
    , backend: &str
    , request: &ChatRequest
    , outcome: BackendOutcome
    , started: Instant
    ) -> crate::error::Result<ChatResponse>
    {   let elapsed = started.elapsed().as_secs_f64();
        let class = outcome.class();

        self.metrics.record(backend, &request.model, class);
        self.metrics.record_duration(elapsed);

        let outcome = match outcome
        {   BackendOutcome::Success(mut response) => {
              response.processing_time_seconds = elapsed;
              info!(
                "Chat completed backend={} model={} processing_time={:.3}",
                backend, request.model, elapsed
              );
              self.audit.submit(AuditRecord::new(request, &response));
              BackendOutcome::Success(response)
            }
          , failure => {
              error!(
                "Chat failed backend={} model={} outcome={} processing_time={:.3}",
                backend, request.model, class, elapsed
              );
              failure
            }
        };
        outcome.into_result()
    }

    /// Probe every backend. The proxy is asked over HTTP; the
    /// managed platform is healthy when its client initialized.
    pub async fn backend_health(&self) -> BackendHealth
    {   let proxy = match self.adapter(BackendKind::Proxy)
        {   Some(Adapter::Proxy(a)) => a.health().await
          , _ => false
        };
        let managed = match self.adapter(BackendKind::Managed)
        {   Some(Adapter::Managed(a)) => a.is_available()
          , _ => false
        };
        BackendHealth
        {   proxy: proxy.into()
          , managed: managed.into()
        }
    }

    /// The proxy's model catalog.
    pub async fn list_models(
      &self
    ) -> crate::error::Result<serde_json::Value>
    {   match self.adapter(BackendKind::Proxy)
        {   Some(Adapter::Proxy(a)) => a.list_models().await
          , _ => Err(Error::internal("unknown backend: proxy"))
        }
    }

    /// Drain pending audit records and release pooled connections.
    pub async fn shutdown(mut self)
    {   info!("Dispatcher shutting down");
        self.audit.close().await;
        self.adapters.clear();
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::request::OutcomeClass;

    fn dispatcher_without_backends() -> Dispatcher
    {   Dispatcher::from_parts(
          vec![]
        , BackendKind::Proxy
        , Arc::new(MetricsSink::new())
        , AuditLog::spawn(4)
        )
    }

    #[tokio::test]
    async fn unregistered_backend_is_internal_error()
    {   let dispatcher = dispatcher_without_backends();
        let result = dispatcher.handle(&ChatRequest::new("hi")).await;
        assert!(matches!(result, Err(Error::InternalError(_))));
        assert_eq!(
          dispatcher.metrics().counter(
            "proxy", "gemini-pro", OutcomeClass::InternalError
          ),
          1
        );
    }

    #[tokio::test]
    async fn unknown_backend_name_is_internal_error()
    {   let dispatcher = dispatcher_without_backends();
        for message in ["hi", "something else entirely"]
        {   let result = dispatcher
              .handle_named("openai", &ChatRequest::new(message))
              .await;
            assert_eq!(
              result,
              Err(Error::InternalError("unknown backend: openai".to_string()))
            );
        }
        assert_eq!(
          dispatcher.metrics().counter(
            UNKNOWN_BACKEND, "gemini-pro", OutcomeClass::InternalError
          ),
          2
        );
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn unavailable_managed_backend_is_reported_unhealthy()
    {   let dispatcher = Dispatcher::from_parts(
          vec![ManagedModelAdapter::unavailable().into()]
        , BackendKind::Managed
        , Arc::new(MetricsSink::new())
        , AuditLog::spawn(4)
        );
        let health = dispatcher.backend_health().await;
        assert_eq!(health.proxy, HealthStatus::Unhealthy);
        assert_eq!(health.managed, HealthStatus::Unhealthy);
        assert!(dispatcher.list_models().await.is_err());
    }

    #[tokio::test]
    async fn unavailable_managed_backend_message_is_not_rewrapped()
    {   let dispatcher = Dispatcher::from_parts(
          vec![ManagedModelAdapter::unavailable().into()]
        , BackendKind::Managed
        , Arc::new(MetricsSink::new())
        , AuditLog::spawn(4)
        );
        let result = dispatcher.handle(&ChatRequest::new("hi")).await;
        assert_eq!(
          result,
          Err(Error::InternalError("backend unavailable".to_string()))
        );
        let body = crate::request::ErrorResponse::from_error(
          &result.unwrap_err(), None
        );
        assert_eq!(body.message, "Internal error: backend unavailable");
        assert_eq!(dispatcher.metrics().snapshot().duration.count, 1);
    }
}

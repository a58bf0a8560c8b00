//! Fire-and-forget audit trail for completed chats
//!
//! The request path only ever calls `try_send`; the writer task
//! owns the receiving end and is the only thing that logs.

use log::{debug, info};
use serde::Serialize;
use tokio::sync::mpsc;

pub const AUDIT_TARGET: &str = "aigate::audit";

/// One record per successful completion. Lengths only, never
/// content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord
{   pub model: String
  , pub input_length: usize
  , pub output_length: usize
  , pub processing_time: f64
  , pub tokens_used: Option<u64>
}

impl AuditRecord
{   pub fn new(
      request: &crate::request::ChatRequest
    , response: &crate::request::ChatResponse
    ) -> Self
    {   AuditRecord
        {   model: response.model.clone()
          , input_length: request.message.chars().count()
          , output_length: response.response_text.chars().count()
          , processing_time: response.processing_time_seconds
          , tokens_used: response.tokens_used
        }
    }
}

/// Where the writer task delivers records
pub trait AuditWriter: Send + 'static
{   fn write(&mut self, record: &AuditRecord);
}

/// Default writer: one structured `info!` line on the audit target
#[derive(Debug, Default)]
pub struct LogWriter;

impl AuditWriter for LogWriter
{   fn write(&mut self, record: &AuditRecord)
    {   match serde_json::to_string(record)
        {   Ok(fields) => {
              info!(target: AUDIT_TARGET, "Chat request processed {}", fields);
            }
          , Err(e) => {
              debug!(target: AUDIT_TARGET, "Audit record not encodable: {}", e);
            }
        }
    }
}

/// Forwards records to a channel; used to observe the trail.
impl AuditWriter for mpsc::UnboundedSender<AuditRecord>
{   fn write(&mut self, record: &AuditRecord)
    {   if self.send(record.clone()).is_err()
        {   debug!(target: AUDIT_TARGET, "Audit observer gone");
        }
    }
}

/// Handle on the audit writer task
pub struct AuditLog
{   tx: Option<mpsc::Sender<AuditRecord>>
  , task: Option<tokio::task::JoinHandle<()>>
}

impl AuditLog
{   /// Spawn the writer task with the default log writer.
    /// Must be called inside a tokio runtime.
    pub fn spawn(capacity: usize) -> Self
    {   Self::with_writer(capacity, LogWriter)
    }

    pub fn with_writer<W: AuditWriter>(
      capacity: usize
    , writer: W
    ) -> Self
    {   debug!("Starting audit writer, capacity {}", capacity);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(async move {
          run_audit_loop(rx, writer).await
        });
        AuditLog
        {   tx: Some(tx)
          , task: Some(task)
        }
    }

    /// Hand off a record. Never blocks; drops the record when the
    /// writer is saturated or gone.
    pub fn submit(&self, record: AuditRecord)
    {   let Some(tx) = &self.tx else
        {   debug!(target: AUDIT_TARGET, "Audit log closed, record dropped");
            return;
        };
        if let Err(e) = tx.try_send(record)
        {   debug!(target: AUDIT_TARGET, "Audit record dropped: {}", e);
        }
    }

    /// Stop accepting records and wait for the backlog to drain.
    pub async fn close(&mut self)
    {   self.tx.take();
        if let Some(task) = self.task.take()
        {   if let Err(e) = task.await
            {   debug!(target: AUDIT_TARGET, "Audit writer ended abnormally: {}", e);
            }
        }
    }
}

async fn run_audit_loop<W: AuditWriter>(
  mut rx: mpsc::Receiver<AuditRecord>
, mut writer: W
)
{   while let Some(record) = rx.recv().await
    {   writer.write(&record);
    }
    debug!("Audit writer stopped");
}

#[cfg(test)]
mod tests
{   use super::*;

    fn record(model: &str) -> AuditRecord
    {   AuditRecord
        {   model: model.to_string()
          , input_length: 2
          , output_length: 5
          , processing_time: 0.1
          , tokens_used: Some(7)
        }
    }

    #[tokio::test]
    async fn records_reach_the_writer_in_order()
    {   let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
        let mut audit = AuditLog::with_writer(8, obs_tx);
        audit.submit(record("a"));
        audit.submit(record("b"));
        audit.close().await;

        assert_eq!(obs_rx.recv().await.unwrap().model, "a");
        assert_eq!(obs_rx.recv().await.unwrap().model, "b");
        assert!(obs_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn submit_after_close_is_silent()
    {   let mut audit = AuditLog::spawn(1);
        audit.close().await;
        audit.submit(record("late"));
    }

    /// Holds every write until the gate sender is dropped.
    struct GatedWriter
    {   gate: std::sync::mpsc::Receiver<()>
      , seen: std::sync::mpsc::Sender<AuditRecord>
    }

    impl AuditWriter for GatedWriter
    {   fn write(&mut self, record: &AuditRecord)
        {   let _ = self.gate.recv();
            let _ = self.seen.send(record.clone());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn saturated_writer_drops_records_without_blocking()
    {   let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let mut audit = AuditLog::with_writer(
          1
        , GatedWriter { gate: gate_rx, seen: seen_tx }
        );

        let started = std::time::Instant::now();
        audit.submit(record("a"));
        audit.submit(record("b"));
        audit.submit(record("c"));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        drop(gate_tx);
        audit.close().await;

        let delivered: Vec<AuditRecord> = seen_rx.try_iter().collect();
        assert!(!delivered.is_empty());
        assert!(delivered.len() < 3);
        assert_eq!(delivered[0].model, "a");
    }

    #[test]
    fn record_counts_characters_not_bytes()
    {   let request = crate::request::ChatRequest::new("héllo");
        let response = crate::request::ChatResponse
        {   response_text: "ok".to_string()
          , model: "gemini-pro".to_string()
          , tokens_used: None
          , conversation_id: None
          , timestamp: chrono::Utc::now()
          , processing_time_seconds: 0.5
        };
        let record = AuditRecord::new(&request, &response);
        assert_eq!(record.input_length, 5);
        assert_eq!(record.output_length, 2);
        assert_eq!(record.tokens_used, None);
    }
}

//! Structured logging setup

use std::io::Write;

/// Install the env_logger backend, one JSON object per line.
/// `RUST_LOG` wins over `level` when set. Calling twice is a
/// no-op.
pub fn init(level: &str)
{   let env = env_logger::Env::default()
      .default_filter_or(level.to_string());

    let result = env_logger::Builder::from_env(env)
      .format(|buf, record| {
        writeln!(buf, "{}", json_line(record))
      })
      .try_init();

    if result.is_err()
    {   log::debug!("Logger already initialized");
    }
}

/// Fields: `timestamp`, `level`, `target`, `message`.
fn json_line(record: &log::Record<'_>) -> serde_json::Value
{   serde_json::json!({
      "timestamp": chrono::Utc::now().to_rfc3339()
    , "level": record.level().to_string().to_lowercase()
    , "target": record.target()
    , "message": record.args().to_string()
    })
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn init_twice_does_not_panic()
    {   init("debug");
        init("info");
        log::info!("logging initialized");
    }

    #[test]
    fn line_carries_documented_keys()
    {   let line = json_line(
          &log::Record::builder()
            .level(log::Level::Warn)
            .target("aigate::dispatcher")
            .args(format_args!("proxy call exceeded {}s", 60))
            .build()
        );
        assert_eq!(line["level"], "warn");
        assert_eq!(line["target"], "aigate::dispatcher");
        assert_eq!(line["message"], "proxy call exceeded 60s");
        assert!(line["timestamp"].is_string());
    }
}

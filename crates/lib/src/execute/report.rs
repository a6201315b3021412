//! Build progress reporting.

use std::sync::{Mutex, PoisonError};

use crate::util::hash::HashKey;

/// Events emitted by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
  /// An action was launched.
  Started { action: String, display: String },
  /// An action was up to date.
  Skipped { action: String },
  /// An action's outputs were restored from the stash.
  Restored { action: String, key: HashKey },
  /// An action finished; `output` is everything it captured.
  Finished {
    action: String,
    display: String,
    code: i32,
    output: Vec<u8>,
  },
  /// An in-flight action was cancelled.
  Terminated { action: String },
  /// The user interrupted the build.
  Interrupted { in_flight: usize },
}

/// Receives engine events. The library never prints on its own.
pub trait BuildReporter: Send + Sync {
  fn report(&self, event: &BuildEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl BuildReporter for TracingReporter {
  fn report(&self, event: &BuildEvent) {
    match event {
      BuildEvent::Started { action, display: shown } => {
        tracing::info!(action = %action, "started: {}", shown);
      }
      BuildEvent::Skipped { action } => {
        tracing::info!(action = %action, "up to date");
      }
      BuildEvent::Restored { action, key } => {
        tracing::info!(action = %action, key = %key, "restored from stash");
      }
      BuildEvent::Finished {
        action, code, output, ..
      } => {
        if *code == 0 {
          tracing::info!(action = %action, "finished");
        } else {
          tracing::error!(action = %action, code, "failed");
        }
        if !output.is_empty() {
          tracing::debug!(action = %action, "{}", String::from_utf8_lossy(output));
        }
      }
      BuildEvent::Terminated { action } => {
        tracing::warn!(action = %action, "terminated");
      }
      BuildEvent::Interrupted { in_flight } => {
        tracing::warn!(in_flight, "interrupted");
      }
    }
  }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
  events: Mutex<Vec<BuildEvent>>,
}

impl CollectingReporter {
  pub fn events(&self) -> Vec<BuildEvent> {
    self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl BuildReporter for CollectingReporter {
  fn report(&self, event: &BuildEvent) {
    self
      .events
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(event.clone());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tracing_test::traced_test;

  #[test]
  fn collecting_reporter_keeps_order() {
    let reporter = CollectingReporter::default();
    reporter.report(&BuildEvent::Skipped { action: "a".into() });
    reporter.report(&BuildEvent::Terminated { action: "b".into() });

    assert_eq!(
      reporter.events(),
      vec![
        BuildEvent::Skipped { action: "a".into() },
        BuildEvent::Terminated { action: "b".into() },
      ]
    );
  }

  #[traced_test]
  #[test]
  fn tracing_reporter_logs_failures() {
    TracingReporter.report(&BuildEvent::Finished {
      action: "//demo:a!run".into(),
      display: "false".into(),
      code: 2,
      output: Vec::new(),
    });
    assert!(logs_contain("failed"));
    assert!(logs_contain("//demo:a!run"));
  }
}

//! CLI output formatting utilities.
//!
//! Colored status messages, duration formatting and the console build
//! reporter.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::execute::{BuildEvent, BuildReporter};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
}

pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Prints `[identifier]: display` for every launched action and replays
/// captured output with the same prefix once the action finishes.
pub struct ConsoleReporter {
  verbose: bool,
}

impl ConsoleReporter {
  pub fn new(verbose: bool) -> Self {
    Self { verbose }
  }
}

fn prefix(action: &str) -> String {
  format!("[{}]", action)
}

impl BuildReporter for ConsoleReporter {
  fn report(&self, event: &BuildEvent) {
    match event {
      BuildEvent::Started { action, display } => {
        if display == action {
          return;
        }
        println!(
          "{}: {}",
          prefix(action).if_supports_color(Stream::Stdout, |s| s.cyan()),
          display
        );
      }
      BuildEvent::Skipped { action } => {
        if self.verbose {
          println!(
            "{}: {}",
            prefix(action).if_supports_color(Stream::Stdout, |s| s.dimmed()),
            "up to date".if_supports_color(Stream::Stdout, |s| s.dimmed())
          );
        }
      }
      BuildEvent::Restored { action, key } => {
        println!(
          "{}: restored from stash ({})",
          prefix(action).if_supports_color(Stream::Stdout, |s| s.cyan()),
          truncate_hash(&key.0)
        );
      }
      BuildEvent::Finished {
        action, code, output, ..
      } => {
        for line in String::from_utf8_lossy(output).lines() {
          println!("{} {}", prefix(action), line);
        }
        if *code != 0 {
          eprintln!(
            "{} exited with code {}",
            prefix(action).if_supports_color(Stream::Stderr, |s| s.red()),
            code
          );
        }
      }
      BuildEvent::Terminated { action } => {
        print_warning(&format!("{} terminated", prefix(action)));
      }
      BuildEvent::Interrupted { in_flight } => {
        print_warning(&format!("Interrupted, stopping {} running action(s)", in_flight));
      }
    }
  }
}

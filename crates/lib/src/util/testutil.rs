//! Test utilities for kiln-lib.
//!
//! This module provides cross-platform helpers for tests that need to execute
//! shell commands as argv lists.

/// Returns an argv that runs `script` through the platform shell.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> Vec<String> {
  vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> Vec<String> {
  vec!["cmd.exe".to_string(), "/C".to_string(), script.to_string()]
}

/// Returns an argv that exits with the given status code.
pub fn exit_with(code: i32) -> Vec<String> {
  shell_cmd(&format!("exit {}", code))
}

/// Returns an argv that prints a message.
#[cfg(unix)]
pub fn echo_msg(msg: &str) -> Vec<String> {
  vec!["/bin/echo".to_string(), msg.to_string()]
}

#[cfg(windows)]
pub fn echo_msg(msg: &str) -> Vec<String> {
  vec!["cmd.exe".to_string(), "/C".to_string(), format!("echo {}", msg)]
}

/// Returns an argv that blocks for roughly `secs` seconds.
#[cfg(unix)]
pub fn sleep_for(secs: u32) -> Vec<String> {
  vec!["/bin/sleep".to_string(), secs.to_string()]
}

#[cfg(windows)]
pub fn sleep_for(secs: u32) -> Vec<String> {
  vec![
    "powershell.exe".to_string(),
    "-NoProfile".to_string(),
    "-Command".to_string(),
    format!("Start-Sleep -Seconds {}", secs),
  ]
}

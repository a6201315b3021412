//! Run-state of one in-flight action execution.
//!
//! An [`ActionProcess`] owns a tokio worker task that runs a queue of
//! commands strictly in order. The worker and the polling engine share the
//! current command, captured output and exit code behind a mutex.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::consts::{EXIT_INTERRUPTED, EXIT_SPAWN_FAILED};

/// Observable state of an [`ActionProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
  Running,
  /// Cancelled through [`ActionProcess::terminate`].
  Terminated,
  Completed(i32),
}

/// Commands run by one action, with their shared settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandQueue {
  /// Argument vectors, run in order. A failure aborts the rest.
  pub commands: Vec<Vec<String>>,
  pub cwd: Option<PathBuf>,
  /// Overrides on top of the inherited environment.
  pub env: BTreeMap<String, String>,
  /// Buffer stdout and stderr instead of inheriting them.
  pub capture: bool,
}

#[derive(Debug, Default)]
struct ProcessState {
  display: String,
  current: Option<String>,
  pending: VecDeque<Vec<String>>,
  output: Vec<u8>,
  progress: Option<(usize, usize)>,
  exit_code: Option<i32>,
  terminated: bool,
}

#[derive(Debug, Default)]
struct Shared {
  state: Mutex<ProcessState>,
  cancel: Notify,
}

impl Shared {
  fn lock(&self) -> MutexGuard<'_, ProcessState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Settings the worker needs once the queue has moved into shared state.
#[derive(Debug)]
struct Settings {
  cwd: Option<PathBuf>,
  env: BTreeMap<String, String>,
  capture: bool,
  total: usize,
}

/// Ephemeral run-state of one action execution. Never persisted.
#[derive(Debug)]
pub struct ActionProcess {
  shared: Arc<Shared>,
  worker: Option<JoinHandle<()>>,
}

impl ActionProcess {
  /// A process that has already completed with `code`.
  pub fn finished(display: impl Into<String>, code: i32, output: Vec<u8>) -> Self {
    let state = ProcessState {
      display: display.into(),
      output,
      exit_code: Some(code),
      ..Default::default()
    };
    Self {
      shared: Arc::new(Shared {
        state: Mutex::new(state),
        cancel: Notify::new(),
      }),
      worker: None,
    }
  }

  /// Start a worker running `queue`. Returns immediately.
  pub fn spawn(display: impl Into<String>, queue: CommandQueue) -> Self {
    let settings = Settings {
      cwd: queue.cwd,
      env: queue.env,
      capture: queue.capture,
      total: queue.commands.len(),
    };
    let state = ProcessState {
      display: display.into(),
      pending: queue.commands.into(),
      ..Default::default()
    };
    let shared = Arc::new(Shared {
      state: Mutex::new(state),
      cancel: Notify::new(),
    });

    let worker = tokio::spawn(drive(Arc::clone(&shared), settings));
    Self {
      shared,
      worker: Some(worker),
    }
  }

  /// The exit code once the worker has finished, `None` while running.
  pub fn poll(&self) -> Option<i32> {
    if let Some(code) = self.shared.lock().exit_code {
      return Some(code);
    }
    // A worker that finished without recording a code has panicked.
    if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
      let mut state = self.shared.lock();
      return Some(*state.exit_code.get_or_insert(1));
    }
    None
  }

  pub fn status(&self) -> ProcessStatus {
    let state = self.shared.lock();
    match (state.terminated, state.exit_code) {
      (true, _) => ProcessStatus::Terminated,
      (false, Some(code)) => ProcessStatus::Completed(code),
      (false, None) => ProcessStatus::Running,
    }
  }

  /// Kill the current command and drop the pending ones.
  pub fn terminate(&self) {
    {
      let mut state = self.shared.lock();
      if state.exit_code.is_some() {
        return;
      }
      state.terminated = true;
      state.pending.clear();
    }
    self.shared.cancel.notify_one();
  }

  /// Wait for the worker to unwind completely.
  pub async fn wait(&mut self) -> Option<i32> {
    if let Some(worker) = self.worker.take()
      && let Err(err) = worker.await
    {
      warn!(error = %err, "action worker did not finish cleanly");
      self.shared.lock().exit_code.get_or_insert(1);
    }
    self.shared.lock().exit_code
  }

  /// Output captured so far.
  pub fn output(&self) -> Vec<u8> {
    self.shared.lock().output.clone()
  }

  pub fn display_text(&self) -> String {
    self.shared.lock().display.clone()
  }

  /// The command currently (or last) run.
  pub fn current_command(&self) -> Option<String> {
    self.shared.lock().current.clone()
  }

  /// `(started, total)` commands.
  pub fn progress(&self) -> Option<(usize, usize)> {
    self.shared.lock().progress
  }
}

impl Drop for ActionProcess {
  fn drop(&mut self) {
    if self.worker.as_ref().is_some_and(|w| !w.is_finished()) {
      self.terminate();
    }
  }
}

async fn drive(shared: Arc<Shared>, settings: Settings) {
  let mut code = 0;
  let mut started = 0;

  loop {
    let argv = {
      let mut state = shared.lock();
      if state.terminated {
        break;
      }
      let Some(argv) = state.pending.pop_front() else {
        break;
      };
      started += 1;
      state.progress = Some((started, settings.total));
      state.current = Some(argv.join(" "));
      argv
    };

    code = run_command(&shared, &argv, &settings).await;
    if code != 0 {
      break;
    }
  }

  let mut state = shared.lock();
  if state.terminated && code == 0 {
    code = EXIT_INTERRUPTED;
  }
  state.pending.clear();
  state.exit_code = Some(code);
}

async fn run_command(shared: &Arc<Shared>, argv: &[String], settings: &Settings) -> i32 {
  let Some((program, args)) = argv.split_first() else {
    return 0;
  };

  let mut command = Command::new(program);
  command
    .args(args)
    .envs(&settings.env)
    .stdin(Stdio::null())
    .kill_on_drop(true);
  if let Some(cwd) = &settings.cwd {
    command.current_dir(cwd);
  }
  if settings.capture {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
  }

  debug!(program = %program, args = ?args, cwd = ?settings.cwd, "spawning process");

  let mut child = match command.spawn() {
    Ok(child) => child,
    Err(err) => {
      warn!(program = %program, error = %err, "failed to spawn process");
      let message = format!("kiln: failed to run {}: {}\n", program, err);
      shared.lock().output.extend_from_slice(message.as_bytes());
      return EXIT_SPAWN_FAILED;
    }
  };

  let mut readers: Vec<JoinHandle<()>> = [
    child.stdout.take().map(|r| spawn_reader(shared, r)),
    child.stderr.take().map(|r| spawn_reader(shared, r)),
  ]
  .into_iter()
  .flatten()
  .collect();

  let (status, killed) = tokio::select! {
    status = child.wait() => (status, false),
    _ = shared.cancel.notified() => {
      debug!(program = %program, "killing process");
      if let Err(err) = child.start_kill() {
        debug!(error = %err, "process already exited");
      }
      (child.wait().await, true)
    }
  };

  // A background child may keep the pipes open after the command exits.
  let drained = !killed
    && tokio::select! {
      _ = drain(&mut readers) => true,
      _ = shared.cancel.notified() => {
        debug!(program = %program, "output still open, detaching readers");
        false
      }
    };
  if !drained {
    readers.iter().for_each(JoinHandle::abort);
  }

  exit_code(status)
}

async fn drain(readers: &mut [JoinHandle<()>]) {
  for reader in readers {
    let _ = reader.await;
  }
}

fn spawn_reader<R>(shared: &Arc<Shared>, mut reader: R) -> JoinHandle<()>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  let shared = Arc::clone(shared);
  tokio::spawn(async move {
    let mut buf = [0u8; 4096];
    loop {
      match reader.read(&mut buf).await {
        Ok(0) | Err(_) => break,
        Ok(n) => shared.lock().output.extend_from_slice(&buf[..n]),
      }
    }
  })
}

fn exit_code(status: io::Result<ExitStatus>) -> i32 {
  match status {
    Ok(status) => status.code().unwrap_or_else(|| signal_code(&status)),
    Err(err) => {
      warn!(error = %err, "failed to wait for process");
      1
    }
  }
}

#[cfg(unix)]
fn signal_code(status: &ExitStatus) -> i32 {
  use std::os::unix::process::ExitStatusExt;
  status.signal().map(|sig| 128 + sig).unwrap_or(1)
}

#[cfg(not(unix))]
fn signal_code(_status: &ExitStatus) -> i32 {
  1
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{echo_msg, exit_with, shell_cmd, sleep_for};
  use std::time::Duration;
  use tempfile::TempDir;

  fn captured(commands: Vec<Vec<String>>) -> CommandQueue {
    CommandQueue {
      commands,
      capture: true,
      ..Default::default()
    }
  }

  async fn wait_done(process: &mut ActionProcess) -> Option<i32> {
    tokio::time::timeout(Duration::from_secs(10), process.wait())
      .await
      .expect("process did not finish in time")
  }

  #[test]
  fn finished_process_is_complete() {
    let process = ActionProcess::finished("noop", 0, b"done".to_vec());
    assert_eq!(process.poll(), Some(0));
    assert_eq!(process.status(), ProcessStatus::Completed(0));
    assert_eq!(process.output(), b"done");
  }

  #[tokio::test]
  async fn commands_run_in_order_and_output_is_captured() {
    let mut process = ActionProcess::spawn("echo", captured(vec![echo_msg("one"), echo_msg("two")]));

    assert_eq!(wait_done(&mut process).await, Some(0));
    assert_eq!(process.poll(), Some(0));
    let output = String::from_utf8(process.output()).unwrap();
    let lines: Vec<&str> = output.lines().map(str::trim).collect();
    assert_eq!(lines, vec!["one", "two"]);
    assert_eq!(process.progress(), Some((2, 2)));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn failing_command_aborts_the_queue() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("marker");

    let mut process = ActionProcess::spawn(
      "fail",
      captured(vec![exit_with(3), shell_cmd(&format!("touch {}", marker.display()))]),
    );

    assert_eq!(wait_done(&mut process).await, Some(3));
    assert_eq!(process.status(), ProcessStatus::Completed(3));
    assert_eq!(process.progress(), Some((1, 2)));
    assert!(!marker.exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn env_and_cwd_are_applied() {
    let temp = TempDir::new().unwrap();
    let queue = CommandQueue {
      commands: vec![shell_cmd("echo $KILN_TEST_VAR; pwd")],
      cwd: Some(temp.path().to_path_buf()),
      env: BTreeMap::from([("KILN_TEST_VAR".to_string(), "hello".to_string())]),
      capture: true,
    };
    let mut process = ActionProcess::spawn("env", queue);

    assert_eq!(wait_done(&mut process).await, Some(0));
    let output = String::from_utf8(process.output()).unwrap();
    let mut lines = output.lines();
    assert_eq!(lines.next(), Some("hello"));
    let cwd = PathBuf::from(lines.next().unwrap());
    assert_eq!(
      dunce::canonicalize(cwd).unwrap(),
      dunce::canonicalize(temp.path()).unwrap()
    );
  }

  #[tokio::test]
  async fn poll_is_none_while_running() {
    let process = ActionProcess::spawn("sleep", captured(vec![sleep_for(30)]));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(process.poll(), None);
    assert_eq!(process.status(), ProcessStatus::Running);
    process.terminate();
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn terminate_kills_the_current_command() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("marker");
    let mut process = ActionProcess::spawn(
      "sleep",
      captured(vec![sleep_for(30), shell_cmd(&format!("touch {}", marker.display()))]),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    process.terminate();
    let code = wait_done(&mut process).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(code, Some(128 + 9));
    assert_eq!(process.status(), ProcessStatus::Terminated);
    assert!(!marker.exists());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn terminate_detaches_pipes_held_by_background_children() {
    let mut process = ActionProcess::spawn("bg", captured(vec![shell_cmd("sleep 30 & echo hi")]));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(process.poll(), None);

    let started = std::time::Instant::now();
    process.terminate();
    let code = wait_done(&mut process).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(code, Some(EXIT_INTERRUPTED));
    assert_eq!(process.status(), ProcessStatus::Terminated);
    assert!(String::from_utf8(process.output()).unwrap().contains("hi"));
  }

  #[tokio::test]
  async fn unspawnable_command_exits_127() {
    let mut process = ActionProcess::spawn(
      "missing",
      captured(vec![vec!["/definitely/not/a/real/program".to_string()]]),
    );

    assert_eq!(wait_done(&mut process).await, Some(EXIT_SPAWN_FAILED));
    let output = String::from_utf8(process.output()).unwrap();
    assert!(output.contains("failed to run /definitely/not/a/real/program"));
  }

  #[tokio::test]
  async fn empty_queue_completes_with_zero() {
    let mut process = ActionProcess::spawn("empty", captured(vec![]));
    assert_eq!(wait_done(&mut process).await, Some(0));
    assert_eq!(process.progress(), None);
  }
}

//! Action graph execution.
//!
//! The engine walks the action graph in topological order. Before launching an
//! action it waits for every dependency to complete, polling the in-flight
//! processes at a fixed interval. Up-to-date actions are skipped, pure actions
//! may be restored from a stash, and the first failure (or a user interrupt)
//! terminates everything still running. [`clean`] undoes a build by removing
//! the outputs and recorded keys of a graph.

pub mod clean;
pub mod report;
pub mod types;

use std::fs;
use std::time::Instant;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::action::{Action, ActionProcess};
use crate::cache::{self, CacheStore};
use crate::hash::compute_key;
use crate::session::{ActionGraph, ActionId, Session};
use crate::stash::StashError;
use crate::util::hash::HashKey;

pub use clean::{CleanSummary, clean};
pub use report::{BuildEvent, BuildReporter, CollectingReporter, TracingReporter};
pub use types::{BuildSummary, ExecuteConfig, ExecuteError, Interrupt, merge_options};

struct Running {
  id: ActionId,
  process: ActionProcess,
}

/// Runs an action graph against a build state.
pub struct Executor<'a> {
  config: &'a ExecuteConfig,
  reporter: &'a dyn BuildReporter,
}

impl<'a> Executor<'a> {
  pub fn new(config: &'a ExecuteConfig, reporter: &'a dyn BuildReporter) -> Self {
    Self { config, reporter }
  }

  /// Execute every action of `graph`.
  ///
  /// Keys of pure actions that finish successfully are recorded in `cache`;
  /// the caller decides when to persist it.
  pub async fn run(
    &self,
    session: &Session,
    graph: &ActionGraph,
    cache: &mut CacheStore,
    interrupt: &Interrupt,
  ) -> Result<BuildSummary, ExecuteError> {
    let started = Instant::now();
    let order = graph.topo_sort()?;

    for &id in &order {
      let action = session.action(id);
      if let Some(&missing) = action.deps().iter().find(|&&dep| !graph.contains(session.action(dep).identifier())) {
        return Err(ExecuteError::MissingDependency {
          action: action.identifier().to_string(),
          dependency: session.action(missing).identifier().to_string(),
        });
      }
      action.set_completed(false);
    }

    fs::create_dir_all(session.build_dir()).map_err(|source| ExecuteError::BuildDir {
      path: session.build_dir().to_path_buf(),
      source,
    })?;

    info!(actions = order.len(), "starting build");

    let mut summary = BuildSummary::default();
    let mut in_flight = Vec::new();
    let result = self
      .schedule(session, &order, cache, interrupt, &mut in_flight, &mut summary)
      .await;

    if result.is_err() {
      self.terminate_all(session, &mut in_flight).await;
    }
    result?;

    summary.elapsed = started.elapsed();
    info!(
      executed = summary.executed.len(),
      skipped = summary.skipped.len(),
      restored = summary.restored.len(),
      elapsed_ms = summary.elapsed.as_millis() as u64,
      "build finished"
    );
    Ok(summary)
  }

  async fn schedule(
    &self,
    session: &Session,
    order: &[ActionId],
    cache: &mut CacheStore,
    interrupt: &Interrupt,
    in_flight: &mut Vec<Running>,
    summary: &mut BuildSummary,
  ) -> Result<(), ExecuteError> {
    for &id in order {
      loop {
        self.check_interrupt(interrupt, in_flight)?;
        self.poll_in_flight(session, cache, in_flight, summary).await?;
        if is_ready(session, session.action(id)) {
          break;
        }
        sleep(self.config.poll_interval).await;
      }
      self.start(session, id, cache, in_flight, summary)?;
    }

    while !in_flight.is_empty() {
      self.check_interrupt(interrupt, in_flight)?;
      self.poll_in_flight(session, cache, in_flight, summary).await?;
      if !in_flight.is_empty() {
        sleep(self.config.poll_interval).await;
      }
    }
    Ok(())
  }

  fn check_interrupt(&self, interrupt: &Interrupt, in_flight: &[Running]) -> Result<(), ExecuteError> {
    if interrupt.is_triggered() {
      warn!(in_flight = in_flight.len(), "build interrupted");
      self.reporter.report(&BuildEvent::Interrupted {
        in_flight: in_flight.len(),
      });
      return Err(ExecuteError::Interrupted);
    }
    Ok(())
  }

  fn start(
    &self,
    session: &Session,
    id: ActionId,
    cache: &mut CacheStore,
    in_flight: &mut Vec<Running>,
    summary: &mut BuildSummary,
  ) -> Result<(), ExecuteError> {
    let action = session.action(id);
    let identifier = action.identifier().to_string();

    if cache::skippable(session, id, cache)? {
      debug!(action = %identifier, "up to date");
      action.set_completed(true);
      self.reporter.report(&BuildEvent::Skipped {
        action: identifier.clone(),
      });
      summary.skipped.push(identifier);
      return Ok(());
    }

    if action.is_pure() {
      let key = compute_key(session, id)?;
      if self.restore(action, &key) {
        cache.record(&identifier, key.clone());
        action.set_completed(true);
        self.reporter.report(&BuildEvent::Restored {
          action: identifier.clone(),
          key,
        });
        summary.restored.push(identifier);
        return Ok(());
      }
    }

    let process = action.execute();
    debug!(action = %identifier, "launched");
    self.reporter.report(&BuildEvent::Started {
      action: identifier,
      display: process.display_text(),
    });
    in_flight.push(Running { id, process });
    Ok(())
  }

  /// Collect every finished process. Successes are recorded before the first
  /// failure, if any, is returned.
  async fn poll_in_flight(
    &self,
    session: &Session,
    cache: &mut CacheStore,
    in_flight: &mut Vec<Running>,
    summary: &mut BuildSummary,
  ) -> Result<(), ExecuteError> {
    let mut failure = None;
    let mut index = 0;
    while index < in_flight.len() {
      let Some(code) = in_flight[index].process.poll() else {
        index += 1;
        continue;
      };

      let mut running = in_flight.remove(index);
      running.process.wait().await;
      let action = session.action(running.id);
      let display = running.process.display_text();
      let output = running.process.output();

      self.reporter.report(&BuildEvent::Finished {
        action: action.identifier().to_string(),
        display: display.clone(),
        code,
        output: output.clone(),
      });

      if code != 0 {
        error!(action = %action.identifier(), code, "action failed");
        failure.get_or_insert(ExecuteError::ActionFailed {
          action: action.identifier().to_string(),
          command: running.process.current_command().unwrap_or(display),
          code,
          output: String::from_utf8_lossy(&output).into_owned(),
        });
        continue;
      }

      action.set_completed(true);
      summary.executed.push(action.identifier().to_string());

      if action.is_pure() {
        let key = compute_key(session, running.id)?;
        cache.record(action.identifier(), key.clone());
        self.upload(action, &key);
      }
    }

    match failure {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }

  async fn terminate_all(&self, session: &Session, in_flight: &mut Vec<Running>) {
    for running in in_flight.iter() {
      running.process.terminate();
    }
    for mut running in in_flight.drain(..) {
      running.process.wait().await;
      let identifier = session.action(running.id).identifier().to_string();
      debug!(action = %identifier, "terminated");
      self.reporter.report(&BuildEvent::Terminated { action: identifier });
    }
  }

  /// Restore every output of `action` from the stash. Returns false when any
  /// of them is unavailable.
  fn restore(&self, action: &Action, key: &HashKey) -> bool {
    let Some(stash) = &self.config.stash else {
      return false;
    };
    let Some(names) = output_names(action) else {
      return false;
    };

    let artifacts = match stash.find_by_key(key) {
      Ok(Some(artifacts)) => artifacts,
      Ok(None) => return false,
      Err(err) => {
        warn!(action = %action.identifier(), error = %err, "stash lookup failed");
        return false;
      }
    };

    let files = artifacts.files();
    if !names.iter().all(|name| files.contains(name)) {
      debug!(action = %action.identifier(), key = %key, "stash entry is incomplete");
      return false;
    }

    for (name, dest) in names.iter().zip(action.outputs()) {
      if let Err(err) = artifacts.restore(name, dest) {
        warn!(action = %action.identifier(), file = %name, error = %err, "stash restore failed");
        return false;
      }
    }
    true
  }

  fn upload(&self, action: &Action, key: &HashKey) {
    let Some(stash) = &self.config.stash else {
      return;
    };
    if !stash.can_create() {
      return;
    }
    let Some(names) = output_names(action) else {
      debug!(action = %action.identifier(), "outputs cannot be stashed");
      return;
    };

    let result = stash.begin_upload(key).and_then(|mut builder| {
      builder.set_description(action.identifier());
      for (name, source) in names.iter().zip(action.outputs()) {
        builder.add_file(name, source)?;
      }
      builder.commit()
    });

    match result {
      Ok(()) => debug!(action = %action.identifier(), key = %key, "stashed outputs"),
      Err(StashError::DuplicateKey(_)) => {
        debug!(action = %action.identifier(), key = %key, "already stashed");
      }
      Err(err) => warn!(action = %action.identifier(), error = %err, "stash upload failed"),
    }
  }
}

fn is_ready(session: &Session, action: &Action) -> bool {
  action.deps().iter().all(|&dep| session.action(dep).is_completed())
}

/// Stash file names for the outputs of `action`: their base names, or `None`
/// when there are no outputs or two outputs share a base name.
fn output_names(action: &Action) -> Option<Vec<String>> {
  if action.outputs().is_empty() {
    return None;
  }
  let mut names: Vec<String> = Vec::with_capacity(action.outputs().len());
  for output in action.outputs() {
    let name = output.file_name()?.to_string_lossy().into_owned();
    if names.contains(&name) {
      return None;
    }
    names.push(name);
  }
  Some(names)
}

/// Load the build state, run `graph`, then persist the state again.
///
/// The state is saved even when the build fails, so keys recorded for the
/// actions that did succeed survive. Keys of actions no longer present in the
/// session are dropped.
pub async fn build(
  session: &Session,
  graph: &ActionGraph,
  config: &ExecuteConfig,
  reporter: &dyn BuildReporter,
  interrupt: &Interrupt,
) -> Result<BuildSummary, ExecuteError> {
  let mut cache = CacheStore::load(session.build_dir())?;
  cache.reconcile(&config.backend, session.options());

  let result = Executor::new(config, reporter)
    .run(session, graph, &mut cache, interrupt)
    .await;

  let pruned = cache.prune(session.actions().map(Action::identifier));
  if pruned > 0 {
    debug!(pruned, "dropped keys of removed actions");
  }

  if let Err(err) = cache.save() {
    if result.is_ok() {
      return Err(err.into());
    }
    warn!(error = %err, "failed to save build state");
  }
  result
}

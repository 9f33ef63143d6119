//! Periodic reads for characteristics that cannot notify.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::connection::PeripheralSession;
use crate::core::bluetooth::directory::DIRECTORY;
use crate::error::PeripheralError;

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns one timer per scheduled characteristic of a session.
pub struct Poller {
    session: PeripheralSession,
    tasks: Mutex<HashMap<&'static str, PollTask>>,
}

impl Poller {
    pub fn new(session: PeripheralSession) -> Self {
        Self { session, tasks: Mutex::new(HashMap::new()) }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<&'static str, PollTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts reading `name` every `interval`, replacing any earlier schedule.
    ///
    /// The timer stops on its own once the session leaves `Connected`, or
    /// after more than `max_retries` consecutive failed reads.
    pub fn schedule(
        &self,
        name: &'static str,
        interval: Duration,
        max_retries: u32,
    ) -> Result<(), PeripheralError> {
        let (_, source) = DIRECTORY.resolve(name)?;
        let cancel = self.session.connection_token()?;
        let handle = tokio::spawn(poll_loop(
            self.session.clone(),
            name,
            source,
            interval,
            max_retries,
            cancel.clone(),
        ));

        if let Some(previous) = self.tasks().insert(name, PollTask { cancel, handle }) {
            previous.cancel.cancel();
        }
        info!("Polling {} every {:?} (max {} retries)", name, interval, max_retries);
        Ok(())
    }

    pub fn cancel(&self, name: &str) {
        if let Some(task) = self.tasks().remove(name) {
            task.cancel.cancel();
            debug!("Polling of {} cancelled", name);
        }
    }

    pub fn cancel_all(&self) {
        for (_, task) in self.tasks().drain() {
            task.cancel.cancel();
        }
    }

    /// True while a timer for `name` is still alive.
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks()
            .get(name)
            .is_some_and(|task| !task.cancel.is_cancelled() && !task.handle.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn poll_loop(
    session: PeripheralSession,
    name: &'static str,
    source: Uuid,
    interval: Duration,
    max_retries: u32,
    cancel: CancellationToken,
) {
    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Poll timer for {} stopped", name);
                return;
            }
            _ = sleep(interval) => {}
        }
        if !session.is_connected() {
            debug!("Session left Connected, no longer polling {}", name);
            return;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = session.read(name) => result,
        };
        match result {
            Ok(payload) => {
                failures = 0;
                session.ingest(source, payload);
            }
            Err(PeripheralError::NotConnected) => return,
            Err(e) => {
                failures += 1;
                warn!("Read of {} failed ({}/{}): {}", name, failures, max_retries, e);
                if failures > max_retries {
                    error!("Giving up polling {} after {} failed reads", name, failures);
                    return;
                }
            }
        }
    }
}

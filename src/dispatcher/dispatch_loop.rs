// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, trace};

use super::{Dispatcher, DispatcherState, Inner, WriteFault};
use crate::backend::{PartitionWriter, StorageBackend};
use crate::signal::{Signal, SignalEnvelope};
use crate::utils::{InFlightGuard, InFlightTracker};
use crate::{AppError, AppResult, Shutdown};

impl<B: StorageBackend> Dispatcher<B> {
    /// Opens the backend and spawns the dispatch loop.
    ///
    /// Must be called from within a tokio runtime. If the backend fails to open the
    /// error is returned and the dispatcher stays in `Created`, holding nothing.
    pub async fn start(&self) -> AppResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let state = self.state();
        if state != DispatcherState::Created {
            return Err(AppError::IllegalStateError(format!(
                "dispatcher cannot start from state {:?}",
                state
            )));
        }

        let inner = self.inner.clone();
        let opened = tokio::task::spawn_blocking(move || inner.backend.open(&inner.location))
            .await
            .map_err(AppError::from)
            .and_then(|result| result);
        let handle = match opened {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                error!(location = %self.inner.location.display(), "failed to open backend: {}", e);
                return Err(e);
            }
        };

        let shutdown = self.inner.stop.subscribe();
        *self.inner.state.lock() = DispatcherState::Running;
        tokio::spawn(run(self.inner.clone(), handle, shutdown));

        info!(
            location = %self.inner.location.display(),
            partition = %self.inner.partition,
            "dispatcher started"
        );
        Ok(())
    }
}

async fn run<B: StorageBackend>(
    inner: Arc<Inner<B>>,
    handle: Arc<B::Handle>,
    mut shutdown: Shutdown,
) {
    let tracker = InFlightTracker::new(inner.in_flight.clone());

    loop {
        tokio::select! {
            received = inner.channel.recv() => {
                match received {
                    Ok(envelope) => inner.dispatch(envelope, &tracker, &handle),
                    Err(_) => {
                        debug!("signal channel closed under the dispatch loop");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => {
                debug!("dispatch loop received stop signal");
                break;
            }
        }
    }

    {
        let mut state = inner.state.lock();
        if *state == DispatcherState::Running {
            *state = DispatcherState::Draining;
        }
    }

    debug!(in_flight = tracker.in_flight(), "waiting for write tasks");
    tracker.drain().await;

    // rejects anything still in transit
    inner.channel.close();

    let closing = handle.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || closing.close()).await {
        error!("backend close did not finish cleanly: {}", e);
    }

    *inner.state.lock() = DispatcherState::Closed;
    inner.shutdown_complete.send_replace(true);
    info!(
        accepted = inner.accepted.load(Ordering::Acquire),
        faults = inner.faults.load(Ordering::Acquire),
        "dispatcher closed"
    );
}

impl<B: StorageBackend> Inner<B> {
    fn dispatch(
        self: &Arc<Self>,
        envelope: SignalEnvelope,
        tracker: &InFlightTracker,
        handle: &Arc<B::Handle>,
    ) {
        // counted before the producer is released, close can never miss it
        let guard = tracker.enter();
        let (signal, ack) = envelope.into_parts();
        self.accepted.fetch_add(1, Ordering::AcqRel);

        let inner = self.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            inner.apply(handle, signal, guard).await;
        });
        ack.send();
    }

    async fn apply(
        self: Arc<Self>,
        handle: Arc<B::Handle>,
        signal: Signal,
        _guard: InFlightGuard,
    ) {
        let Signal {
            key,
            value,
            terminal,
        } = signal;

        let partition = self.partition.clone();
        let write_key = key.clone();
        let result = tokio::task::spawn_blocking(move || {
            handle.write(&partition, write_key.as_bytes(), value.as_bytes())
        })
        .await
        .map_err(AppError::from)
        .and_then(|result| result);

        // the guard drops after this, a fault is always reported before close returns
        match result {
            Ok(()) => {
                trace!(key = %key, terminal, "signal applied");
                if terminal {
                    self.trigger_stop("terminal signal applied");
                }
            }
            Err(e) => self.report_fault(key, e),
        }
    }

    fn report_fault(&self, key: String, e: AppError) {
        let fault = WriteFault {
            partition: self.partition.clone(),
            key,
            reason: e.to_string(),
        };
        self.faults.fetch_add(1, Ordering::AcqRel);
        error!(
            partition = %fault.partition,
            key = %fault.key,
            "write fault, stopping the pipeline: {}",
            fault.reason
        );
        if self.fault_tx.send(fault).is_err() {
            debug!("fault receiver dropped, fault only logged");
        }
        self.trigger_stop("write fault");
    }
}

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

mod dispatch_loop;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::signal::{Signal, SignalChannel, SignalError};
use crate::{StopTrigger, StoreConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Created,
    Running,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// A terminal signal was already accepted, the pipeline is shutting down.
    #[error("dispatcher is already closing")]
    AlreadyClosing,
    #[error("signal channel is closed")]
    ChannelClosed,
    #[error("dispatcher has not been started")]
    NotStarted,
    #[error("signal key must not be empty")]
    EmptyKey,
}

/// A write the backend refused. The pipeline stops after the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("write of key {key} into partition {partition} failed: {reason}")]
pub struct WriteFault {
    pub partition: String,
    pub key: String,
    pub reason: String,
}

/// Write-behind front of a single store.
///
/// Producers hand signals over with [`Dispatcher::submit`]. The dispatch loop takes
/// them one at a time and spawns one write task per signal, so a slow write never
/// holds up the next producer. Writes can complete in any order.
///
/// Shutdown starts when a terminal signal has been applied, when a write fails or
/// when [`Dispatcher::close`] is called. Whatever triggered it, the loop stops
/// receiving, waits for every write task, closes the signal channel and then the
/// backend, in that order. `close` has no timeout: a write that never returns
/// keeps it waiting.
///
/// Clones share the same pipeline.
pub struct Dispatcher<B: StorageBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: StorageBackend> Clone for Dispatcher<B> {
    fn clone(&self) -> Self {
        Dispatcher {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<B: StorageBackend> {
    backend: B,
    location: PathBuf,
    partition: String,
    channel: SignalChannel,
    state: Mutex<DispatcherState>,
    // serializes start against close
    lifecycle: tokio::sync::Mutex<()>,
    stop: StopTrigger,
    shutdown_complete: watch::Sender<bool>,
    in_flight: Arc<AtomicUsize>,
    accepted: AtomicU64,
    faults: AtomicU64,
    fault_tx: mpsc::UnboundedSender<WriteFault>,
    fault_rx: Mutex<Option<mpsc::UnboundedReceiver<WriteFault>>>,
}

impl<B: StorageBackend> Dispatcher<B> {
    /// Nothing is opened until [`Dispatcher::start`].
    pub fn new(backend: B, location: impl Into<PathBuf>, partition: impl Into<String>) -> Self {
        let (shutdown_complete, _) = watch::channel(false);
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();
        Dispatcher {
            inner: Arc::new(Inner {
                backend,
                location: location.into(),
                partition: partition.into(),
                channel: SignalChannel::new(),
                state: Mutex::new(DispatcherState::Created),
                lifecycle: tokio::sync::Mutex::new(()),
                stop: StopTrigger::new(),
                shutdown_complete,
                in_flight: Arc::new(AtomicUsize::new(0)),
                accepted: AtomicU64::new(0),
                faults: AtomicU64::new(0),
                fault_tx,
                fault_rx: Mutex::new(Some(fault_rx)),
            }),
        }
    }

    pub fn from_config(backend: B, config: &StoreConfig) -> Self {
        Self::new(
            backend,
            config.store.location.clone(),
            config.store.partition.clone(),
        )
    }

    pub async fn submit(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        terminal: bool,
    ) -> Result<(), SubmitError> {
        self.submit_signal(Signal {
            key: key.into(),
            value: value.into(),
            terminal,
        })
        .await
    }

    /// Returns once the dispatch loop has taken the signal. From then on the write
    /// is attempted no matter what, and `close` waits for it.
    pub async fn submit_signal(&self, signal: Signal) -> Result<(), SubmitError> {
        let channel = &self.inner.channel;
        if channel.is_terminal_accepted() {
            return Err(SubmitError::AlreadyClosing);
        }
        if self.state() == DispatcherState::Created {
            return Err(SubmitError::NotStarted);
        }
        if signal.key.is_empty() {
            return Err(SubmitError::EmptyKey);
        }

        channel.send(signal).await.map_err(|e| match e {
            SignalError::ChannelClosed if channel.is_terminal_accepted() => {
                SubmitError::AlreadyClosing
            }
            SignalError::ChannelClosed => SubmitError::ChannelClosed,
        })
    }

    /// Stops the pipeline and waits until it is fully drained and closed.
    ///
    /// Any number of callers may close concurrently, only the first one triggers the
    /// stop. Closing a dispatcher that never started successfully returns at once.
    pub async fn close(&self) {
        {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let state = self.state();
            if state == DispatcherState::Created {
                debug!("close on a dispatcher that never started");
                return;
            }
        }
        self.inner.trigger_stop("close requested");

        let mut complete = self.inner.shutdown_complete.subscribe();
        // the sender lives in `inner`, which we hold
        let _ = complete.wait_for(|done| *done).await;
    }

    pub fn state(&self) -> DispatcherState {
        *self.inner.state.lock()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Signals taken by the dispatch loop so far.
    pub fn accepted(&self) -> u64 {
        self.inner.accepted.load(Ordering::Acquire)
    }

    pub fn fault_count(&self) -> u64 {
        self.inner.faults.load(Ordering::Acquire)
    }

    /// Hands out the write fault sink. Only the first call gets it.
    pub fn take_fault_receiver(&self) -> Option<mpsc::UnboundedReceiver<WriteFault>> {
        self.inner.fault_rx.lock().take()
    }

    pub fn partition(&self) -> &str {
        &self.inner.partition
    }

    pub fn location(&self) -> &Path {
        &self.inner.location
    }
}

impl<B: StorageBackend> Inner<B> {
    /// Moves a running dispatcher to draining. Only the first caller sends the stop.
    fn trigger_stop(&self, reason: &str) -> bool {
        {
            let mut state = self.state.lock();
            if *state != DispatcherState::Running {
                return false;
            }
            *state = DispatcherState::Draining;
        }
        // the loop subscribed before the state became running
        let fired = self.stop.fire();
        info!(reason, "dispatcher stopping");
        fired
    }
}

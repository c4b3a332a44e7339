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

use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::{Receiver, Sender};
use tokio::sync::oneshot;
use tracing::debug;

use super::{Signal, SignalError};

/// A signal in transit, together with the acknowledgement its producer waits on.
#[derive(Debug)]
pub struct SignalEnvelope {
    signal: Signal,
    ack: oneshot::Sender<()>,
}

/// Releases the producer that sent the signal.
#[derive(Debug)]
pub struct Ack(oneshot::Sender<()>);

impl Ack {
    pub fn send(self) {
        // the producer may have given up waiting, the signal is still ours
        let _ = self.0.send(());
    }
}

impl SignalEnvelope {
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn into_parts(self) -> (Signal, Ack) {
        (self.signal, Ack(self.ack))
    }
}

/// Rendezvous between many producers and the single dispatch loop.
///
/// The underlying channel holds at most one envelope, and `send` only returns once
/// the consumer has acknowledged it, so a producer is never released before its
/// signal has been taken. An envelope still in transit when the channel closes is
/// dropped, and its producer gets [`SignalError::ChannelClosed`].
///
/// A terminal signal flips the terminal latch before it is sent. Every later send
/// fails fast instead of racing the close. Sends that were already past the latch
/// check when the terminal signal went through may still be delivered: the terminal
/// flag is advisory, not a barrier.
#[derive(Debug)]
pub struct SignalChannel {
    tx: Sender<SignalEnvelope>,
    rx: Receiver<SignalEnvelope>,
    terminal_accepted: AtomicBool,
}

impl Default for SignalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalChannel {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::bounded(1);
        SignalChannel {
            tx,
            rx,
            terminal_accepted: AtomicBool::new(false),
        }
    }

    pub async fn send(&self, signal: Signal) -> Result<(), SignalError> {
        if self.tx.is_closed() || self.terminal_accepted.load(Ordering::Acquire) {
            return Err(SignalError::ChannelClosed);
        }
        // only the first terminal signal gets through
        if signal.terminal && self.terminal_accepted.swap(true, Ordering::AcqRel) {
            return Err(SignalError::ChannelClosed);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SignalEnvelope {
                signal,
                ack: ack_tx,
            })
            .await
            .map_err(|_| SignalError::ChannelClosed)?;
        ack_rx.await.map_err(|_| SignalError::ChannelClosed)
    }

    pub async fn recv(&self) -> Result<SignalEnvelope, SignalError> {
        self.rx.recv().await.map_err(|_| SignalError::ChannelClosed)
    }

    /// Closes the channel for good. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        if !self.tx.close() {
            return false;
        }
        let mut rejected = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            drop(envelope);
            rejected += 1;
        }
        debug!(rejected, "signal channel closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn is_terminal_accepted(&self) -> bool {
        self.terminal_accepted.load(Ordering::Acquire)
    }
}

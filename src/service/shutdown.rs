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

use tokio::sync::broadcast;

/// Sending side of the stop signal. Fires at most once.
#[derive(Debug)]
pub struct StopTrigger {
    notify: broadcast::Sender<()>,
    fired: AtomicBool,
}

impl Default for StopTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl StopTrigger {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        StopTrigger {
            notify,
            fired: AtomicBool::new(false),
        }
    }

    /// Listeners only see a stop fired after they subscribed.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown::new(self.notify.subscribe())
    }

    /// Returns `true` for the one call that actually sent the stop.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        // no listener yet is fine, `is_fired` still reports it
        let _ = self.notify.send(());
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Listens for a [`StopTrigger`].
///
/// Once the stop was received, `recv` returns immediately on every later call.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        // a dropped trigger counts as a stop as well
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_fires_once() {
        let trigger = StopTrigger::new();
        let mut shutdown = trigger.subscribe();
        assert!(!trigger.is_fired());
        assert!(!shutdown.is_shutdown());

        assert!(trigger.fire());
        assert!(!trigger.fire());
        assert!(trigger.is_fired());

        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
        // no second message is ever sent, this must not block
        shutdown.recv().await;
    }

    #[tokio::test]
    async fn every_listener_sees_the_stop() {
        let trigger = StopTrigger::new();
        let mut first = trigger.subscribe();
        let mut second = trigger.subscribe();
        trigger.fire();
        first.recv().await;
        second.recv().await;
        assert!(first.is_shutdown() && second.is_shutdown());
    }

    #[tokio::test]
    async fn dropped_trigger_counts_as_shutdown() {
        let trigger = StopTrigger::new();
        let mut shutdown = trigger.subscribe();
        drop(trigger);
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }
}

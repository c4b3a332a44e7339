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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Counts write tasks that have been spawned but not finished.
///
/// Every task holds an [`InFlightGuard`]. The guard carries a clone of the
/// completion sender, so once the tracker drops its own sender, `drain` wakes up
/// exactly when the last guard is gone.
#[derive(Debug)]
pub struct InFlightTracker {
    count: Arc<AtomicUsize>,
    complete_tx: mpsc::Sender<()>,
    complete_rx: mpsc::Receiver<()>,
}

/// Decrements the in-flight gauge on drop, whether the task finished or panicked.
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<AtomicUsize>,
    _complete_tx: mpsc::Sender<()>,
}

impl InFlightTracker {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        let (complete_tx, complete_rx) = mpsc::channel(1);
        Self {
            count,
            complete_tx,
            complete_rx,
        }
    }

    pub fn enter(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            count: self.count.clone(),
            _complete_tx: self.complete_tx.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Waits until every guard handed out by `enter` has been dropped.
    pub async fn drain(self) {
        let InFlightTracker {
            complete_tx,
            mut complete_rx,
            ..
        } = self;
        drop(complete_tx);
        // nobody ever sends, recv returns None once all senders are gone
        let _ = complete_rx.recv().await;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn drain_returns_immediately_when_idle() {
        let tracker = InFlightTracker::new(Arc::new(AtomicUsize::new(0)));
        assert_eq!(tracker.in_flight(), 0);
        tracker.drain().await;
    }

    #[tokio::test]
    async fn drain_waits_for_every_guard() {
        let count = Arc::new(AtomicUsize::new(0));
        let tracker = InFlightTracker::new(count.clone());

        let mut handles = Vec::new();
        for i in 0..8u64 {
            let guard = tracker.enter();
            handles.push(tokio::spawn(async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_millis(10 * i)).await;
            }));
        }
        assert_eq!(tracker.in_flight(), 8);

        tracker.drain().await;
        assert_eq!(count.load(Ordering::Acquire), 0);
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn panicking_task_still_releases_its_guard() {
        let count = Arc::new(AtomicUsize::new(0));
        let tracker = InFlightTracker::new(count.clone());

        let guard = tracker.enter();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("write blew up");
        });
        assert!(handle.await.unwrap_err().is_panic());

        tracker.drain().await;
        assert_eq!(count.load(Ordering::Acquire), 0);
    }
}

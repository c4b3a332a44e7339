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

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::{PartitionWriter, StorageBackend};
use crate::{AppError, AppResult};

type Partitions = DashMap<String, DashMap<Vec<u8>, Vec<u8>>>;

/// In-memory store for tests and dry runs.
///
/// Every handle opened from the same backend shares its data, so the content
/// can still be inspected after the dispatcher closed the handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    partitions: Arc<Partitions>,
    close_count: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, partition: &str, key: &str) -> Option<String> {
        let partition = self.partitions.get(partition)?;
        let value = partition.get(key.as_bytes())?;
        Some(String::from_utf8_lossy(value.value()).into_owned())
    }

    pub fn partition_len(&self, partition: &str) -> usize {
        self.partitions.get(partition).map_or(0, |p| p.len())
    }

    pub fn partition_is_empty(&self, partition: &str) -> bool {
        self.partition_len(partition) == 0
    }

    /// How many times a handle was actually closed.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::Acquire)
    }
}

impl StorageBackend for MemoryBackend {
    type Handle = MemoryHandle;

    fn open(&self, _location: &Path) -> AppResult<MemoryHandle> {
        Ok(MemoryHandle {
            partitions: self.partitions.clone(),
            close_count: self.close_count.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub struct MemoryHandle {
    partitions: Arc<Partitions>,
    close_count: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl PartitionWriter for MemoryHandle {
    fn write(&self, partition: &str, key: &[u8], value: &[u8]) -> AppResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::BackendWrite {
                partition: partition.to_string(),
                key: String::from_utf8_lossy(key).into_owned(),
                reason: "store already closed".to_string(),
            });
        }
        if let Some(existing) = self.partitions.get(partition) {
            existing.insert(key.to_vec(), value.to_vec());
            return Ok(());
        }
        self.partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_count.fetch_add(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_the_backend_data() {
        let backend = MemoryBackend::new();
        let handle = backend.open(Path::new("unused")).unwrap();
        handle.write("p", b"k", b"v").unwrap();
        handle.write("p", b"k", b"v2").unwrap();
        handle.write("q", b"k", b"other").unwrap();

        assert_eq!(backend.get("p", "k").as_deref(), Some("v2"));
        assert_eq!(backend.get("q", "k").as_deref(), Some("other"));
        assert_eq!(backend.partition_len("p"), 1);
        assert!(backend.partition_is_empty("missing"));
    }

    #[test]
    fn close_counts_once_per_handle() {
        let backend = MemoryBackend::new();
        let handle = backend.open(Path::new("unused")).unwrap();
        handle.close();
        handle.close();
        assert_eq!(backend.close_count(), 1);
        assert!(handle.write("p", b"k", b"v").is_err());
    }
}

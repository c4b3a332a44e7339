#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use signalstore::backend::MemoryHandle;
use signalstore::{
    setup_local_tracing, AppError, AppResult, MemoryBackend, PartitionWriter, StorageBackend,
};

pub fn init_tracing() {
    // several test binaries share the global subscriber slot, the first wins
    let _ = setup_local_tracing();
}

/// Blocks writers until released.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    pub fn release(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }
}

/// Memory backend with injected open failures, write failures and slow keys.
#[derive(Debug, Clone, Default)]
pub struct TestBackend {
    pub memory: MemoryBackend,
    pub fail_open: bool,
    pub fail_key: Option<String>,
    pub slow_key: Option<(String, Arc<Gate>)>,
    close_calls: Arc<AtomicUsize>,
}

impl TestBackend {
    /// Every `close` call on any handle, whether or not it closed anything.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    pub fn failing_open() -> Self {
        TestBackend {
            fail_open: true,
            ..Default::default()
        }
    }

    pub fn failing_on(key: &str) -> Self {
        TestBackend {
            fail_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    pub fn slow_on(key: &str, gate: Arc<Gate>) -> Self {
        TestBackend {
            slow_key: Some((key.to_string(), gate)),
            ..Default::default()
        }
    }
}

pub struct TestHandle {
    inner: MemoryHandle,
    fail_key: Option<String>,
    slow_key: Option<(String, Arc<Gate>)>,
    close_calls: Arc<AtomicUsize>,
}

impl StorageBackend for TestBackend {
    type Handle = TestHandle;

    fn open(&self, location: &Path) -> AppResult<TestHandle> {
        if self.fail_open {
            return Err(AppError::BackendOpen {
                location: location.display().to_string(),
                reason: "injected open failure".to_string(),
            });
        }
        Ok(TestHandle {
            inner: self.memory.open(location)?,
            fail_key: self.fail_key.clone(),
            slow_key: self.slow_key.clone(),
            close_calls: self.close_calls.clone(),
        })
    }
}

impl PartitionWriter for TestHandle {
    fn write(&self, partition: &str, key: &[u8], value: &[u8]) -> AppResult<()> {
        let key_str = String::from_utf8_lossy(key);
        if let Some((slow, gate)) = &self.slow_key {
            if key_str == slow.as_str() {
                gate.wait();
            }
        }
        if self.fail_key.as_deref() == Some(&*key_str) {
            return Err(AppError::BackendWrite {
                partition: partition.to_string(),
                key: key_str.into_owned(),
                reason: "injected write failure".to_string(),
            });
        }
        self.inner.write(partition, key, value)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.inner.close();
    }
}

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

use parking_lot::{Mutex, RwLock};
use rocksdb::{DBWithThreadMode, MultiThreaded, Options, DB};
use tracing::{debug, info, warn};

use super::{PartitionWriter, StorageBackend};
use crate::{AppError, AppResult};

type RocksDb = DBWithThreadMode<MultiThreaded>;

/// RocksDB store, one column family per partition.
#[derive(Debug, Clone, Default)]
pub struct RocksBackend {
    /// fsync every write through the WAL
    sync_writes: bool,
}

impl RocksBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }
}

impl StorageBackend for RocksBackend {
    type Handle = RocksHandle;

    fn open(&self, location: &Path) -> AppResult<RocksHandle> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        // reopen every partition an earlier run created
        let column_families = match DB::list_cf(&opts, location) {
            Ok(names) => names,
            Err(_) => vec![rocksdb::DEFAULT_COLUMN_FAMILY_NAME.to_string()],
        };

        let db = RocksDb::open_cf(&opts, location, &column_families).map_err(|e| {
            AppError::BackendOpen {
                location: location.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        info!(location = %location.display(), partitions = ?column_families, "rocksdb opened");

        Ok(RocksHandle {
            db: RwLock::new(Some(db)),
            create_cf_lock: Mutex::new(()),
            sync_writes: self.sync_writes,
        })
    }
}

#[derive(Debug)]
pub struct RocksHandle {
    db: RwLock<Option<RocksDb>>,
    create_cf_lock: Mutex<()>,
    sync_writes: bool,
}

impl RocksHandle {
    fn ensure_partition(&self, db: &RocksDb, partition: &str) -> AppResult<()> {
        if db.cf_handle(partition).is_some() {
            return Ok(());
        }
        let _guard = self.create_cf_lock.lock();
        // another writer may have created it while we waited
        if db.cf_handle(partition).is_none() {
            db.create_cf(partition, &Options::default())?;
            debug!(partition, "partition created");
        }
        Ok(())
    }
}

impl PartitionWriter for RocksHandle {
    fn write(&self, partition: &str, key: &[u8], value: &[u8]) -> AppResult<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or_else(|| AppError::BackendWrite {
            partition: partition.to_string(),
            key: String::from_utf8_lossy(key).into_owned(),
            reason: "store already closed".to_string(),
        })?;

        self.ensure_partition(db, partition)?;
        let cf = db.cf_handle(partition).ok_or_else(|| AppError::BackendWrite {
            partition: partition.to_string(),
            key: String::from_utf8_lossy(key).into_owned(),
            reason: "partition disappeared".to_string(),
        })?;

        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        db.put_cf_opt(&cf, key, value, &write_opts)?;
        Ok(())
    }

    fn close(&self) {
        let Some(db) = self.db.write().take() else {
            return;
        };
        if let Err(e) = db.flush_wal(true) {
            warn!("flush on close failed: {}", e);
        }
        drop(db);
        info!("rocksdb closed");
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn read(location: &Path, partition: &str, key: &str) -> Option<Vec<u8>> {
        let opts = Options::default();
        let names = DB::list_cf(&opts, location).unwrap();
        let db = DB::open_cf_for_read_only(&opts, location, &names, false).unwrap();
        let cf = db.cf_handle(partition)?;
        db.get_cf(cf, key).unwrap()
    }

    #[test]
    fn writes_land_in_their_partition() {
        let dir = TempDir::new().unwrap();
        let handle = RocksBackend::new().open(dir.path()).unwrap();
        handle.write("a", b"k1", b"v1").unwrap();
        handle.write("b", b"k1", b"other").unwrap();
        handle.close();

        assert_eq!(read(dir.path(), "a", "k1"), Some(b"v1".to_vec()));
        assert_eq!(read(dir.path(), "b", "k1"), Some(b"other".to_vec()));
        assert_eq!(read(dir.path(), "a", "k2"), None);
    }

    #[test]
    fn reopen_keeps_existing_partitions() {
        let dir = TempDir::new().unwrap();
        let handle = RocksBackend::new().open(dir.path()).unwrap();
        handle.write("signals", b"0", b"0").unwrap();
        handle.close();

        let handle = RocksBackend::new()
            .with_sync_writes(true)
            .open(dir.path())
            .unwrap();
        handle.write("signals", b"1", b"200").unwrap();
        handle.close();

        assert_eq!(read(dir.path(), "signals", "0"), Some(b"0".to_vec()));
        assert_eq!(read(dir.path(), "signals", "1"), Some(b"200".to_vec()));
    }

    #[test]
    fn close_is_idempotent_and_rejects_later_writes() {
        let dir = TempDir::new().unwrap();
        let handle = RocksBackend::new().open(dir.path()).unwrap();
        handle.close();
        handle.close();
        let err = handle.write("signals", b"k", b"v").unwrap_err();
        assert!(matches!(err, AppError::BackendWrite { .. }));
    }

    #[test]
    fn concurrent_writers_share_one_handle() {
        let dir = TempDir::new().unwrap();
        let handle = std::sync::Arc::new(RocksBackend::new().open(dir.path()).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("{t}-{i}");
                        handle.write("signals", key.as_bytes(), b"v").unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        handle.close();
        assert_eq!(read(dir.path(), "signals", "7-99"), Some(b"v".to_vec()));
    }

    #[test]
    fn open_fails_on_a_file_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = RocksBackend::new().open(file.path()).unwrap_err();
        assert!(matches!(err, AppError::BackendOpen { .. }));
    }
}

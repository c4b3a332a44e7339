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

//! The storage boundary of the dispatcher.
//!
//! The dispatcher only opens a store, writes single key/value pairs into a named
//! partition and closes the store again. Both calls are blocking, the dispatcher
//! runs them on the blocking pool.

mod memory;
mod rocks;

use std::path::Path;

pub use memory::{MemoryBackend, MemoryHandle};
pub use rocks::{RocksBackend, RocksHandle};

use crate::AppResult;

/// Opens a store at a location.
pub trait StorageBackend: Send + Sync + 'static {
    type Handle: PartitionWriter;

    fn open(&self, location: &Path) -> AppResult<Self::Handle>;
}

/// An open store.
///
/// `write` is called concurrently from many write tasks against the same handle.
/// `close` is called once by the dispatcher after every write finished, and must
/// tolerate being called again.
pub trait PartitionWriter: Send + Sync + 'static {
    fn write(&self, partition: &str, key: &[u8], value: &[u8]) -> AppResult<()>;

    fn close(&self);
}

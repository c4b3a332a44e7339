pub mod backend;
mod dispatcher;
mod service;
mod signal;
mod utils;

pub use backend::{MemoryBackend, PartitionWriter, RocksBackend, StorageBackend};
pub use dispatcher::{Dispatcher, DispatcherState, SubmitError, WriteFault};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, BackendKind, Shutdown, StopTrigger,
    StoreConfig,
};
pub use signal::{Ack, Signal, SignalChannel, SignalEnvelope, SignalError};

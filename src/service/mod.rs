pub use app_error::{AppError, AppResult};
pub use config::{BackendKind, BackendSection, LoadSection, LogSection, StoreConfig, StoreSection};
pub use shutdown::{Shutdown, StopTrigger};
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod shutdown;
mod tracing_config;

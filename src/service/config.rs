extern crate config as _;

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Rocksdb,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreSection {
    /// Directory the backend opens.
    pub location: String,
    /// Partition every write lands in.
    pub partition: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        StoreSection {
            location: "signalstore.db".to_string(),
            partition: "signals".to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct BackendSection {
    pub kind: BackendKind,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogSection {
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogSection {
    fn default() -> Self {
        LogSection {
            dir: "logs".to_string(),
            file_prefix: "signalstore.log".to_string(),
        }
    }
}

/// Defaults for the `load` command of the binary.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoadSection {
    pub count: usize,
    /// 0 means one producer per cpu.
    pub producers: usize,
}

impl Default for LoadSection {
    fn default() -> Self {
        LoadSection {
            count: 100_000,
            producers: 0,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub load: LoadSection,
}

impl StoreConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<StoreConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let store_config: StoreConfig = config.try_deserialize()?;
        store_config.validate()?;

        Ok(store_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.store.location.trim().is_empty() {
            return Err(AppError::InvalidValue(
                "store.location must not be empty".to_string(),
            ));
        }
        if self.store.partition.trim().is_empty() {
            return Err(AppError::InvalidValue(
                "store.partition must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_conf(body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_full_config() {
        let file = write_conf(
            r#"
            [store]
            location = "/tmp/signals.db"
            partition = "test"

            [backend]
            kind = "memory"

            [log]
            dir = "/tmp/logs"
            file_prefix = "s.log"

            [load]
            count = 42
            producers = 3
            "#,
        );
        let conf = StoreConfig::set_up_config(file.path()).unwrap();
        assert_eq!(conf.store.location, "/tmp/signals.db");
        assert_eq!(conf.store.partition, "test");
        assert_eq!(conf.backend.kind, BackendKind::Memory);
        assert_eq!(conf.log.dir, "/tmp/logs");
        assert_eq!(conf.load.count, 42);
        assert_eq!(conf.load.producers, 3);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let file = write_conf(
            r#"
            [store]
            location = "data"
            partition = "bucket"
            "#,
        );
        let conf = StoreConfig::set_up_config(file.path()).unwrap();
        assert_eq!(conf.backend.kind, BackendKind::Rocksdb);
        assert_eq!(conf.log.file_prefix, "signalstore.log");
        assert_eq!(conf.load.count, 100_000);
    }

    #[test]
    fn empty_partition_is_rejected() {
        let file = write_conf(
            r#"
            [store]
            location = "data"
            partition = ""
            "#,
        );
        let err = StoreConfig::set_up_config(file.path()).unwrap_err();
        assert!(matches!(err, AppError::InvalidValue(_)));
    }
}

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
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<ServerConfig> = OnceCell::new();

/// Returns the process wide configuration.
///
/// Panics if called before the binary stored a config in [`GLOBAL_CONFIG`].
pub fn global_config() -> &'static ServerConfig {
    GLOBAL_CONFIG.get().expect("global config is not initialized")
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: usize,
    /// Largest frame body accepted from a client.
    pub max_frame_size: usize,
    /// Size of a single socket read, also the fragment size of assembled frames.
    pub conn_read_buffer_size: usize,
    /// Output is flushed without an explicit request once this many bytes are buffered.
    pub conn_write_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "127.0.0.1".to_string(),
            port: 9092,
            max_connection: 1024,
            max_frame_size: 8 * 1024 * 1024,
            conn_read_buffer_size: 16 * 1024,
            conn_write_buffer_size: 32 * 1024,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReaderConfig {
    /// Deadline for reading one full frame once its first byte is expected.
    pub frame_read_timeout_ms: u64,
    /// Deadline for each slice loaded while a frame's batches are consumed.
    pub load_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            frame_read_timeout_ms: 30_000,
            load_timeout_ms: 5_000,
        }
    }
}

impl ReaderConfig {
    pub fn frame_read_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_read_timeout_ms)
    }
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub reader: ReaderConfig,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(config::Environment::with_prefix("LOGWIRE").separator("__"))
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.network.conn_read_buffer_size == 0 {
            return Err(AppError::InvalidValue(
                "network.conn_read_buffer_size must be positive".to_string(),
            ));
        }
        if self.network.max_frame_size > u32::MAX as usize {
            return Err(AppError::InvalidValue(format!(
                "network.max_frame_size {} exceeds the frame length field",
                self.network.max_frame_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_config_from_file() -> AppResult<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[network]
ip = "0.0.0.0"
port = 19092
max_connection = 8
max_frame_size = 4096
conn_read_buffer_size = 512
conn_write_buffer_size = 1024

[reader]
frame_read_timeout_ms = 100
load_timeout_ms = 50
"#
        )?;

        let config = ServerConfig::set_up_config(file.path())?;
        assert_eq!(config.network.port, 19092);
        assert_eq!(config.network.max_frame_size, 4096);
        assert_eq!(config.reader.load_timeout(), Duration::from_millis(50));
        Ok(())
    }

    #[test]
    fn test_reject_zero_read_buffer() -> AppResult<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(
            file,
            r#"
[network]
ip = "127.0.0.1"
port = 9092
max_connection = 8
max_frame_size = 4096
conn_read_buffer_size = 0
conn_write_buffer_size = 1024

[reader]
frame_read_timeout_ms = 100
load_timeout_ms = 50
"#
        )?;

        let result = ServerConfig::set_up_config(file.path());
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
        Ok(())
    }
}

//! Store configuration
//!
//! Every field has a default, so a TOML file only needs the keys it
//! changes:
//!
//! ```toml
//! cache_frames = 256
//! server_address = "10.0.0.5:19876"
//! ```

use crate::error::{CartError, Result};
use crate::file_table::{DEFAULT_MAX_FILES, DEFAULT_MAX_NAME_LEN};
use crate::frame_cache::DEFAULT_CACHE_FRAMES;
use crate::geometry::{Geometry, DEFAULT_CARTRIDGES, DEFAULT_FRAMES_PER_CARTRIDGE};
use crate::io::tcp::DEFAULT_SERVER_ADDRESS;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Handles are 16-bit
const MAX_FILES_LIMIT: usize = 1 << 16;

/// Largest device the ownership grid is sized for (16 GiB of frames)
pub const MAX_TOTAL_FRAMES: usize = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Cartridges on the device
    pub cartridges: usize,
    /// Frames in each cartridge
    pub frames_per_cartridge: usize,
    /// Frame cache capacity
    pub cache_frames: usize,
    /// Simultaneously open files
    pub max_files: usize,
    /// Longest accepted file name, in bytes
    pub max_name_len: usize,
    /// Bus server for the TCP transport
    pub server_address: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            cartridges: DEFAULT_CARTRIDGES,
            frames_per_cartridge: DEFAULT_FRAMES_PER_CARTRIDGE,
            cache_frames: DEFAULT_CACHE_FRAMES,
            max_files: DEFAULT_MAX_FILES,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            CartError::Config(format!("cannot read {}: {}", path.as_ref().display(), err))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| CartError::Config(err.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let geometry = self.geometry()?;
        if geometry.total_frames() > MAX_TOTAL_FRAMES {
            return Err(CartError::Config(format!(
                "device of {} frames exceeds the limit of {}",
                geometry.total_frames(),
                MAX_TOTAL_FRAMES
            )));
        }
        if self.cache_frames == 0 {
            return Err(CartError::InvalidCapacity(0));
        }
        if self.max_files == 0 || self.max_files > MAX_FILES_LIMIT {
            return Err(CartError::Config(format!(
                "max_files must be in 1..={}, got {}",
                MAX_FILES_LIMIT, self.max_files
            )));
        }
        if self.max_name_len == 0 {
            return Err(CartError::Config("max_name_len must be positive".to_string()));
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::new(self.cartridges, self.frames_per_cartridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_device() {
        let config = StoreConfig::default();
        assert_eq!(config.cartridges, 64);
        assert_eq!(config.frames_per_cartridge, 1024);
        assert_eq!(config.cache_frames, 1024);
        assert_eq!(config.max_files, 1024);
        assert_eq!(config.max_name_len, 128);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config = StoreConfig::from_toml_str("cache_frames = 16\ncartridges = 2\n").unwrap();
        assert_eq!(config.cache_frames, 16);
        assert_eq!(config.cartridges, 2);
        assert_eq!(config.frames_per_cartridge, 1024);
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let result = StoreConfig::from_toml_str("cache_size = 16\n");
        assert!(matches!(result, Err(CartError::Config(_))));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(StoreConfig::from_toml_str("cache_frames = 0\n").is_err());
        assert!(StoreConfig::from_toml_str("cartridges = 0\n").is_err());
        assert!(StoreConfig::from_toml_str("max_files = 70000\n").is_err());
    }

    #[test]
    fn test_rejects_oversized_device() {
        let result =
            StoreConfig::from_toml_str("cartridges = 65536\nframes_per_cartridge = 65536\n");
        assert!(matches!(result, Err(CartError::Config(_))));

        let config =
            StoreConfig::from_toml_str("cartridges = 16384\nframes_per_cartridge = 1024\n").unwrap();
        assert_eq!(config.geometry().unwrap().total_frames(), MAX_TOTAL_FRAMES);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server_address = \"10.1.2.3:4000\"").unwrap();
        writeln!(file, "max_files = 8").unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert_eq!(config.server_address, "10.1.2.3:4000");
        assert_eq!(config.max_files, 8);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = StoreConfig {
            cache_frames: 3,
            ..StoreConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), config);
    }
}

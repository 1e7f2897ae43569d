use crate::error::Error;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;

pub const MIN_PASSES: u8 = 1;
pub const MAX_PASSES: u8 = 10;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub passes: u8,
    pub rename: bool,
    pub rename_cycles: u32,
    pub name_length: usize,
    /// Upper bound on concurrent overwrite workers. 1 keeps everything on the calling thread.
    pub workers: usize,
    pub overwrite_chunk_bytes: usize,
    pub journal: JournalFloodConfig,
    pub shadow: ShadowFloodConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            passes: 3,
            rename: true,
            rename_cycles: 3,
            name_length: crate::naming::DEFAULT_NAME_LENGTH,
            workers: 1,
            overwrite_chunk_bytes: MIB as usize,
            journal: JournalFloodConfig::default(),
            shadow: ShadowFloodConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalFloodConfig {
    /// Approximate size of one journal record in bytes.
    pub record_size: u64,
    /// Journal-visible operations per dummy: create, one per rename cycle, delete.
    pub ops_per_lifecycle: u64,
    pub fill_fraction: f64,
    pub rename_cycles: u32,
    /// Dummies alive at once before the batch is renamed and deleted.
    pub batch_size: u64,
    pub dummy_file_bytes: usize,
}

impl Default for JournalFloodConfig {
    fn default() -> Self {
        Self {
            record_size: 400,
            ops_per_lifecycle: 5,
            fill_fraction: 1.5,
            rename_cycles: 3,
            batch_size: 1000,
            dummy_file_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShadowFloodConfig {
    pub fill_fraction: f64,
    pub chunk_file_bytes: u64,
    pub write_buffer_bytes: usize,
    /// Free space that must remain after a chunk is written.
    pub safety_margin_bytes: u64,
}

impl Default for ShadowFloodConfig {
    fn default() -> Self {
        Self {
            fill_fraction: 0.8,
            chunk_file_bytes: 100 * MIB,
            write_buffer_bytes: MIB as usize,
            safety_margin_bytes: GIB,
        }
    }
}

/// Per-run overwrite settings. Pass counts outside [1, 10] are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassConfig {
    pass_count: u8,
    rename_enabled: bool,
}

impl PassConfig {
    pub fn new(pass_count: u8, rename_enabled: bool) -> Result<Self, Error> {
        if !(MIN_PASSES..=MAX_PASSES).contains(&pass_count) {
            return Err(Error::InvalidPassCount(pass_count));
        }
        Ok(Self {
            pass_count,
            rename_enabled,
        })
    }

    pub fn pass_count(&self) -> u8 {
        self.pass_count
    }

    pub fn rename_enabled(&self) -> bool {
        self.rename_enabled
    }
}

impl EngineConfig {
    pub fn pass_config(&self) -> Result<PassConfig, Error> {
        PassConfig::new(self.passes, self.rename)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.pass_config()?;

        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.name_length < 16 || self.name_length % 2 != 0 {
            return invalid("name_length must be an even number of at least 16");
        }
        if self.rename_cycles == 0 {
            return invalid("rename_cycles must be at least 1");
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.overwrite_chunk_bytes == 0 {
            return invalid("overwrite_chunk_bytes must be positive");
        }
        if self.journal.record_size == 0 || self.journal.ops_per_lifecycle == 0 {
            return invalid("journal.record_size and journal.ops_per_lifecycle must be positive");
        }
        if self.journal.batch_size == 0 {
            return invalid("journal.batch_size must be positive");
        }
        if !(self.journal.fill_fraction.is_finite() && self.journal.fill_fraction > 0.0) {
            return invalid("journal.fill_fraction must be a positive number");
        }
        if !(self.shadow.fill_fraction.is_finite() && self.shadow.fill_fraction > 0.0) {
            return invalid("shadow.fill_fraction must be a positive number");
        }
        if self.shadow.chunk_file_bytes == 0 || self.shadow.write_buffer_bytes == 0 {
            return invalid(
                "shadow.chunk_file_bytes and shadow.write_buffer_bytes must be positive",
            );
        }
        Ok(())
    }
}

/// Load `Config.toml` (optional) overlaid with `SECURE_WIPE_*` environment variables.
///
/// `SECURE_WIPE_PASSES=7` sets a top-level key; `SECURE_WIPE_JOURNAL__BATCH_SIZE=10`
/// reaches into a section.
pub fn load_configuration() -> Result<EngineConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(environment())
        .build()?;
    builder.try_deserialize::<EngineConfig>()
}

fn environment() -> Environment {
    Environment::with_prefix("SECURE_WIPE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.journal.ops_per_lifecycle, 5);
        assert_eq!(config.shadow.chunk_file_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_pass_config_rejects_out_of_range() {
        assert!(matches!(
            PassConfig::new(0, true),
            Err(Error::InvalidPassCount(0))
        ));
        assert!(matches!(
            PassConfig::new(11, false),
            Err(Error::InvalidPassCount(11))
        ));
        let passes = PassConfig::new(10, false).unwrap();
        assert_eq!(passes.pass_count(), 10);
        assert!(!passes.rename_enabled());
    }

    #[test]
    fn test_validate_rejects_bad_flood_constants() {
        let mut config = EngineConfig::default();
        config.journal.ops_per_lifecycle = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.shadow.fill_fraction = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.passes = 12;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidPassCount(12))
        ));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: EngineConfig = Config::builder()
            .add_source(config::File::from_str(
                "passes = 5\n[journal]\nbatch_size = 10\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.passes, 5);
        assert_eq!(config.journal.batch_size, 10);
        assert_eq!(config.journal.record_size, 400);
        assert!(config.rename);
    }

    #[test]
    fn test_environment_overrides_use_single_underscore_prefix() {
        let vars: config::Map<String, String> = [
            ("SECURE_WIPE_PASSES", "7"),
            ("SECURE_WIPE_RENAME", "false"),
            ("SECURE_WIPE_JOURNAL__BATCH_SIZE", "10"),
            ("OTHER_PASSES", "2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config: EngineConfig = Config::builder()
            .add_source(environment().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.passes, 7);
        assert!(!config.rename);
        assert_eq!(config.journal.batch_size, 10);
        assert_eq!(config.journal.record_size, 400);
    }
}

use crate::core::TARGET_BITS;
use crate::error::{BlockchainError, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:3000";
static DEFAULT_DATA_DIR: &str = "./data";

pub const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
pub const BOOTSTRAP_NODE_KEY: &str = "BOOTSTRAP_NODE";
pub const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
pub const STAKE_ADDRESS_KEY: &str = "STAKE_ADDRESS";
pub const DATA_DIR_KEY: &str = "DATA_DIR";
pub const TARGET_BITS_KEY: &str = "TARGET_BITS";
pub const TX_BATCH_THRESHOLD_KEY: &str = "TX_BATCH_THRESHOLD";
pub const MINING_INTERVAL_KEY: &str = "MINING_INTERVAL_SECS";

const KNOWN_KEYS: [&str; 8] = [
    NODE_ADDRESS_KEY,
    BOOTSTRAP_NODE_KEY,
    MINING_ADDRESS_KEY,
    STAKE_ADDRESS_KEY,
    DATA_DIR_KEY,
    TARGET_BITS_KEY,
    TX_BATCH_THRESHOLD_KEY,
    MINING_INTERVAL_KEY,
];

/// Node settings. Layered as defaults, then an optional TOML file, then
/// environment variables, each layer overriding the previous one.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Built-in defaults only.
    pub fn new() -> Config {
        let mut map = HashMap::new();
        map.insert(NODE_ADDRESS_KEY.to_string(), DEFAULT_NODE_ADDR.to_string());
        map.insert(BOOTSTRAP_NODE_KEY.to_string(), DEFAULT_NODE_ADDR.to_string());
        map.insert(DATA_DIR_KEY.to_string(), DEFAULT_DATA_DIR.to_string());
        map.insert(TARGET_BITS_KEY.to_string(), TARGET_BITS.to_string());
        map.insert(TX_BATCH_THRESHOLD_KEY.to_string(), "2".to_string());
        map.insert(MINING_INTERVAL_KEY.to_string(), "15".to_string());
        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn load(file: Option<&Path>) -> Result<Config> {
        let config = Config::new();
        if let Some(path) = file {
            let text = std::fs::read_to_string(path).map_err(|e| {
                BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
            })?;
            config.apply_toml(&text)?;
        }
        config.apply_vars(KNOWN_KEYS.iter().filter_map(|key| {
            env::var(key).ok().map(|value| (key.to_string(), value))
        }));
        Ok(config)
    }

    // Table keys are the lowercase setting names, e.g. `node_address = "..."`
    fn apply_toml(&self, text: &str) -> Result<()> {
        let table = text
            .parse::<toml::Table>()
            .map_err(|e| BlockchainError::Config(format!("Invalid config file: {e}")))?;
        let mut inner = self.write();
        for (key, value) in table {
            let key = key.to_uppercase();
            if !KNOWN_KEYS.contains(&key.as_str()) {
                return Err(BlockchainError::Config(format!("Unknown setting '{key}'")));
            }
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                other => {
                    return Err(BlockchainError::Config(format!(
                        "Setting '{key}' has unsupported value {other}"
                    )))
                }
            };
            inner.insert(key, value);
        }
        Ok(())
    }

    fn apply_vars(&self, vars: impl IntoIterator<Item = (String, String)>) {
        let mut inner = self.write();
        for (key, value) in vars {
            inner.insert(key, value);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).filter(|value| !value.is_empty()).cloned()
    }

    fn get_parsed<T: FromStr>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| BlockchainError::Config(format!("Missing setting '{key}'")))?;
        value
            .parse()
            .map_err(|_| BlockchainError::Config(format!("Invalid value '{value}' for '{key}'")))
    }

    pub fn set(&self, key: &str, value: &str) {
        self.write().insert(key.to_string(), value.to_string());
    }

    pub fn get_node_addr(&self) -> String {
        self.get(NODE_ADDRESS_KEY)
            .unwrap_or_else(|| DEFAULT_NODE_ADDR.to_string())
    }

    pub fn set_node_addr(&self, addr: &str) {
        self.set(NODE_ADDRESS_KEY, addr);
    }

    pub fn get_bootstrap_addr(&self) -> String {
        self.get(BOOTSTRAP_NODE_KEY)
            .unwrap_or_else(|| DEFAULT_NODE_ADDR.to_string())
    }

    pub fn set_bootstrap_addr(&self, addr: &str) {
        self.set(BOOTSTRAP_NODE_KEY, addr);
    }

    pub fn get_mining_addr(&self) -> Option<String> {
        self.get(MINING_ADDRESS_KEY)
    }

    pub fn set_mining_addr(&self, addr: &str) {
        self.set(MINING_ADDRESS_KEY, addr);
    }

    pub fn is_miner(&self) -> bool {
        self.get_mining_addr().is_some()
    }

    /// Address claimed as stakeholder; falls back to the mining address.
    pub fn get_stake_addr(&self) -> Option<String> {
        self.get(STAKE_ADDRESS_KEY).or_else(|| self.get_mining_addr())
    }

    pub fn set_stake_addr(&self, addr: &str) {
        self.set(STAKE_ADDRESS_KEY, addr);
    }

    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(
            self.get(DATA_DIR_KEY)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        )
    }

    pub fn get_target_bits(&self) -> Result<u32> {
        let bits: u32 = self.get_parsed(TARGET_BITS_KEY)?;
        if bits == 0 || bits > 255 {
            return Err(BlockchainError::Config(format!(
                "TARGET_BITS must be between 1 and 255, got {bits}"
            )));
        }
        Ok(bits)
    }

    pub fn get_tx_threshold(&self) -> Result<usize> {
        self.get_parsed(TX_BATCH_THRESHOLD_KEY)
    }

    pub fn get_mining_interval(&self) -> Result<Duration> {
        Ok(Duration::from_secs(self.get_parsed(MINING_INTERVAL_KEY)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.get_node_addr(), "127.0.0.1:3000");
        assert_eq!(config.get_bootstrap_addr(), "127.0.0.1:3000");
        assert_eq!(config.get_target_bits().unwrap(), TARGET_BITS);
        assert_eq!(config.get_tx_threshold().unwrap(), 2);
        assert_eq!(config.get_mining_interval().unwrap(), Duration::from_secs(15));
        assert!(!config.is_miner());
        assert_eq!(config.get_stake_addr(), None);
    }

    #[test]
    fn test_toml_then_vars_override() {
        let config = Config::new();
        config
            .apply_toml("node_address = \"127.0.0.1:4000\"\ntarget_bits = 12\n")
            .unwrap();
        assert_eq!(config.get_node_addr(), "127.0.0.1:4000");
        assert_eq!(config.get_target_bits().unwrap(), 12);

        config.apply_vars([(TARGET_BITS_KEY.to_string(), "10".to_string())]);
        assert_eq!(config.get_target_bits().unwrap(), 10);
        assert_eq!(config.get_node_addr(), "127.0.0.1:4000");
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "tx_batch_threshold = 5\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.get_tx_threshold().unwrap(), 5);
    }

    #[test]
    fn test_bad_values_are_config_errors() {
        let config = Config::new();
        assert!(config.apply_toml("colour = \"red\"").is_err());
        config.set(TARGET_BITS_KEY, "300");
        assert!(matches!(
            config.get_target_bits(),
            Err(BlockchainError::Config(_))
        ));
        config.set(TX_BATCH_THRESHOLD_KEY, "many");
        assert!(config.get_tx_threshold().is_err());
    }

    #[test]
    fn test_stake_address_falls_back_to_miner() {
        let config = Config::new();
        config.set_mining_addr("miner");
        assert_eq!(config.get_stake_addr(), Some("miner".to_string()));
        config.set_stake_addr("holder");
        assert_eq!(config.get_stake_addr(), Some("holder".to_string()));
    }
}

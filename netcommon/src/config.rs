//! Runtime configuration for the repeater
//!
//! JSON-backed configuration value object. The persistent key/value store
//! and the HTTP configuration page live outside the core; they load and
//! save this structure. Changes take effect on restart.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum 802.11 SSID length in octets
pub const SSID_MAX_LEN: usize = 32;
/// Maximum WPA passphrase length in octets
pub const PASSPHRASE_MAX_LEN: usize = 64;

/// Authentication mode offered by the repeater's own AP
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApAuthMode {
    Wpa,
    Wpa2,
    WpaWpa2,
    Wpa3,
    Wpa2Wpa3,
}

impl Default for ApAuthMode {
    fn default() -> Self {
        ApAuthMode::Wpa2Wpa3
    }
}

/// Pseudo-mesh roaming knobs.
///
/// Carried in the configuration surface even though the core pins a single
/// upstream anchor per process; roaming decisions belong to a future outer
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoamingConfig {
    pub enabled: bool,
    /// Scan for a better AP when RSSI drops below this (dBm)
    pub rssi_threshold_dbm: i8,
    /// A new AP must be this much better to switch (dB)
    pub hysteresis_db: u8,
}

impl Default for RoamingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rssi_threshold_dbm: -70,
            hysteresis_db: 8,
        }
    }
}

/// Repeater runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepeaterConfig {
    /// Upstream (STA) network
    pub sta_ssid: String,
    pub sta_password: String,
    /// Repeater's own AP
    pub ap_ssid: String,
    pub ap_password: String,
    /// Radio
    pub tx_power_dbm: u8,
    pub max_clients: u8,
    /// Security
    pub ap_authmode: ApAuthMode,
    /// Advertise the upstream SSID on the repeater AP instead of `ap_ssid`
    pub clone_upstream_ssid: bool,
    /// When enabled, only ARP broadcasts addressed to the repeater itself
    /// are delivered to the host IP stack; other non-unicast frames are
    /// forwarded at L2 only
    pub broadcast_filter: bool,
    pub roaming: RoamingConfig,
}

impl Default for RepeaterConfig {
    fn default() -> Self {
        Self {
            sta_ssid: String::new(),
            sta_password: String::new(),
            ap_ssid: "repeater".to_string(),
            ap_password: String::new(),
            tx_power_dbm: 20,
            max_clients: 8,
            ap_authmode: ApAuthMode::default(),
            clone_upstream_ssid: false,
            broadcast_filter: false,
            roaming: RoamingConfig::default(),
        }
    }
}

impl RepeaterConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(&path)?;
        let config: RepeaterConfig = serde_json::from_slice(&data)
            .map_err(|e| Error::Config(format!("JSON parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: RepeaterConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("JSON parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let json = self.to_json()?;
        std::fs::write(&path, json.as_bytes())?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("JSON serialization error: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sta_ssid.is_empty() {
            return Err(Error::Config("sta_ssid is required".to_string()));
        }
        if self.sta_ssid.len() > SSID_MAX_LEN || self.ap_ssid.len() > SSID_MAX_LEN {
            return Err(Error::Config(format!(
                "SSID must be at most {} octets",
                SSID_MAX_LEN
            )));
        }
        if self.ap_ssid.is_empty() && !self.clone_upstream_ssid {
            return Err(Error::Config(
                "ap_ssid is required unless clone_upstream_ssid is set".to_string(),
            ));
        }
        if self.sta_password.len() > PASSPHRASE_MAX_LEN
            || self.ap_password.len() > PASSPHRASE_MAX_LEN
        {
            return Err(Error::Config(format!(
                "passphrase must be at most {} octets",
                PASSPHRASE_MAX_LEN
            )));
        }
        if !self.ap_password.is_empty() && self.ap_password.len() < 8 {
            return Err(Error::Config(
                "ap_password must be at least 8 octets (or empty for an open AP)".to_string(),
            ));
        }
        if !(2..=20).contains(&self.tx_power_dbm) {
            return Err(Error::Config(
                "tx_power_dbm must be between 2 and 20".to_string(),
            ));
        }
        if !(1..=10).contains(&self.max_clients) {
            return Err(Error::Config(
                "max_clients must be between 1 and 10".to_string(),
            ));
        }
        if !(-90..=-40).contains(&self.roaming.rssi_threshold_dbm) {
            return Err(Error::Config(
                "roaming.rssi_threshold_dbm must be between -90 and -40".to_string(),
            ));
        }
        if !(1..=30).contains(&self.roaming.hysteresis_db) {
            return Err(Error::Config(
                "roaming.hysteresis_db must be between 1 and 30".to_string(),
            ));
        }
        Ok(())
    }

    /// True when the repeater AP runs without encryption
    pub fn ap_is_open(&self) -> bool {
        self.ap_password.is_empty()
    }

    /// SSID the repeater AP actually advertises
    pub fn effective_ap_ssid(&self) -> &str {
        if self.clone_upstream_ssid {
            &self.sta_ssid
        } else {
            &self.ap_ssid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepeaterConfig::default();
        assert_eq!(config.tx_power_dbm, 20);
        assert_eq!(config.max_clients, 8);
        assert_eq!(config.ap_authmode, ApAuthMode::Wpa2Wpa3);
        assert!(!config.roaming.enabled);
        assert_eq!(config.roaming.rssi_threshold_dbm, -70);
        assert!(config.ap_is_open());
    }

    #[test]
    fn test_minimal_json() {
        let json = r#"{
            "sta_ssid": "HomeNet",
            "sta_password": "hunter2hunter2",
            "ap_ssid": "HomeNet-ext"
        }"#;

        let config = RepeaterConfig::from_json(json).unwrap();
        assert_eq!(config.sta_ssid, "HomeNet");
        assert_eq!(config.ap_ssid, "HomeNet-ext");
        assert_eq!(config.max_clients, 8);
    }

    #[test]
    fn test_validation_missing_upstream() {
        let json = r#"{"ap_ssid": "ext"}"#;
        assert!(RepeaterConfig::from_json(json).is_err());
    }

    #[test]
    fn test_validation_short_ap_password() {
        let json = r#"{"sta_ssid": "up", "ap_ssid": "ext", "ap_password": "short"}"#;
        assert!(RepeaterConfig::from_json(json).is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut config = RepeaterConfig {
            sta_ssid: "up".to_string(),
            ..Default::default()
        };
        config.validate().unwrap();

        config.tx_power_dbm = 1;
        assert!(config.validate().is_err());
        config.tx_power_dbm = 20;

        config.max_clients = 11;
        assert!(config.validate().is_err());
        config.max_clients = 10;

        config.roaming.rssi_threshold_dbm = -30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_ap_ssid() {
        let mut config = RepeaterConfig {
            sta_ssid: "up".to_string(),
            ap_ssid: "ext".to_string(),
            ..Default::default()
        };
        assert_eq!(config.effective_ap_ssid(), "ext");
        config.clone_upstream_ssid = true;
        assert_eq!(config.effective_ap_ssid(), "up");
    }

    #[test]
    fn test_json_round_trip() {
        let config = RepeaterConfig {
            sta_ssid: "up".to_string(),
            sta_password: "secretpass".to_string(),
            ap_ssid: "ext".to_string(),
            ap_password: "extpass123".to_string(),
            max_clients: 4,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        let parsed = RepeaterConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }
}

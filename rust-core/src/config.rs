use hex::FromHex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_MAX_PARTICIPANTS: usize = 10_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
    #[serde(default = "default_max_winners")]
    pub max_winners_per_draw: usize,
    #[serde(default)]
    pub http: HttpConfig,
    /// 32-byte ed25519 secret (hex) used to sign public proofs.
    #[serde(default)]
    pub signing_key_hex: Option<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_participants() -> usize {
    DEFAULT_MAX_PARTICIPANTS
}

fn default_max_winners() -> usize {
    1_000
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_participants: default_max_participants(),
            max_winners_per_draw: default_max_winners(),
            http: HttpConfig::default(),
            signing_key_hex: None,
            log_filter: default_log_filter(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:7100".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let raw = fs::read_to_string(path).map_err(|e| format!("{}", e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let cfg: EngineConfig = serde_json::from_str(raw).map_err(|e| format!("{}", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_participants == 0 {
            return Err("max_participants must be positive".into());
        }
        if self.max_winners_per_draw == 0 {
            return Err("max_winners_per_draw must be positive".into());
        }
        if let Some(key) = &self.signing_key_hex {
            parse_signing_key(key)?;
        }
        Ok(())
    }

    pub fn signing_key(&self) -> Result<Option<[u8; 32]>, String> {
        self.signing_key_hex
            .as_deref()
            .map(parse_signing_key)
            .transpose()
    }
}

fn parse_signing_key(hex_str: &str) -> Result<[u8; 32], String> {
    <[u8; 32]>::from_hex(hex_str.trim())
        .map_err(|_| "invalid signing_key_hex (expected 32 bytes)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let cfg = EngineConfig::from_json("{}").unwrap();
        assert_eq!(cfg.data_dir, "data");
        assert_eq!(cfg.max_participants, 10_000);
        assert_eq!(cfg.max_winners_per_draw, 1_000);
        assert_eq!(cfg.http.listen_addr, "127.0.0.1:7100");
        assert!(cfg.signing_key().unwrap().is_none());
    }

    #[test]
    fn bad_signing_key_rejected() {
        let err = EngineConfig::from_json(r#"{"signing_key_hex":"abcd"}"#).unwrap_err();
        assert!(err.contains("signing_key_hex"));
    }

    #[test]
    fn zero_limits_rejected() {
        assert!(EngineConfig::from_json(r#"{"max_winners_per_draw":0}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"max_participants":0}"#).is_err());
    }

    #[test]
    fn signing_key_parsed() {
        let hex_key = "11".repeat(32);
        let cfg = EngineConfig::from_json(&format!(r#"{{"signing_key_hex":"{}"}}"#, hex_key))
            .unwrap();
        assert_eq!(cfg.signing_key().unwrap(), Some([0x11; 32]));
    }
}

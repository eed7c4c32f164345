//! Station configuration: the on-disk TOML file, CLI overrides, and the transport
//! endpoint URL grammar (`tcp://host:port`, `serial:///dev/ttyUSB0?baud=N`, `ble://addr`).
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use packet_proto::callsign::Callsign;
use packet_proto::digipeater::DigipeatMode;
use packet_proto::link::LinkConfig;
use packet_proto::retry::RetryConfig;
use url::Url;

#[derive(Debug)]
pub enum ConfigError {
    FileUnreadable(String),
    Malformed(String),
    InvalidCallsign(String),
    InvalidTransport(String),
}

impl Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileUnreadable(msg) => write!(f, "<FileUnreadable: {msg}>"),
            ConfigError::Malformed(msg) => write!(f, "<Malformed: {msg}>"),
            ConfigError::InvalidCallsign(msg) => write!(f, "<InvalidCallsign: {msg}>"),
            ConfigError::InvalidTransport(msg) => write!(f, "<InvalidTransport: {msg}>"),
        }
    }
}

/// Where the station reads and writes its packets. Parsed from a scheme-prefixed URL so
/// the same string can come from a config file or a `--transport` CLI flag.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEndpoint {
    Ble { address: String },
    Serial { device: String, baud: u32 },
    Tcp { host: String, port: u16 },
}

impl FromStr for TransportEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // BLE MAC addresses (`aa:bb:cc:dd:ee:ff`) contain colons, which `url` treats as a
        // forbidden host code point (it tries to parse everything after the first one as
        // a numeric port) — handled by stripping the scheme manually rather than handing
        // the whole string to `Url::parse`.
        if let Some(rest) = s.strip_prefix("ble://") {
            let address = rest.trim_end_matches('/').to_string();
            if address.is_empty() {
                return Err(ConfigError::InvalidTransport(format!(
                    "{s:?}: missing BLE address"
                )));
            }
            return Ok(TransportEndpoint::Ble { address });
        }

        let url = Url::parse(s)
            .map_err(|e| ConfigError::InvalidTransport(format!("{s:?}: {e}")))?;
        match url.scheme() {
            "serial" => {
                let device = url.path().to_string();
                if device.is_empty() {
                    return Err(ConfigError::InvalidTransport(format!(
                        "{s:?}: missing serial device path"
                    )));
                }
                let baud = url
                    .query_pairs()
                    .find(|(k, _)| k == "baud")
                    .and_then(|(_, v)| v.parse::<u32>().ok())
                    .unwrap_or(9600);
                Ok(TransportEndpoint::Serial { device, baud })
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| ConfigError::InvalidTransport(format!("{s:?}: missing host")))?
                    .to_string();
                let port = url.port().ok_or_else(|| {
                    ConfigError::InvalidTransport(format!("{s:?}: missing port"))
                })?;
                Ok(TransportEndpoint::Tcp { host, port })
            }
            other => Err(ConfigError::InvalidTransport(format!(
                "{s:?}: unsupported scheme {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub mycall: String,
    pub myalias: Option<String>,
    pub unproto: String,
    pub monitor: bool,
    pub digipeat: String,
    pub auto_ack: bool,
    pub txdelay_cs: u32,
    pub retry: u32,
    pub retry_fast_secs: u64,
    pub retry_slow_secs: u64,
    pub beacon: bool,
    pub beacon_interval_secs: u64,
    pub beacon_path: String,
    pub beacon_symbol: String,
    pub beacon_comment: String,
    pub mylocation: Option<String>,
    pub transport: String,
    pub kiss_bridge_port: u16,
    pub agwpe_port: u16,
    pub state_dir: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            mycall: "N0CALL".to_string(),
            myalias: None,
            unproto: "APRS via WIDE1-1,WIDE2-1".to_string(),
            monitor: true,
            digipeat: "off".to_string(),
            auto_ack: true,
            txdelay_cs: 30,
            retry: 3,
            retry_fast_secs: 20,
            retry_slow_secs: 600,
            beacon: false,
            beacon_interval_secs: 600,
            beacon_path: "WIDE1-1,WIDE2-1".to_string(),
            beacon_symbol: "/-".to_string(),
            beacon_comment: String::new(),
            mylocation: None,
            transport: "tcp://127.0.0.1:8001".to_string(),
            kiss_bridge_port: 8001,
            agwpe_port: 8000,
            state_dir: "./state".to_string(),
        }
    }
}

impl StationConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileUnreadable(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn mycall(&self) -> Result<Callsign, ConfigError> {
        Callsign::from_str(&self.mycall).map_err(ConfigError::InvalidCallsign)
    }

    pub fn myalias(&self) -> Option<Callsign> {
        self.myalias.as_deref().and_then(|s| Callsign::from_str(s).ok())
    }

    pub fn digipeat_mode(&self) -> DigipeatMode {
        match self.digipeat.as_str() {
            "on" => DigipeatMode::On,
            "self" => DigipeatMode::SelfOnly,
            _ => DigipeatMode::Off,
        }
    }

    pub fn transport_endpoint(&self) -> Result<TransportEndpoint, ConfigError> {
        TransportEndpoint::from_str(&self.transport)
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig::default()
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            t_fast: Duration::from_secs(self.retry_fast_secs),
            t_slow: Duration::from_secs(self.retry_slow_secs),
            n_max: self.retry,
        }
    }

    pub fn txdelay(&self) -> Duration {
        Duration::from_millis(u64::from(self.txdelay_cs) * 10)
    }

    /// Parses `mylocation` as a `"lat,lon"` pair of signed decimal degrees.
    pub fn beacon_location(&self) -> Option<(f64, f64)> {
        let raw = self.mylocation.as_deref()?;
        let (lat, lon) = raw.split_once(',')?;
        Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
    }

    pub fn beacon_symbol(&self) -> (char, char) {
        let mut chars = self.beacon_symbol.chars();
        let table = chars.next().unwrap_or('/');
        let code = chars.next().unwrap_or('-');
        (table, code)
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_secs(self.beacon_interval_secs)
    }
}

/// Command-line overrides, merged on top of the TOML file. Every field is optional so
/// an unset flag leaves the file's (or the default's) value untouched.
#[derive(Debug, Parser)]
#[command(name = "packet-station", about = "APRS/AX.25 packet-radio station daemon")]
pub struct Options {
    /// Path to the station's TOML configuration file.
    #[arg(short, long, default_value = "station.toml")]
    pub config: String,

    /// Station callsign-SSID, e.g. `K1FSY-1`. Overrides `mycall` in the config file.
    #[arg(long)]
    pub mycall: Option<String>,

    /// Transport endpoint URL, e.g. `tcp://127.0.0.1:8001`. Overrides `transport`.
    #[arg(long)]
    pub transport: Option<String>,

    /// Digipeating mode: `off`, `on`, or `self`. Overrides `digipeat`.
    #[arg(long)]
    pub digipeat: Option<String>,

    /// Increase log verbosity (stacks: `-v`, `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Options {
    /// Applies CLI overrides onto a config loaded from disk.
    pub fn apply(&self, mut config: StationConfig) -> StationConfig {
        if let Some(mycall) = &self.mycall {
            config.mycall = mycall.clone();
        }
        if let Some(transport) = &self.transport {
            config.transport = transport.clone();
        }
        if let Some(digipeat) = &self.digipeat {
            config.digipeat = digipeat.clone();
        }
        config
    }
}

/// Loads the station configuration: `.env` first (for secrets/local overrides), then the
/// TOML file named by `--config`, then CLI flags on top.
pub fn load() -> Result<(StationConfig, Options), ConfigError> {
    dotenv::dotenv().ok();
    let options = Options::parse();
    let config = StationConfig::load_file(Path::new(&options.config))?;
    let config = options.apply(config);
    Ok((config, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_endpoint_parses_host_and_port() {
        let ep = TransportEndpoint::from_str("tcp://127.0.0.1:8001").unwrap();
        assert_eq!(
            ep,
            TransportEndpoint::Tcp {
                host: "127.0.0.1".to_string(),
                port: 8001
            }
        );
    }

    #[test]
    fn serial_endpoint_parses_device_and_baud() {
        let ep = TransportEndpoint::from_str("serial:///dev/ttyUSB0?baud=19200").unwrap();
        assert_eq!(
            ep,
            TransportEndpoint::Serial {
                device: "/dev/ttyUSB0".to_string(),
                baud: 19200
            }
        );
    }

    #[test]
    fn serial_endpoint_defaults_baud_when_absent() {
        let ep = TransportEndpoint::from_str("serial:///dev/ttyUSB0").unwrap();
        assert_eq!(
            ep,
            TransportEndpoint::Serial {
                device: "/dev/ttyUSB0".to_string(),
                baud: 9600
            }
        );
    }

    #[test]
    fn ble_endpoint_parses_address() {
        let ep = TransportEndpoint::from_str("ble://aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(
            ep,
            TransportEndpoint::Ble {
                address: "aa:bb:cc:dd:ee:ff".to_string()
            }
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(TransportEndpoint::from_str("udp://127.0.0.1:1234").is_err());
    }

    #[test]
    fn defaults_parse_as_a_valid_config() {
        let config = StationConfig::default();
        assert_eq!(config.mycall().unwrap().to_string(), "N0CALL");
        assert!(config.transport_endpoint().is_ok());
        assert_eq!(config.digipeat_mode(), DigipeatMode::Off);
    }

    #[test]
    fn beacon_location_parses_signed_decimal_pair() {
        let mut config = StationConfig::default();
        config.mylocation = Some(" 47.6985, -122.3200 ".to_string());
        assert_eq!(config.beacon_location(), Some((47.6985, -122.32)));
    }

    #[test]
    fn beacon_location_absent_without_mylocation() {
        assert_eq!(StationConfig::default().beacon_location(), None);
    }

    #[test]
    fn toml_overlay_overrides_defaults() {
        let config = StationConfig::from_toml_str(
            r#"
            mycall = "K1FSY-1"
            digipeat = "on"
            kiss_bridge_port = 9001
            "#,
        )
        .unwrap();
        assert_eq!(config.mycall, "K1FSY-1");
        assert_eq!(config.digipeat_mode(), DigipeatMode::On);
        assert_eq!(config.kiss_bridge_port, 9001);
        // Untouched fields keep their defaults.
        assert_eq!(config.retry, 3);
    }
}

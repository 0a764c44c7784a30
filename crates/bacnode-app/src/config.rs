use std::net::{SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use bacnode_datalink::BroadcastDistributionEntry;

/// Configuration of one router port when the device runs as an N-port
/// router.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouterPortConfig {
    pub port_id: u8,
    pub network_number: u16,
    pub bind: SocketAddr,
    pub max_npdu_length: u16,
}

/// Router-mode configuration: which port hosts the local application.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouterConfig {
    pub ports: Vec<RouterPortConfig>,
    pub application_port: u8,
}

/// BBMD-mode configuration for the primary port.
#[derive(Debug, Clone)]
pub struct BbmdPortConfig {
    pub local_address: SocketAddrV4,
    pub nat_global_address: Option<SocketAddrV4>,
    pub accept_fd_registrations: bool,
    pub allow_write_bdt: bool,
    pub bdt: Vec<BroadcastDistributionEntry>,
    pub backup_path: Option<PathBuf>,
}

/// Device configuration handed to [`Application::start`].
///
/// Loading this from flags or files is the business of the calling
/// program; the library only consumes the value.
///
/// [`Application::start`]: crate::Application::start
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub instance_number: u32,
    pub name: String,
    pub vendor_id: u16,
    /// Bind address of the primary port.
    pub bind: SocketAddr,
    /// Register as a foreign device with this BBMD.
    pub foreign_bbmd: Option<(SocketAddr, u16)>,
    pub apdu_timeout: Duration,
    pub apdu_segment_timeout: Duration,
    pub apdu_retries: u8,
    pub max_apdu_length: usize,
    pub max_segments: u8,
    pub proposed_window_size: u8,
    pub event_scan_interval: Duration,
    pub router: Option<RouterConfig>,
    pub bbmd: Option<BbmdPortConfig>,
    /// Password demanded by DeviceCommunicationControl and
    /// ReinitializeDevice, when set.
    pub password: Option<String>,
}

impl DeviceConfig {
    pub fn new(instance_number: u32, name: impl Into<String>) -> Self {
        Self {
            instance_number,
            name: name.into(),
            vendor_id: 0,
            bind: "0.0.0.0:47808".parse().expect("static addr"),
            foreign_bbmd: None,
            apdu_timeout: Duration::from_secs(3),
            apdu_segment_timeout: Duration::from_millis(1500),
            apdu_retries: 3,
            max_apdu_length: 1476,
            max_segments: 16,
            proposed_window_size: 4,
            event_scan_interval: Duration::from_secs(1),
            router: None,
            bbmd: None,
            password: None,
        }
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.instance_number > 0x3F_FFFE {
            return Err(format!(
                "device instance {} exceeds 22-bit limit",
                self.instance_number
            ));
        }
        if self.name.is_empty() {
            return Err("device name must not be empty".into());
        }
        if self.max_apdu_length < 50 {
            return Err("max_apdu_length below the 50-octet minimum".into());
        }
        if let Some(router) = &self.router {
            if !router
                .ports
                .iter()
                .any(|p| p.port_id == router.application_port)
            {
                return Err("router application_port does not match any port".into());
            }
            for port in &router.ports {
                if port.network_number == 0 || port.network_number == 0xFFFF {
                    return Err(format!(
                        "router port {} has invalid network number {}",
                        port.port_id, port.network_number
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceConfig, RouterConfig, RouterPortConfig};

    #[test]
    fn default_config_validates() {
        assert!(DeviceConfig::new(1000, "unit-1").validate().is_ok());
    }

    #[test]
    fn rejects_bad_router_network() {
        let mut config = DeviceConfig::new(1, "r");
        config.router = Some(RouterConfig {
            ports: vec![RouterPortConfig {
                port_id: 1,
                network_number: 0xFFFF,
                bind: "127.0.0.1:0".parse().unwrap(),
                max_npdu_length: 1497,
            }],
            application_port: 1,
        });
        assert!(config.validate().is_err());
    }
}

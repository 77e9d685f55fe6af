use std::env;
use std::time::Duration;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    /// Provisioning root served over TFTP
    pub prov_dir: String,
    pub encoder_bin: String,
    pub encoder_keyfile: String,
    pub encoder_timeout: Duration,
    pub dhcp_conf_dir: String,
    pub dhcpd_conf: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        let prov_dir = get_env("PROV_DIR", "/tftpboot");
        Self {
            db_path: get_env("DB_PATH", "/data/provbase.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            encoder_bin: get_env("ENCODER_BIN", "docsis"),
            encoder_keyfile: get_env("ENCODER_KEYFILE", &format!("{}/keyfile", prov_dir)),
            encoder_timeout: Duration::from_secs(
                get_env("ENCODER_TIMEOUT_SECS", "10")
                    .parse()
                    .unwrap_or(10),
            ),
            dhcp_conf_dir: get_env("DHCP_CONF_DIR", "/etc/dhcp/nms/netgws"),
            dhcpd_conf: get_env("DHCPD_CONF", "/etc/dhcp/dhcpd.conf"),
            prov_dir,
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Address of the upstream origin server, e.g. `https://api.example.tv`.
    #[serde(default = "default_dst_server")]
    pub dst_server: String,
    /// Request `Host` header sent to the origin.
    #[serde(default = "default_dst_host")]
    pub dst_host: String,
    #[serde(with = "humantime_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_write_timeout")]
    pub write_timeout: Duration,
    /// Force connection rotation after this much time.
    #[serde(with = "humantime_serde", default = "default_conn_timeout")]
    pub conn_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    #[serde(default = "default_max_idle_conn")]
    pub max_idle_conn: usize,
    #[serde(default = "default_max_conns_per_host")]
    pub max_conns_per_host: usize,
    #[serde(with = "humantime_serde", default = "default_dns_cache_dur")]
    pub dns_cache_dur: Duration,
    /// Maximum concurrent dials. `0` means unlimited.
    #[serde(default)]
    pub tcpdial_concurr: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            dst_server: default_dst_server(),
            dst_host: default_dst_host(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            conn_timeout: default_conn_timeout(),
            idle_timeout: default_idle_timeout(),
            max_idle_conn: default_max_idle_conn(),
            max_conns_per_host: default_max_conns_per_host(),
            dns_cache_dur: default_dns_cache_dur(),
            tcpdial_concurr: 0,
        }
    }
}

fn default_dst_server() -> String {
    "https://api.anilibria.tv".to_string()
}

fn default_dst_host() -> String {
    "api.anilibria.tv".to_string()
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_idle_conn() -> usize {
    256
}

fn default_max_conns_per_host() -> usize {
    256
}

fn default_dns_cache_dur() -> Duration {
    Duration::from_secs(60)
}

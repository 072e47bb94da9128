//! Tunable parameters governing admission, caps, and housekeeping cadence.

use serde::{Deserialize, Serialize};

/// Tunable parameters for the channel registry and SYN-cookie store.
///
/// Defaults match the reference node's field-tested values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkTunables {
    /// Per-source-IP connection cap.
    #[serde(default = "default_max_per_ip")]
    pub max_per_ip: usize,

    /// Outstanding handshakes per IP.
    #[serde(default = "default_max_cookies_per_ip")]
    pub max_cookies_per_ip: usize,

    /// How long a SYN cookie remains valid, in seconds.
    #[serde(default = "default_cookie_ttl_secs")]
    pub cookie_ttl_secs: u64,

    /// Purge threshold for `last_packet_sent`, in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Idle threshold triggering keepalive emission, in seconds.
    #[serde(default = "default_keepalive_period_secs")]
    pub keepalive_period_secs: u64,

    /// Floor on `last_bootstrap_attempt` before a peer is reconsidered for
    /// a bootstrap pick, in seconds.
    #[serde(default = "default_bootstrap_reattempt_secs")]
    pub bootstrap_reattempt_secs: u64,
}

fn default_max_per_ip() -> usize {
    8
}

fn default_max_cookies_per_ip() -> usize {
    1
}

fn default_cookie_ttl_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    5 * 60
}

fn default_keepalive_period_secs() -> u64 {
    60
}

fn default_bootstrap_reattempt_secs() -> u64 {
    30 * 60
}

impl Default for NetworkTunables {
    fn default() -> Self {
        Self {
            max_per_ip: default_max_per_ip(),
            max_cookies_per_ip: default_max_cookies_per_ip(),
            cookie_ttl_secs: default_cookie_ttl_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            keepalive_period_secs: default_keepalive_period_secs(),
            bootstrap_reattempt_secs: default_bootstrap_reattempt_secs(),
        }
    }
}

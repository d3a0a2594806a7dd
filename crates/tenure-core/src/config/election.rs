use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::leadership::LEADERSHIP_CHANNEL;

/// Election configuration.
///
/// The `name` is the namespace shared by every process contending for the
/// same lease; the `id` must be unique per process within that namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Unique identity of this process. Generated when absent.
    pub id: Option<String>,

    /// Namespace shared by all contenders for the same lease.
    #[serde(default = "default_name")]
    pub name: String,

    /// Base period for election retries and reelection, in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Slack added to the interval before peers consider a lease expired,
    /// in seconds.
    #[serde(default = "default_ttl_padding")]
    pub ttl_padding_secs: u64,

    /// Notification channel carrying leadership announcements.
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: default_name(),
            interval_secs: default_interval(),
            ttl_padding_secs: default_ttl_padding(),
            channel: default_channel(),
        }
    }
}

impl ElectionConfig {
    /// Resolve the process identity, generating one if not configured.
    pub fn id_or_generate(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Base election/reelection period.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// TTL padding beyond the interval.
    pub fn ttl_padding(&self) -> Duration {
        Duration::from_secs(self.ttl_padding_secs)
    }
}

fn default_name() -> String {
    "default".to_string()
}

fn default_interval() -> u64 {
    30
}

fn default_ttl_padding() -> u64 {
    10
}

fn default_channel() -> String {
    LEADERSHIP_CHANNEL.to_string()
}

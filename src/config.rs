//! Endpoint configuration knobs with environment overrides.

use anyhow::ensure;

/// Default largest payload carried through a pooled receive slot.
pub const DEFAULT_MAX_MSG_LEN: usize = 3 * 512 * 1024;
/// Default number of pre-posted receive slots.
pub const DEFAULT_NRECV: usize = 128;
/// Default sleep between empty poll sweeps, in microseconds.
pub const DEFAULT_BACKOFF_US: u64 = 5;
/// Upper clamp on the poll backoff.
pub const MAX_BACKOFF_US: u64 = 100;
/// Default per-source bound on queued huge-message announcements.
pub const DEFAULT_HUGE_PENDING_CAP: usize = 64;

#[derive(Clone, Debug)]
pub struct RmiConfig {
    /// Largest payload that fits a pooled receive slot; anything bigger
    /// goes through the huge-message rendezvous.
    pub max_msg_len: usize,
    /// Number of receive slots kept posted on the transport. Over-provisioned
    /// relative to expected concurrency so senders never stall on receiver
    /// buffer exhaustion.
    pub nrecv: usize,
    /// Dispatcher sleep after a sweep that completed nothing. Clamped to
    /// `0..=`[`MAX_BACKOFF_US`] microseconds at start.
    pub backoff_us: u64,
    /// How many oversize-transfer announcements a single source may have
    /// queued before admission control aborts.
    pub huge_pending_cap: usize,
    /// Pin the dispatcher thread to this core index, if set.
    pub pin_core: Option<usize>,
}

impl Default for RmiConfig {
    fn default() -> Self {
        Self {
            max_msg_len: DEFAULT_MAX_MSG_LEN,
            nrecv: DEFAULT_NRECV,
            backoff_us: DEFAULT_BACKOFF_US,
            huge_pending_cap: DEFAULT_HUGE_PENDING_CAP,
            pin_core: None,
        }
    }
}

impl RmiConfig {
    /// Defaults plus any `RMI_BACKOFF_US`, `RMI_MAX_MSG_LEN` and `RMI_NRECV`
    /// environment overrides.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = parse_env("RMI_BACKOFF_US") {
            self.backoff_us = v;
        }
        if let Some(v) = parse_env("RMI_MAX_MSG_LEN") {
            self.max_msg_len = v as usize;
        }
        if let Some(v) = parse_env("RMI_NRECV") {
            self.nrecv = v as usize;
        }
        self
    }

    pub(crate) fn clamped(mut self) -> Self {
        self.backoff_us = self.backoff_us.min(MAX_BACKOFF_US);
        self
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.nrecv > 0, "receive pool depth must be at least 1");
        ensure!(self.max_msg_len > 0, "maximum message length must be nonzero");
        ensure!(
            self.huge_pending_cap > 0,
            "huge-message admission cap must be at least 1"
        );
        if let Some(core) = self.pin_core {
            ensure!(
                core < num_cpus::get(),
                "pin core {core} out of range (machine has {} cores)",
                num_cpus::get()
            );
        }
        Ok(())
    }
}

fn parse_env(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RmiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.nrecv, DEFAULT_NRECV);
        assert_eq!(config.max_msg_len, DEFAULT_MAX_MSG_LEN);
    }

    #[test]
    fn backoff_is_clamped() {
        let config = RmiConfig {
            backoff_us: 100_000,
            ..Default::default()
        }
        .clamped();
        assert_eq!(config.backoff_us, MAX_BACKOFF_US);

        let zero = RmiConfig {
            backoff_us: 0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(zero.backoff_us, 0);
    }

    #[test]
    fn rejects_degenerate_values() {
        let config = RmiConfig {
            nrecv: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RmiConfig {
            max_msg_len: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RmiConfig {
            pin_core: Some(usize::MAX),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

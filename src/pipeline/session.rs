//! Session-wide data path switches
//!
//! Flipping a flag off is immediate and idempotent: loops keep running and
//! codecs stay configured, but new data is discarded until the flag is back
//! on. Tearing down codecs is the coordinators' job on explicit stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
struct Flags {
    sending: AtomicBool,
    receiving: AtomicBool,
}

/// Shared "may send / may receive" flags of one session
#[derive(Debug, Clone)]
pub struct SessionFlags {
    shared: Arc<Flags>,
}

impl SessionFlags {
    /// Both directions enabled
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Flags {
                sending: AtomicBool::new(true),
                receiving: AtomicBool::new(true),
            }),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.shared.sending.load(Ordering::Acquire)
    }

    pub fn is_receiving(&self) -> bool {
        self.shared.receiving.load(Ordering::Acquire)
    }

    pub fn set_sending(&self, enabled: bool) {
        self.shared.sending.store(enabled, Ordering::Release);
    }

    pub fn set_receiving(&self, enabled: bool) {
        self.shared.receiving.store(enabled, Ordering::Release);
    }
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flags = SessionFlags::new();
        let other = flags.clone();
        assert!(other.is_receiving());

        flags.set_receiving(false);
        flags.set_receiving(false);
        assert!(!other.is_receiving());
        assert!(other.is_sending());
    }
}

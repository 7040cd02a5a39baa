//! SUBSCRIBE/NOTIFY usage bookkeeping (spec §3 "SubscribeUsage (event
//! package + expiry)"), grounded in the teacher's
//! `dialog-core::dialog::subscription_state` state tracking.

use std::time::{SystemTime, UNIX_EPOCH};

use super::state::SubscribeUsage;

impl SubscribeUsage {
    pub fn new(event_package: impl Into<String>, expires_seconds: u32) -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        SubscribeUsage { event_package: event_package.into(), expires_at: now + expires_seconds as u64, terminated: false }
    }

    pub fn is_expired(&self, now_epoch: u64) -> bool {
        self.terminated || now_epoch >= self.expires_at
    }

    pub fn renew(&mut self, expires_seconds: u32) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        self.expires_at = now + expires_seconds as u64;
        self.terminated = expires_seconds == 0;
    }
}

/// NOTIFY received out-of-dialog (spec §4.5 method-capability table):
/// routable only when an established subscription for the event package
/// already exists; otherwise 481.
pub fn can_accept_out_of_dialog_notify(existing_subscription: Option<&SubscribeUsage>, now_epoch: u64) -> bool {
    matches!(existing_subscription, Some(sub) if !sub.is_expired(now_epoch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renew_with_zero_expires_terminates() {
        let mut sub = SubscribeUsage::new("presence", 3600);
        sub.renew(0);
        assert!(sub.terminated);
    }

    #[test]
    fn out_of_dialog_notify_needs_live_subscription() {
        assert!(!can_accept_out_of_dialog_notify(None, 0));
        let sub = SubscribeUsage::new("presence", 3600);
        assert!(can_accept_out_of_dialog_notify(Some(&sub), 0));
    }
}

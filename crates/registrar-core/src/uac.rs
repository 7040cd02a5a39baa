//! Outbound registration (spec §4.7 "UAC"): one state machine per
//! `register =` config entry, refresh scheduling, and the 401/407-retry
//! digest round trip.

use std::time::Duration;

/// `EXPIRY_GUARD_SECS`/`EXPIRY_GUARD_PCT`/`EXPIRY_GUARD_MIN` (spec §4.7):
/// refresh fires at `expires - max(guard_secs, guard_pct * expires)`,
/// floored at `guard_min`.
pub const EXPIRY_GUARD_SECS: u64 = 15;
pub const EXPIRY_GUARD_PCT: f64 = 0.20;
pub const EXPIRY_GUARD_MIN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationState {
    Trying,
    Registered,
    Rejected,
    Timeout,
}

#[derive(Debug, Clone)]
pub struct RegistrationEntry {
    pub aor: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
    pub refresh_seconds: u32,
    pub state: RegistrationState,
    /// Number of 401/407 retries already spent on the in-flight attempt
    /// (spec §4.7: "retry once").
    pub auth_retries: u8,
}

impl RegistrationEntry {
    pub fn new(aor: impl Into<String>, host: impl Into<String>, port: u16, user: impl Into<String>, secret: impl Into<String>, refresh_seconds: u32) -> Self {
        RegistrationEntry {
            aor: aor.into(),
            host: host.into(),
            port,
            user: user.into(),
            secret: secret.into(),
            refresh_seconds,
            state: RegistrationState::Trying,
            auth_retries: 0,
        }
    }

    /// Whether a fresh REGISTER should be sent: on startup or whenever not
    /// currently `Registered` (spec §4.7).
    pub fn should_register(&self) -> bool {
        !matches!(self.state, RegistrationState::Registered)
    }
}

/// Compute when to schedule the next refresh after a `200 OK` carrying
/// `expires` seconds (spec §4.7).
pub fn refresh_delay(expires: u32) -> Duration {
    let expires = expires as f64;
    let guard = (EXPIRY_GUARD_SECS as f64).max(EXPIRY_GUARD_PCT * expires);
    let delay_secs = (expires - guard).max(0.0);
    Duration::from_secs_f64(delay_secs).max(EXPIRY_GUARD_MIN)
}

/// Parse `Expires:` header or the per-Contact `expires=` param, preferring
/// whichever is present (spec §4.7: "parse `Expires` or the per-Contact
/// `expires=` parameter, whichever is present").
pub fn resolve_expires(header_expires: Option<u32>, contact_expires_param: Option<u32>) -> Option<u32> {
    contact_expires_param.or(header_expires)
}

/// Outcome of processing one response to an outbound REGISTER (spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UacOutcome {
    /// `200 OK`: registered, refresh scheduled after `delay`.
    Registered { expires: u32 },
    /// `401`/`407`: retry once with computed digest credentials.
    RetryWithAuth,
    /// A second `401`/`407` after already retrying once: give up.
    AuthExhausted,
    /// `403`: stop retrying this entry.
    Rejected,
    /// No response within Timer F: mark `Timeout`, retry per config.
    Timeout,
}

pub fn process_response(entry: &mut RegistrationEntry, status: u16, expires: Option<u32>) -> UacOutcome {
    match status {
        200 => {
            entry.state = RegistrationState::Registered;
            entry.auth_retries = 0;
            UacOutcome::Registered { expires: expires.unwrap_or(entry.refresh_seconds) }
        }
        401 | 407 => {
            if entry.auth_retries == 0 {
                entry.auth_retries = 1;
                UacOutcome::RetryWithAuth
            } else {
                entry.state = RegistrationState::Rejected;
                UacOutcome::AuthExhausted
            }
        }
        403 => {
            entry.state = RegistrationState::Rejected;
            UacOutcome::Rejected
        }
        _ => {
            entry.state = RegistrationState::Timeout;
            UacOutcome::Timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_delay_uses_percentage_when_larger_than_floor() {
        // expires=60 -> guard = max(15, 0.2*60=12) = 15 -> delay = 45s
        assert_eq!(refresh_delay(60), Duration::from_secs(45));
    }

    #[test]
    fn refresh_delay_uses_percentage_for_long_expiry() {
        // expires=3600 -> guard = max(15, 720) = 720 -> delay = 2880s
        assert_eq!(refresh_delay(3600), Duration::from_secs(2880));
    }

    #[test]
    fn retries_auth_exactly_once() {
        let mut entry = RegistrationEntry::new("bob", "example.com", 5060, "bob", "zanzibar", 3600);
        assert_eq!(process_response(&mut entry, 401, None), UacOutcome::RetryWithAuth);
        assert_eq!(process_response(&mut entry, 401, None), UacOutcome::AuthExhausted);
        assert_eq!(entry.state, RegistrationState::Rejected);
    }

    #[test]
    fn contact_expires_param_preferred_over_header() {
        assert_eq!(resolve_expires(Some(3600), Some(60)), Some(60));
        assert_eq!(resolve_expires(Some(3600), None), Some(3600));
    }
}

//! Inbound registrar logic (spec §4.7 "Registrar"): authentication gate,
//! `Contact: *`/`Expires: 0` removal, per-contact expiry clamp, and the
//! "single-binding delete" decision for `Expires: 0` with a non-wildcard
//! Contact (spec §9 open question, resolved in DESIGN.md).

use std::sync::Arc;

use crate::binding::{clamp_expiry, expiry_epoch_from_now, Binding, BindingStore, LocationService, PersistedBinding};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    pub max_expiry: u32,
    pub default_expiry: u32,
    pub max_contacts: usize,
    pub allow_guest: bool,
    pub always_auth_reject: bool,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        RegistrarConfig { max_expiry: 3600, default_expiry: 3600, max_contacts: 1, allow_guest: false, always_auth_reject: false }
    }
}

/// One parsed `Contact:` header occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEntry {
    pub uri: String,
    pub is_wildcard: bool,
    pub expires_param: Option<u32>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RegisterOutcome {
    /// Bindings removed via `Contact: *` + `Expires: 0`.
    RemovedAll,
    /// A single contact's binding removed (spec §9: modern "single-binding
    /// delete" for `Expires: 0` with a specific Contact).
    RemovedOne { contact_uri: String },
    /// No Contact and no Expires: just report current bindings.
    Queried { bindings: Vec<Binding> },
    /// One or more contacts registered/refreshed; `expires` is the value
    /// to put in the response `Expires:`/Contact `expires=` params.
    Registered { bindings: Vec<Binding>, expires: u32 },
}

/// Whether the registrar should challenge this request at all (spec
/// §4.7: "Authentication required (unless `allowguest` and not
/// `alwaysauthreject`)").
pub fn requires_auth(config: &RegistrarConfig) -> bool {
    !(config.allow_guest && !config.always_auth_reject)
}

/// Parse the request's `Contact:` header occurrences, including the
/// `Contact: *` wildcard form.
pub fn parse_contacts(raw_values: impl Iterator<Item = String>) -> Vec<ContactEntry> {
    raw_values
        .map(|v| {
            let v = v.trim();
            if v == "*" {
                return ContactEntry { uri: "*".into(), is_wildcard: true, expires_param: None };
            }
            let (uri_part, params) = match v.find(';') {
                Some(idx) => (&v[..idx], &v[idx + 1..]),
                None => (v, ""),
            };
            let uri = uri_part.trim().trim_start_matches('<').trim_end_matches('>').to_string();
            let expires_param = params
                .split(';')
                .find_map(|p| p.trim().strip_prefix("expires=").and_then(|n| n.parse::<u32>().ok()));
            ContactEntry { uri, is_wildcard: false, expires_param }
        })
        .collect()
}

/// Handle one REGISTER request against `location`/`store` for a caller
/// that has already passed authentication (the auth gate itself lives in
/// `auth-core`; this function assumes the digest check already
/// succeeded, or that `requires_auth` returned `false`).
pub async fn handle_register(
    location: &Arc<LocationService>,
    store: &dyn BindingStore,
    config: &RegistrarConfig,
    aor: &str,
    username: &str,
    contacts: &[ContactEntry],
    header_expires: Option<u32>,
    call_id: &str,
    cseq: u32,
    user_agent: Option<String>,
    remote_addr: &str,
    remote_port: u16,
) -> Result<RegisterOutcome> {
    if let Some(wildcard) = contacts.iter().find(|c| c.is_wildcard) {
        let _ = wildcard;
        if header_expires == Some(0) {
            location.remove_all(aor);
            for b in location.bindings_for(aor) {
                store.remove(username, &b.contact_uri).await;
            }
            return Ok(RegisterOutcome::RemovedAll);
        }
    }

    if contacts.is_empty() && header_expires.is_none() {
        return Ok(RegisterOutcome::Queried { bindings: location.bindings_for(aor) });
    }

    let mut registered = Vec::new();
    for contact in contacts {
        if contact.is_wildcard {
            continue;
        }
        let requested = contact.expires_param.or(header_expires).unwrap_or(config.default_expiry);

        if requested == 0 {
            // spec §9 open question: modern "single-binding delete".
            location.remove(aor, &contact.uri);
            store.remove(username, &contact.uri).await;
            return Ok(RegisterOutcome::RemovedOne { contact_uri: contact.uri.clone() });
        }

        let expires = clamp_expiry(requested, config.max_expiry);
        let expires_at = expiry_epoch_from_now(expires);
        let binding = Binding {
            contact_uri: contact.uri.clone(),
            expires_at,
            user_agent: user_agent.clone(),
            call_id: call_id.to_string(),
            cseq,
        };
        location
            .upsert(aor, binding.clone(), config.max_contacts)
            .map_err(|e| match e {
                crate::error::Error::TooManyContacts(n) => Error::TooManyContacts(n),
                crate::error::Error::CSeqConflict => Error::CSeqConflict,
                other => other,
            })?;
        store
            .save(
                username,
                &PersistedBinding {
                    addr: remote_addr.to_string(),
                    port: remote_port,
                    expiry_epoch: expires_at,
                    username: username.to_string(),
                    contact_uri: contact.uri.clone(),
                },
            )
            .await;
        registered.push(binding);
    }

    if registered.is_empty() {
        return Ok(RegisterOutcome::Queried { bindings: location.bindings_for(aor) });
    }

    let expires = registered.iter().map(|b| b.expires_at).min().map(|at| {
        at.saturating_sub(crate::binding::now_epoch()) as u32
    }).unwrap_or(config.default_expiry);

    Ok(RegisterOutcome::Registered { bindings: registered, expires })
}

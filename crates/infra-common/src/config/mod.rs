//! A flat `[section]` key-value config file reader, the format spec §6
//! describes (`[general]`, `[authentication]`, one section per peer).
//!
//! This module only does the generic parsing (sections -> ordered key/value
//! pairs); `sipswitch-core::config` layers the typed `Config`/`PeerConfig`
//! structs with defaults and validation on top, the way the teacher layers
//! a typed config struct over a raw loader.

use std::collections::BTreeMap;

/// One `[section]` block: an ordered list of `key = value` pairs. Order is
/// kept because later per-peer sections may repeat a key (e.g. multiple
/// `register =` lines) and callers need all occurrences, not just the last.
#[derive(Debug, Clone, Default)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    /// Last value for `key`, if present (most config keys are single-valued).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in file order (used for `register =` entries).
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries.iter().filter(move |(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// A parsed config file: ordered list of sections, plus an index by name
/// (sections may repeat, e.g. legacy multi-definition of the same peer --
/// last one wins when looked up by name, matching traditional ini loaders).
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub sections: Vec<Section>,
}

impl RawConfig {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().rev().find(|s| s.name == name)
    }

    /// All sections except `general`/`authentication`, keyed by name --
    /// these are the per-user/peer/friend blocks.
    pub fn peer_sections(&self) -> BTreeMap<&str, &Section> {
        self.sections
            .iter()
            .filter(|s| s.name != "general" && s.name != "authentication")
            .map(|s| (s.name.as_str(), s))
            .collect()
    }
}

/// Parse errors are reported but never fatal at this layer: an unparsable
/// line is skipped and logged by the caller, matching spec §6's "unknown
/// keys are warned-and-ignored, not fatal" contract.
pub fn parse(input: &str) -> RawConfig {
    let mut sections = Vec::new();
    let mut current: Option<Section> = None;

    for raw_line in input.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(s) = current.take() {
                sections.push(s);
            }
            current = Some(Section { name: name.trim().to_string(), entries: Vec::new() });
            continue;
        }
        let Some(eq) = line.find('=') else { continue };
        let key = line[..eq].trim().to_string();
        let value = line[eq + 1..].trim().to_string();
        if let Some(section) = current.as_mut() {
            section.entries.push((key, value));
        }
    }
    if let Some(s) = current.take() {
        sections.push(s);
    }
    RawConfig { sections }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_repeated_keys() {
        let cfg = parse(
            "[general]\nbindport = 5060\n; comment\n[bob]\nsecret=zanzibar\n\
             [general]\nregister = a@b\nregister = c@d\n",
        );
        assert_eq!(cfg.section("bob").unwrap().get("secret"), Some("zanzibar"));
        let general = cfg.section("general").unwrap();
        assert_eq!(general.get_all("register").collect::<Vec<_>>(), vec!["a@b", "c@d"]);
    }
}

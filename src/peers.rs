//! Peer registry (C8): maps system names and entity labels to the numeric
//! `src`/`src_ent` ids actually observed on the wire, learned from
//! `Announce`, `EntityList` (REPORT), and `EntityInfo` traffic.
//!
//! Grounded in `original_source/src/pyimclsts/network.py`'s
//! `subscriber._update_peers`.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct PeerEntry {
    src: Option<u16>,
    entities: HashMap<String, u8>,
}

#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    by_name: HashMap<String, PeerEntry>,
    /// Entity reports that arrived before the corresponding `Announce`,
    /// keyed by the numeric `src` they were observed on.
    pending_by_src: HashMap<u16, PeerEntry>,
    src_to_name: HashMap<u16, String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_announce(&mut self, sys_name: &str, src: u16) {
        self.src_to_name.insert(src, sys_name.to_string());
        let pending = self.pending_by_src.remove(&src).unwrap_or_default();
        let entry = self.by_name.entry(sys_name.to_string()).or_default();
        entry.src = Some(src);
        for (label, id) in pending.entities {
            entry.entities.entry(label).or_insert(id);
        }
    }

    pub fn observe_entity_info(&mut self, src: u16, label: &str, id: u8) {
        self.with_entities_mut(src, |entities| {
            entities.insert(label.to_string(), id);
        });
    }

    /// `list` is the `EntityList.list` field for a REPORT operation:
    /// `"label=id;label=id;..."`. Replaces the full entity set for `src`.
    pub fn observe_entity_list_report(&mut self, src: u16, list: &str) {
        let mut parsed = HashMap::new();
        for pair in list.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            if let Some((label, id)) = pair.split_once('=') {
                if let Ok(id) = id.trim().parse::<u8>() {
                    parsed.insert(label.trim().to_string(), id);
                }
            }
        }
        self.with_entities_mut(src, |entities| *entities = parsed.clone());
    }

    fn with_entities_mut(&mut self, src: u16, f: impl FnOnce(&mut HashMap<String, u8>)) {
        if let Some(name) = self.src_to_name.get(&src).cloned() {
            f(&mut self.by_name.entry(name).or_default().entities);
        } else {
            f(&mut self.pending_by_src.entry(src).or_default().entities);
        }
    }

    pub fn lookup_src(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).and_then(|e| e.src)
    }

    pub fn lookup_entity(&self, name: &str, label: &str) -> Option<u8> {
        self.by_name.get(name).and_then(|e| e.entities.get(label)).copied()
    }

    /// Per spec §4.7.3: a subscription filter on `(src_name, src_ent_name)`
    /// matches a frame observed with numeric `(src, src_ent)` when every
    /// non-null component resolves (via this registry) to the observed
    /// value. A null component always matches; an entity-name filter with
    /// no accompanying system name can never resolve and never matches.
    pub fn matches(
        &self,
        observed_src: u16,
        observed_src_ent: u8,
        want_src: &Option<String>,
        want_src_ent: &Option<String>,
    ) -> bool {
        let src_ok = match want_src {
            None => true,
            Some(name) => self.lookup_src(name) == Some(observed_src),
        };
        let ent_ok = match (want_src, want_src_ent) {
            (_, None) => true,
            (Some(name), Some(ent_name)) => self.lookup_entity(name, ent_name) == Some(observed_src_ent),
            (None, Some(_)) => false,
        };
        src_ok && ent_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_then_entity_info_resolves_lookup() {
        let mut reg = PeerRegistry::new();
        reg.observe_announce("lauv-xplore-1", 0x2001);
        reg.observe_entity_info(0x2001, "GPS", 5);
        assert_eq!(reg.lookup_src("lauv-xplore-1"), Some(0x2001));
        assert_eq!(reg.lookup_entity("lauv-xplore-1", "GPS"), Some(5));
    }

    #[test]
    fn entity_info_before_announce_is_retained() {
        let mut reg = PeerRegistry::new();
        reg.observe_entity_info(0x2001, "GPS", 5);
        reg.observe_announce("lauv-xplore-1", 0x2001);
        assert_eq!(reg.lookup_entity("lauv-xplore-1", "GPS"), Some(5));
    }

    #[test]
    fn entity_list_report_replaces_full_set() {
        let mut reg = PeerRegistry::new();
        reg.observe_announce("lauv-xplore-1", 0x2001);
        reg.observe_entity_info(0x2001, "Stale", 9);
        reg.observe_entity_list_report(0x2001, "GPS=5;IMU=6");
        assert_eq!(reg.lookup_entity("lauv-xplore-1", "GPS"), Some(5));
        assert_eq!(reg.lookup_entity("lauv-xplore-1", "Stale"), None);
    }

    #[test]
    fn entity_filter_without_system_name_never_matches() {
        let reg = PeerRegistry::new();
        assert!(!reg.matches(1, 2, &None, &Some("GPS".to_string())));
    }

    #[test]
    fn null_filters_always_match() {
        let reg = PeerRegistry::new();
        assert!(reg.matches(1, 2, &None, &None));
    }
}

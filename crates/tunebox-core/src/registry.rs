//! In-memory station registry and save-time change detection.

use log::info;

use crate::station::{NAME_TEXT_MAX, STATION_COUNT, Station, URL_TEXT_MAX, sanitized};

/// The five preset slots, in display order. Single-owner: mutated only by the
/// save handler and the boot-time load, read by everything else.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StationRegistry {
    stations: [Station; STATION_COUNT],
}

impl StationRegistry {
    pub const fn new() -> Self {
        Self {
            stations: [const { Station { name: heapless::String::new(), url: heapless::String::new() } };
                STATION_COUNT],
        }
    }

    pub fn station(&self, index: usize) -> Option<&Station> {
        self.stations.get(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Station> {
        self.stations.iter()
    }

    /// Replaces a slot wholesale. Used by the preset decoder; the web path
    /// goes through [`Self::apply_update`] instead.
    pub fn set_station(&mut self, index: usize, station: Station) {
        if let Some(slot) = self.stations.get_mut(index) {
            *slot = station;
        }
    }

    /// Applies one submitted name/url pair to a slot: trim, truncate, then
    /// byte-compare against what is stored. Returns whether the slot changed.
    /// The caller batches slots and commits at most once per submission.
    pub fn apply_update(&mut self, index: usize, name: &str, url: &str) -> bool {
        let Some(slot) = self.stations.get_mut(index) else {
            return false;
        };

        let name: heapless::String<NAME_TEXT_MAX> = sanitized(name);
        let url: heapless::String<URL_TEXT_MAX> = sanitized(url);

        if slot.name == name && slot.url == url {
            return false;
        }

        slot.name = name;
        slot.url = url;
        info!("station {} updated: '{}' -> '{}'", index, slot.name, slot.url);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_update_detects_change_once() {
        let mut registry = StationRegistry::new();

        assert!(registry.apply_update(0, "Jazz", "http://a.fm"));
        // Same values again: nothing to do.
        assert!(!registry.apply_update(0, "Jazz", "http://a.fm"));
        // Whitespace-only differences are trimmed away before comparing.
        assert!(!registry.apply_update(0, "  Jazz ", " http://a.fm "));

        assert!(registry.apply_update(0, "Jazz", "http://b.fm"));
    }

    #[test]
    fn apply_update_truncates_before_comparing() {
        let mut registry = StationRegistry::new();
        let long = "n".repeat(40);

        assert!(registry.apply_update(1, &long, "http://x"));
        let stored = registry.station(1).unwrap();
        assert_eq!(stored.name.len(), NAME_TEXT_MAX);

        // A resubmission that only differs past the truncation point is a no-op.
        let longer = "n".repeat(60);
        assert!(!registry.apply_update(1, &longer, "http://x"));
    }

    #[test]
    fn apply_update_ignores_out_of_range_slots() {
        let mut registry = StationRegistry::new();
        assert!(!registry.apply_update(STATION_COUNT, "X", "http://x"));
    }
}

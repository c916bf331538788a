//! Fixed-slot preset codec and the persistence contract.
//!
//! The persistent region is five consecutive `(32-byte name, 128-byte url)`
//! slots with no header, version tag, or checksum; the layout only promises
//! stable field ordering and a total capacity of [`REGION_LEN`] bytes.

use crate::registry::StationRegistry;
use crate::station::{
    NAME_FIELD_LEN, REGION_LEN, SLOT_LEN, STATION_COUNT, Station, truncated,
};

/// Never-written flash reads back as this; treated as a string terminator so
/// erased media decodes to empty stations rather than garbage.
pub const ERASED_BYTE: u8 = 0xFF;

/// Abstract preset persistence backend.
pub trait PresetStore {
    type Error;

    fn load(&mut self) -> Result<StationRegistry, Self::Error>;
    fn save(&mut self, registry: &StationRegistry) -> Result<(), Self::Error>;

    /// Recovery-only: zero-fill the whole region and commit. Never called
    /// from the control loop.
    fn erase(&mut self) -> Result<(), Self::Error>;
}

/// A missing backend loads defaults and drops saves, so the firmware can run
/// with volatile presets when storage fails to initialise.
impl<T: PresetStore> PresetStore for Option<T> {
    type Error = T::Error;

    fn load(&mut self) -> Result<StationRegistry, Self::Error> {
        match self {
            Some(store) => store.load(),
            None => Ok(StationRegistry::new()),
        }
    }

    fn save(&mut self, registry: &StationRegistry) -> Result<(), Self::Error> {
        match self {
            Some(store) => store.save(registry),
            None => Ok(()),
        }
    }

    fn erase(&mut self) -> Result<(), Self::Error> {
        match self {
            Some(store) => store.erase(),
            None => Ok(()),
        }
    }
}

/// Serialises the registry into the flat slot layout. Each field gets up to
/// `capacity - 1` text bytes, one zero terminator, and zero-fill to the end
/// of the field so no stale bytes survive a shorter value.
pub fn encode_region(registry: &StationRegistry, region: &mut [u8; REGION_LEN]) {
    for (i, station) in registry.iter().enumerate() {
        let slot = &mut region[i * SLOT_LEN..(i + 1) * SLOT_LEN];
        let (name_field, url_field) = slot.split_at_mut(NAME_FIELD_LEN);
        encode_field(name_field, station.name.as_bytes());
        encode_field(url_field, station.url.as_bytes());
    }
}

fn encode_field(field: &mut [u8], text: &[u8]) {
    let len = text.len().min(field.len() - 1);
    field[..len].copy_from_slice(&text[..len]);
    field[len..].fill(0);
}

/// Deserialises a region image. Cannot fail: each sub-field is scanned up to
/// its capacity and stops at the first zero or [`ERASED_BYTE`]; bytes that do
/// not form UTF-8 decode to an empty string.
pub fn decode_region(region: &[u8; REGION_LEN]) -> StationRegistry {
    let mut registry = StationRegistry::new();
    for i in 0..STATION_COUNT {
        let slot = &region[i * SLOT_LEN..(i + 1) * SLOT_LEN];
        let (name_field, url_field) = slot.split_at(NAME_FIELD_LEN);
        registry.set_station(
            i,
            Station {
                name: decode_field(name_field),
                url: decode_field(url_field),
            },
        );
    }
    registry
}

fn decode_field<const N: usize>(field: &[u8]) -> heapless::String<N> {
    let stop = field
        .iter()
        .position(|b| *b == 0 || *b == ERASED_BYTE)
        .unwrap_or(field.len());
    match core::str::from_utf8(&field[..stop]) {
        Ok(text) => truncated(text),
        Err(_) => heapless::String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::{NAME_TEXT_MAX, URL_TEXT_MAX};

    fn registry_with(entries: &[(usize, &str, &str)]) -> StationRegistry {
        let mut registry = StationRegistry::new();
        for (index, name, url) in entries {
            assert!(registry.apply_update(*index, name, url));
        }
        registry
    }

    #[test]
    fn round_trip_preserves_all_slots() {
        let registry = registry_with(&[
            (0, "Jazz", "http://a.fm/stream"),
            (2, "News 24", "http://news.example:8000/live"),
            (4, "Chill", "http://chill.example/lo-fi"),
        ]);

        let mut region = [ERASED_BYTE; REGION_LEN];
        encode_region(&registry, &mut region);
        assert_eq!(decode_region(&region), registry);
    }

    #[test]
    fn oversized_name_survives_as_first_31_bytes() {
        let long = "n".repeat(40);
        let registry = registry_with(&[(0, &long, "http://x")]);

        let mut region = [0u8; REGION_LEN];
        encode_region(&registry, &mut region);
        let reloaded = decode_region(&region);

        let name = &reloaded.station(0).unwrap().name;
        assert_eq!(name.len(), NAME_TEXT_MAX);
        assert_eq!(name.as_str(), &long[..NAME_TEXT_MAX]);
    }

    #[test]
    fn erased_region_decodes_to_empty_stations() {
        let region = [ERASED_BYTE; REGION_LEN];
        let registry = decode_region(&region);
        assert!(registry.iter().all(Station::is_unset));
    }

    #[test]
    fn zeroed_region_decodes_to_empty_stations() {
        let region = [0u8; REGION_LEN];
        assert!(decode_region(&region).iter().all(Station::is_unset));
    }

    #[test]
    fn shorter_value_leaves_no_stale_bytes() {
        let long_url = "u".repeat(URL_TEXT_MAX);
        let mut region = [ERASED_BYTE; REGION_LEN];
        encode_region(&registry_with(&[(1, "A", &long_url)]), &mut region);

        // Re-encode the same slot with a short url into the same image.
        encode_region(&registry_with(&[(1, "A", "http://s")]), &mut region);
        let reloaded = decode_region(&region);
        assert_eq!(reloaded.station(1).unwrap().url.as_str(), "http://s");
    }

    #[test]
    fn foreign_field_without_terminator_is_clamped() {
        // A full 32-byte name field written by other firmware: no terminator
        // anywhere, so the scan runs to capacity and the text is clamped to
        // what a Station can hold.
        let mut region = [0u8; REGION_LEN];
        region[..NAME_FIELD_LEN].fill(b'q');
        let registry = decode_region(&region);
        assert_eq!(registry.station(0).unwrap().name.len(), NAME_TEXT_MAX);
    }
}

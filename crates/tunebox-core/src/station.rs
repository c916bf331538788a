//! Station records and the bounded text they carry.

pub const STATION_COUNT: usize = 5;

/// On-flash field widths, terminator byte included.
pub const NAME_FIELD_LEN: usize = 32;
pub const URL_FIELD_LEN: usize = 128;

pub const SLOT_LEN: usize = NAME_FIELD_LEN + URL_FIELD_LEN;
pub const REGION_LEN: usize = STATION_COUNT * SLOT_LEN;

/// Longest text a field can hold once the terminator is accounted for.
pub const NAME_TEXT_MAX: usize = NAME_FIELD_LEN - 1;
pub const URL_TEXT_MAX: usize = URL_FIELD_LEN - 1;

pub type StationName = heapless::String<NAME_TEXT_MAX>;
pub type StationUrl = heapless::String<URL_TEXT_MAX>;

/// One preset slot. Empty strings are the valid "unset" value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Station {
    pub name: StationName,
    pub url: StationUrl,
}

impl Station {
    pub fn is_unset(&self) -> bool {
        self.name.is_empty() && self.url.is_empty()
    }
}

/// Copies at most `N` bytes of `text`, backing off to a char boundary so the
/// result stays valid UTF-8. Truncation is silent.
pub(crate) fn truncated<const N: usize>(text: &str) -> heapless::String<N> {
    let mut end = text.len().min(N);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = heapless::String::new();
    let _ = out.push_str(&text[..end]);
    out
}

/// Save-time normalisation: trim surrounding whitespace, then truncate.
pub fn sanitized<const N: usize>(raw: &str) -> heapless::String<N> {
    truncated(raw.trim())
}

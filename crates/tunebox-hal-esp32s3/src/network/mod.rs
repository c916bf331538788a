//! Wi-Fi link state shared between the connection task and the control loop.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl LinkState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Wi-Fi credentials source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

impl WifiConfig {
    pub const fn new(ssid: &'static str, password: &'static str) -> Self {
        Self { ssid, password }
    }
}

/// Immutable link snapshot for the display and control loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkSnapshot {
    pub state: LinkState,
    pub ipv4: Option<[u8; 4]>,
    pub revision: u32,
}

impl LinkSnapshot {
    pub const fn is_online(&self) -> bool {
        matches!(self.state, LinkState::Connected) && self.ipv4.is_some()
    }
}

/// Lock-free shared link status.
#[derive(Debug)]
pub struct ConnectivityHandle {
    state: AtomicU8,
    ipv4: AtomicU32,
    has_ipv4: AtomicBool,
    revision: AtomicU32,
}

impl ConnectivityHandle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(LinkState::Disconnected as u8),
            ipv4: AtomicU32::new(0),
            has_ipv4: AtomicBool::new(false),
            revision: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let ipv4 = self
            .has_ipv4
            .load(Ordering::Acquire)
            .then(|| self.ipv4.load(Ordering::Acquire).to_be_bytes());
        LinkSnapshot {
            state: LinkState::from_raw(self.state.load(Ordering::Acquire)),
            ipv4,
            revision: self.revision.load(Ordering::Acquire),
        }
    }

    pub fn mark_connecting(&self) {
        let mut changed = self.store_state(LinkState::Connecting);
        changed |= self.store_ipv4(None);
        if changed {
            self.bump_revision();
        }
    }

    pub fn mark_disconnected(&self) {
        let mut changed = self.store_state(LinkState::Disconnected);
        changed |= self.store_ipv4(None);
        if changed {
            self.bump_revision();
        }
    }

    pub fn mark_connected(&self, ipv4: [u8; 4]) {
        let mut changed = self.store_state(LinkState::Connected);
        changed |= self.store_ipv4(Some(ipv4));
        if changed {
            self.bump_revision();
        }
    }

    fn store_state(&self, next: LinkState) -> bool {
        self.state.swap(next as u8, Ordering::AcqRel) != next as u8
    }

    fn store_ipv4(&self, next: Option<[u8; 4]>) -> bool {
        let (addr, present) = match next {
            Some(octets) => (u32::from_be_bytes(octets), true),
            None => (0, false),
        };
        let prev_addr = self.ipv4.swap(addr, Ordering::AcqRel);
        let prev_present = self.has_ipv4.swap(present, Ordering::AcqRel);
        prev_addr != addr || prev_present != present
    }

    fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for ConnectivityHandle {
    fn default() -> Self {
        Self::new()
    }
}

//! Status display projection.

/// The four things the appliance ever shows. Rendering replaces the whole
/// frame; the last view persists until the next call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusView<'a> {
    Booting,
    Connecting,
    Online { ip: [u8; 4] },
    NowPlaying { name: &'a str },
}

/// Passive sink driven by boot and the playback path. Implementations clear
/// prior content before drawing; they hold no state beyond one frame.
pub trait StatusSink {
    type Error;

    fn show(&mut self, view: StatusView<'_>) -> Result<(), Self::Error>;
}

/// Display init failure must not block booting: a missing sink accepts every
/// view and drops it.
impl<S: StatusSink> StatusSink for Option<S> {
    type Error = S::Error;

    fn show(&mut self, view: StatusView<'_>) -> Result<(), Self::Error> {
        match self {
            Some(sink) => sink.show(view),
            None => Ok(()),
        }
    }
}

//! Station selection and playback over an abstract audio pipeline.

use log::{info, warn};

use crate::registry::StationRegistry;
use crate::station::STATION_COUNT;
use crate::status::{StatusSink, StatusView};

/// Volume scale carried over from the codec board: 0 (mute) to 21.
pub const MAX_VOLUME: u8 = 21;
pub const DEFAULT_VOLUME: u8 = 20;

/// Call contract of the audio collaborator. `stop` is idempotent; `connect`
/// pre-empts whatever was playing; `advance` moves the stream forward by one
/// cooperative tick and is called once per control-loop iteration.
#[allow(async_fn_in_trait)]
pub trait AudioPipeline {
    type Error;

    fn stop(&mut self);
    async fn connect(&mut self, url: &str) -> Result<(), Self::Error>;
    fn set_volume(&mut self, level: u8);
    async fn advance(&mut self) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlayError<E> {
    /// Index outside the registry. Nothing stopped or started.
    BadIndex,
    /// The slot has no url. Nothing stopped or started.
    EmptyUrl,
    Pipeline(E),
}

/// Tracks which preset is currently requested for playback. `None` means
/// nothing has been played since boot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlaybackController {
    current: Option<u8>,
}

impl PlaybackController {
    pub const fn new() -> Self {
        Self { current: None }
    }

    pub const fn current_station(&self) -> Option<u8> {
        self.current
    }

    /// Validates the index, stops any in-flight stream, connects the new one,
    /// and mirrors the station name on the status display. Validation
    /// failures are reported, never fatal, and leave playback untouched.
    pub async fn play<P, S>(
        &mut self,
        index: i32,
        registry: &StationRegistry,
        pipeline: &mut P,
        status: &mut S,
    ) -> Result<(), PlayError<P::Error>>
    where
        P: AudioPipeline,
        S: StatusSink,
    {
        let slot = usize::try_from(index)
            .ok()
            .filter(|i| *i < STATION_COUNT)
            .ok_or_else(|| {
                warn!("invalid station index {}", index);
                PlayError::BadIndex
            })?;

        let station = registry.station(slot).ok_or(PlayError::BadIndex)?;
        if station.url.is_empty() {
            warn!("station {} has no url; not playing", slot);
            return Err(PlayError::EmptyUrl);
        }

        info!("playing station {}: {}", slot, station.url);
        pipeline.stop();
        pipeline
            .connect(station.url.as_str())
            .await
            .map_err(PlayError::Pipeline)?;

        if status
            .show(StatusView::NowPlaying {
                name: station.name.as_str(),
            })
            .is_err()
        {
            warn!("status display update failed");
        }

        self.current = Some(slot as u8);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::{PipelineCall, RecordingPipeline, RecordingStatus, run};
    use super::*;

    fn registry_with_station_2() -> StationRegistry {
        let mut registry = StationRegistry::new();
        assert!(registry.apply_update(2, "Two", "http://x/y"));
        registry
    }

    #[test]
    fn play_success_stops_then_connects_then_tracks() {
        let registry = registry_with_station_2();
        let mut pipeline = RecordingPipeline::default();
        let mut status = RecordingStatus::default();
        let mut controller = PlaybackController::new();

        let result = run(controller.play(2, &registry, &mut pipeline, &mut status));

        assert_eq!(result, Ok(()));
        assert_eq!(
            pipeline.calls,
            vec![
                PipelineCall::Stop,
                PipelineCall::Connect("http://x/y".into())
            ]
        );
        assert_eq!(controller.current_station(), Some(2));
        assert_eq!(status.lines, vec!["playing Two".to_string()]);
    }

    #[test]
    fn invalid_targets_touch_nothing() {
        let registry = registry_with_station_2();
        let mut pipeline = RecordingPipeline::default();
        let mut status = RecordingStatus::default();
        let mut controller = PlaybackController::new();

        for (index, expected) in [
            (-1, PlayError::BadIndex),
            (5, PlayError::BadIndex),
            (0, PlayError::EmptyUrl), // slot 0 was never filled in
        ] {
            let result = run(controller.play(index, &registry, &mut pipeline, &mut status));
            assert_eq!(result, Err(expected));
        }

        assert!(pipeline.calls.is_empty());
        assert!(status.lines.is_empty());
        assert_eq!(controller.current_station(), None);
    }

    #[test]
    fn second_play_preempts_the_first() {
        let mut registry = registry_with_station_2();
        assert!(registry.apply_update(0, "Zero", "http://z"));
        let mut pipeline = RecordingPipeline::default();
        let mut status = RecordingStatus::default();
        let mut controller = PlaybackController::new();

        run(controller.play(2, &registry, &mut pipeline, &mut status)).unwrap();
        run(controller.play(0, &registry, &mut pipeline, &mut status)).unwrap();

        assert_eq!(controller.current_station(), Some(0));
        assert_eq!(
            pipeline.calls,
            vec![
                PipelineCall::Stop,
                PipelineCall::Connect("http://x/y".into()),
                PipelineCall::Stop,
                PipelineCall::Connect("http://z".into()),
            ]
        );
    }

    #[test]
    fn failed_connect_keeps_previous_selection() {
        let registry = registry_with_station_2();
        let mut pipeline = RecordingPipeline {
            fail_connect: true,
            ..Default::default()
        };
        let mut status = RecordingStatus::default();
        let mut controller = PlaybackController::new();

        let result = run(controller.play(2, &registry, &mut pipeline, &mut status));
        assert_eq!(result, Err(PlayError::Pipeline(())));
        assert_eq!(controller.current_station(), None);
        assert!(status.lines.is_empty());
    }
}

use super::*;
use crate::player::mock::{PipelineCall, RecordingPipeline, RecordingStatus, run};

/// Counts commits instead of writing anywhere.
#[derive(Debug, Default)]
struct CountingStore {
    commits: usize,
    erasures: usize,
}

impl PresetStore for CountingStore {
    type Error = core::convert::Infallible;

    fn load(&mut self) -> Result<StationRegistry, Self::Error> {
        Ok(StationRegistry::new())
    }

    fn save(&mut self, _registry: &StationRegistry) -> Result<(), Self::Error> {
        self.commits += 1;
        Ok(())
    }

    fn erase(&mut self) -> Result<(), Self::Error> {
        self.erasures += 1;
        Ok(())
    }
}

struct Harness {
    registry: StationRegistry,
    controller: PlaybackController,
    store: CountingStore,
    pipeline: RecordingPipeline,
    status: RecordingStatus,
}

impl Harness {
    fn new() -> Self {
        Self {
            registry: StationRegistry::new(),
            controller: PlaybackController::new(),
            store: CountingStore::default(),
            pipeline: RecordingPipeline::default(),
            status: RecordingStatus::default(),
        }
    }

    fn request(&mut self, raw: &str) -> Response {
        let request = Request::parse(raw).expect("request should parse");
        run(dispatch(
            &request,
            &mut self.registry,
            &mut self.controller,
            &mut self.store,
            &mut self.pipeline,
            &mut self.status,
        ))
    }
}

fn post_save(body: &str) -> String {
    format!(
        "POST /save HTTP/1.1\r\nHost: tunebox\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

#[test]
fn parse_splits_target_and_body() {
    let request = Request::parse("GET /play?idx=3 HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/play");
    assert_eq!(request.query, "idx=3");
    assert_eq!(request.body, "");
}

#[test]
fn save_then_render_shows_the_new_value() {
    let mut harness = Harness::new();

    let response = harness.request(&post_save("name0=Jazz&url0=http%3A%2F%2Fa.fm"));
    assert_eq!(response.status, Status::SeeOther);
    assert_eq!(response.location, Some("/"));
    assert_eq!(harness.store.commits, 1);

    let response = harness.request("GET / HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, Status::Ok);
    assert!(response.body.contains("value='Jazz'"));
    assert!(response.body.contains("value='http://a.fm'"));
}

#[test]
fn identical_save_commits_nothing() {
    let mut harness = Harness::new();
    let raw = post_save("name0=Jazz&url0=http%3A%2F%2Fa.fm");

    harness.request(&raw);
    harness.request(&raw);
    assert_eq!(harness.store.commits, 1);
}

#[test]
fn multi_slot_save_is_a_single_commit() {
    let mut harness = Harness::new();

    harness.request(&post_save(
        "name0=One&url0=http%3A%2F%2Fone&name3=Three&url3=http%3A%2F%2Fthree",
    ));
    assert_eq!(harness.store.commits, 1);
    assert_eq!(harness.registry.station(0).unwrap().name.as_str(), "One");
    assert_eq!(harness.registry.station(3).unwrap().name.as_str(), "Three");
}

#[test]
fn half_submitted_pair_is_left_untouched() {
    let mut harness = Harness::new();

    let response = harness.request(&post_save("name2=Lonely"));
    assert_eq!(response.status, Status::SeeOther);
    assert_eq!(harness.store.commits, 0);
    assert!(harness.registry.station(2).unwrap().is_unset());
}

#[test]
fn play_without_idx_is_rejected() {
    let mut harness = Harness::new();

    let response = harness.request("GET /play HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, Status::BadRequest);
    assert_eq!(harness.controller.current_station(), None);
    assert!(harness.pipeline.calls.is_empty());
}

#[test]
fn play_with_non_numeric_idx_is_rejected() {
    let mut harness = Harness::new();

    let response = harness.request("GET /play?idx=two HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, Status::BadRequest);
    assert!(harness.pipeline.calls.is_empty());
}

#[test]
fn play_round_trip_starts_the_stream() {
    let mut harness = Harness::new();
    harness.request(&post_save("name1=News&url1=http%3A%2F%2Fn.fm%2Flive"));

    let response = harness.request("GET /play?idx=1 HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, Status::Ok);
    assert!(response.body.contains("Playing station 2."));
    assert_eq!(
        harness.pipeline.calls,
        vec![
            PipelineCall::Stop,
            PipelineCall::Connect("http://n.fm/live".into())
        ]
    );
    assert_eq!(harness.controller.current_station(), Some(1));
}

#[test]
fn play_of_empty_slot_acknowledges_without_playing() {
    let mut harness = Harness::new();

    let response = harness.request("GET /play?idx=4 HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, Status::Ok);
    assert!(response.body.contains("not playable"));
    assert!(harness.pipeline.calls.is_empty());
    assert_eq!(harness.controller.current_station(), None);
}

#[test]
fn unknown_routes_get_404() {
    let mut harness = Harness::new();
    let response = harness.request("GET /admin HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, Status::NotFound);

    let response = harness.request("PUT / HTTP/1.1\r\n\r\n");
    assert_eq!(response.status, Status::NotFound);
}

#[test]
fn response_head_serialises_headers() {
    let response = Response::redirect_to_root();
    let mut head: heapless::String<256> = heapless::String::new();
    response.write_head(&mut head).unwrap();
    assert!(head.starts_with("HTTP/1.1 303 See Other\r\n"));
    assert!(head.contains("Location: /\r\n"));
    assert!(head.contains("Content-Length: 0\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
}

//! The web surface: request model, routing, and the save/play handlers.
//!
//! Handlers never touch sockets. The control loop reads one request into a
//! buffer, calls [`dispatch`], and writes the returned [`Response`] back out.

pub mod form;
pub mod html;

use core::fmt::{Debug, Write};

use log::{error, info, warn};

use crate::player::{AudioPipeline, PlaybackController};
use crate::presets::PresetStore;
use crate::registry::StationRegistry;
use crate::station::STATION_COUNT;
use crate::status::StatusSink;

pub use html::{PAGE_LEN, Page};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Request<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub body: &'a str,
}

impl<'a> Request<'a> {
    /// Splits one raw HTTP request into method, path, query, and body. Header
    /// fields other than the request line are not interpreted.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
        let request_line = head.lines().next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Some(Self {
            method,
            path,
            query,
            body,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Ok,
    SeeOther,
    BadRequest,
    NotFound,
    Internal,
}

impl Status {
    pub const fn line(self) -> &'static str {
        match self {
            Self::Ok => "HTTP/1.1 200 OK\r\n",
            Self::SeeOther => "HTTP/1.1 303 See Other\r\n",
            Self::BadRequest => "HTTP/1.1 400 Bad Request\r\n",
            Self::NotFound => "HTTP/1.1 404 Not Found\r\n",
            Self::Internal => "HTTP/1.1 500 Internal Server Error\r\n",
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub content_type: &'static str,
    pub location: Option<&'static str>,
    pub body: Page,
}

impl Response {
    fn html(status: Status, body: Page) -> Self {
        Self {
            status,
            content_type: "text/html; charset=utf-8",
            location: None,
            body,
        }
    }

    fn text(status: Status, body: &str) -> Self {
        let mut page = Page::new();
        let _ = page.push_str(body);
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            location: None,
            body: page,
        }
    }

    fn redirect_to_root() -> Self {
        Self {
            status: Status::SeeOther,
            content_type: "text/plain; charset=utf-8",
            location: Some("/"),
            body: Page::new(),
        }
    }

    /// Serialises status line, headers, and blank line into `out`; the body
    /// follows separately so the caller can write it straight to the socket.
    pub fn write_head<const N: usize>(
        &self,
        out: &mut heapless::String<N>,
    ) -> Result<(), core::fmt::Error> {
        out.push_str(self.status.line()).map_err(|_| core::fmt::Error)?;
        write!(out, "Content-Type: {}\r\n", self.content_type)?;
        write!(out, "Content-Length: {}\r\n", self.body.len())?;
        if let Some(location) = self.location {
            write!(out, "Location: {location}\r\n")?;
        }
        out.push_str("Connection: close\r\n\r\n")
            .map_err(|_| core::fmt::Error)
    }
}

/// Routes one parsed request. Owns no state: the registry, controller, and
/// collaborators are the single-owner state threaded in by the control loop.
pub async fn dispatch<ST, P, S>(
    request: &Request<'_>,
    registry: &mut StationRegistry,
    controller: &mut PlaybackController,
    store: &mut ST,
    pipeline: &mut P,
    status: &mut S,
) -> Response
where
    ST: PresetStore,
    ST::Error: Debug,
    P: AudioPipeline,
    S: StatusSink,
{
    match (request.method, request.path) {
        ("GET", "/") => render_root(registry),
        ("POST", "/save") => handle_save(request.body, registry, store),
        ("GET", "/play") => handle_play(request.query, registry, controller, pipeline, status).await,
        _ => Response::text(Status::NotFound, "Not Found"),
    }
}

fn render_root(registry: &StationRegistry) -> Response {
    match html::render_root(registry) {
        Ok(page) => Response::html(Status::Ok, page),
        Err(_) => Response::text(Status::Internal, "page render failed"),
    }
}

/// Applies every fully-paired `name{i}`/`url{i}` field, then commits the
/// registry at most once. Indices missing either field are left untouched.
fn handle_save<ST>(body: &str, registry: &mut StationRegistry, store: &mut ST) -> Response
where
    ST: PresetStore,
    ST::Error: Debug,
{
    info!("saving stations from form");
    let mut changed = false;

    for i in 0..STATION_COUNT {
        let mut name_key: heapless::String<8> = heapless::String::new();
        let mut url_key: heapless::String<8> = heapless::String::new();
        let _ = write!(name_key, "name{i}");
        let _ = write!(url_key, "url{i}");

        let name = form::field::<256>(body, &name_key);
        let url = form::field::<256>(body, &url_key);
        if let (Some(name), Some(url)) = (name, url) {
            changed |= registry.apply_update(i, &name, &url);
        }
    }

    if changed {
        // Write failures are not recoverable here; log and keep the in-memory
        // registry as the truth until the next commit attempt.
        if let Err(err) = store.save(registry) {
            error!("preset commit failed: {:?}", err);
        }
    }

    Response::redirect_to_root()
}

async fn handle_play<P, S>(
    query: &str,
    registry: &StationRegistry,
    controller: &mut PlaybackController,
    pipeline: &mut P,
    status: &mut S,
) -> Response
where
    P: AudioPipeline,
    S: StatusSink,
{
    let Some(raw) = form::field::<16>(query, "idx") else {
        return Response::text(Status::BadRequest, "missing idx parameter");
    };
    // Non-numeric input is rejected outright rather than read as zero.
    let Ok(index) = raw.parse::<i32>() else {
        warn!("unparseable idx '{}'", raw);
        return Response::text(Status::BadRequest, "idx must be an integer");
    };

    let started = controller
        .play(index, registry, pipeline, status)
        .await
        .is_ok();

    match html::render_play_ack(index, started) {
        Ok(page) => Response::html(Status::Ok, page),
        Err(_) => Response::text(Status::Internal, "page render failed"),
    }
}

#[cfg(test)]
mod tests;

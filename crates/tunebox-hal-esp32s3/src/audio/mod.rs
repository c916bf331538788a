//! Audio stream pipeline: HTTP stream in over TCP, PCM out to a sink.
//!
//! Codec work stays outside this crate; the pipeline moves raw stream bytes
//! into the sink one bounded chunk per `advance` tick, applying the volume
//! attenuation on the way through.

pub mod i2s_out;

use core::fmt::Write as _;
use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_time::{Duration, with_timeout};
use embedded_io_async::Write as _;
use log::{info, warn};
use tunebox_core::player::{AudioPipeline, MAX_VOLUME};
use tunebox_core::station::URL_TEXT_MAX;

const STREAM_CHUNK_BYTES: usize = 1024;
const MAX_HEADER_BYTES: usize = 4096;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const ADVANCE_POLL_MS: u64 = 20;

/// Consumes decoded/raw sample bytes; the board side is an I2S DMA writer.
pub trait PcmSink {
    type Error;

    fn write(&mut self, samples: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineError {
    BadUrl,
    Dns,
    Connect,
    Request,
    Headers,
    Stream,
    Sink,
}

/// `http://host[:port]/path` split into its connectable parts.
#[derive(Clone, Debug, Eq, PartialEq)]
struct StreamTarget {
    host: heapless::String<64>,
    port: u16,
    path: heapless::String<URL_TEXT_MAX>,
}

impl StreamTarget {
    fn parse(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("http://")?;
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (authority, 80),
        };
        if host.is_empty() {
            return None;
        }

        let mut target = Self {
            host: heapless::String::new(),
            port,
            path: heapless::String::new(),
        };
        target.host.push_str(host).ok()?;
        target.path.push('/').ok()?;
        target.path.push_str(path).ok()?;
        Some(target)
    }
}

/// One TCP stream feeding one sink. A second `connect` pre-empts the first;
/// `stop` is idempotent.
pub struct StreamPipeline<'d, S: PcmSink> {
    stack: Stack<'d>,
    socket: TcpSocket<'d>,
    sink: S,
    volume: u8,
    streaming: bool,
    chunk: [u8; STREAM_CHUNK_BYTES],
}

impl<'d, S: PcmSink> StreamPipeline<'d, S> {
    pub fn new(
        stack: Stack<'d>,
        rx_buffer: &'d mut [u8],
        tx_buffer: &'d mut [u8],
        sink: S,
    ) -> Self {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(CONNECT_TIMEOUT_SECS)));
        Self {
            stack,
            socket,
            sink,
            volume: MAX_VOLUME,
            streaming: false,
            chunk: [0; STREAM_CHUNK_BYTES],
        }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddress, PipelineError> {
        if let Ok(literal) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddress::from(literal));
        }
        let addresses = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|_| PipelineError::Dns)?;
        addresses.first().copied().ok_or(PipelineError::Dns)
    }

    async fn send_request(&mut self, target: &StreamTarget) -> Result<(), PipelineError> {
        let mut request: heapless::String<256> = heapless::String::new();
        write!(
            request,
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            target.path, target.host
        )
        .map_err(|_| PipelineError::Request)?;
        self.socket
            .write_all(request.as_bytes())
            .await
            .map_err(|_| PipelineError::Request)
    }

    /// Discards the response status line and headers; stream bytes that
    /// arrive in the same read as the blank line go straight to the sink.
    async fn skip_headers(&mut self) -> Result<(), PipelineError> {
        let mut matched = 0usize;
        let mut scanned = 0usize;

        loop {
            let n = self
                .socket
                .read(&mut self.chunk)
                .await
                .map_err(|_| PipelineError::Headers)?;
            if n == 0 {
                return Err(PipelineError::Headers);
            }

            for i in 0..n {
                matched = match (matched, self.chunk[i]) {
                    (0, b'\r') | (2, b'\r') => matched + 1,
                    (1, b'\n') | (3, b'\n') => matched + 1,
                    (_, b'\r') => 1,
                    _ => 0,
                };
                if matched == 4 {
                    if i + 1 < n {
                        let mut rest = [0u8; STREAM_CHUNK_BYTES];
                        let len = n - i - 1;
                        rest[..len].copy_from_slice(&self.chunk[i + 1..n]);
                        self.push_samples(&mut rest[..len])?;
                    }
                    return Ok(());
                }
            }

            scanned += n;
            if scanned > MAX_HEADER_BYTES {
                return Err(PipelineError::Headers);
            }
        }
    }

    fn push_samples(&mut self, samples: &mut [u8]) -> Result<(), PipelineError> {
        attenuate(samples, self.volume);
        if self.sink.write(samples).is_err() {
            warn!("pcm sink rejected {} bytes", samples.len());
            return Err(PipelineError::Sink);
        }
        Ok(())
    }
}

impl<S: PcmSink> AudioPipeline for StreamPipeline<'_, S> {
    type Error = PipelineError;

    fn stop(&mut self) {
        if self.streaming {
            self.socket.abort();
            self.streaming = false;
            info!("stream stopped");
        }
    }

    async fn connect(&mut self, url: &str) -> Result<(), PipelineError> {
        self.stop();

        let target = StreamTarget::parse(url).ok_or(PipelineError::BadUrl)?;
        let address = self.resolve(&target.host).await?;
        info!("connecting to {}:{}", target.host, target.port);

        self.socket
            .connect((address, target.port))
            .await
            .map_err(|_| PipelineError::Connect)?;
        self.send_request(&target).await?;
        self.skip_headers().await?;

        self.streaming = true;
        Ok(())
    }

    fn set_volume(&mut self, level: u8) {
        self.volume = level.min(MAX_VOLUME);
    }

    /// One cooperative tick: move at most one chunk of stream bytes to the
    /// sink. A tick with nothing buffered is a no-op, not an error.
    async fn advance(&mut self) -> Result<(), PipelineError> {
        if !self.streaming {
            return Ok(());
        }

        let read = with_timeout(
            Duration::from_millis(ADVANCE_POLL_MS),
            self.socket.read(&mut self.chunk),
        )
        .await;

        match read {
            Err(_) => Ok(()),
            Ok(Ok(0)) => {
                info!("stream ended by remote");
                self.stop();
                Ok(())
            }
            Ok(Ok(n)) => {
                let mut samples = [0u8; STREAM_CHUNK_BYTES];
                samples[..n].copy_from_slice(&self.chunk[..n]);
                self.push_samples(&mut samples[..n])
            }
            Ok(Err(_)) => {
                self.stop();
                Err(PipelineError::Stream)
            }
        }
    }
}

/// Fixed-point gain on 16-bit little-endian samples, 0..=21 scale.
fn attenuate(samples: &mut [u8], volume: u8) {
    if volume >= MAX_VOLUME {
        return;
    }
    for pair in samples.chunks_exact_mut(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as i32;
        let scaled = (sample * volume as i32 / MAX_VOLUME as i32) as i16;
        pair.copy_from_slice(&scaled.to_le_bytes());
    }
}

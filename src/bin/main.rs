#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::fmt::Debug;

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::{Stack, tcp::TcpSocket};
use embassy_time::{Duration as EmbassyDuration, Timer, WithTimeout};
use embedded_io_async::Write as _;
use esp_hal::{
    clock::CpuClock,
    dma_buffers,
    i2c::master::{Config as I2cConfig, I2c},
    i2s::master::{DataFormat, I2s, Standard},
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{LevelFilter, info, warn};
use static_cell::StaticCell;
use tunebox_core::{
    player::{AudioPipeline, DEFAULT_VOLUME, PlaybackController},
    presets::PresetStore,
    registry::StationRegistry,
    status::{StatusSink, StatusView},
    web::{Request, dispatch},
};
use tunebox_hal_esp32s3::{
    audio::{StreamPipeline, i2s_out::I2sOutput},
    network::{ConnectivityHandle, WifiConfig},
    platform::display::OledStatus,
    storage::flash_presets::FlashPresetStore,
};

const HTTP_PORT: u16 = 80;
const HTTP_RX_BYTES: usize = 2048;
const HTTP_TX_BYTES: usize = 4096;
const REQUEST_BUF_BYTES: usize = 2048;
const RESPONSE_HEAD_BYTES: usize = 256;
const HTTP_SOCKET_TIMEOUT_SECS: u64 = 10;
const STREAM_RX_BYTES: usize = 4096;
const STREAM_TX_BYTES: usize = 1024;
const I2S_DMA_TX_BYTES: usize = 4096;
const AUDIO_SAMPLE_RATE_HZ: u32 = 44_100;
const AUDIO_TICK_INTERVAL_MS: u64 = 5;
const LINK_POLL_INTERVAL_MS: u64 = 250;
const WIFI_RETRY_BACKOFF_MIN_SECS: u64 = 2;
const WIFI_RETRY_BACKOFF_MAX_SECS: u64 = 120;
const NETWORK_POLL_INTERVAL_MS: u64 = 500;
const DHCP_TIMEOUT_SECS: u64 = 15;

const WIFI_SSID: &str = env!(
    "TUNEBOX_WIFI_SSID",
    "Set TUNEBOX_WIFI_SSID in your environment before building/flashing."
);
const WIFI_PASSWORD: &str = env!(
    "TUNEBOX_WIFI_PASSWORD",
    "Set TUNEBOX_WIFI_PASSWORD in your environment before building/flashing."
);
const WIFI_CONFIG: WifiConfig = WifiConfig::new(WIFI_SSID, WIFI_PASSWORD);

static CONNECTIVITY: ConnectivityHandle = ConnectivityHandle::new();
static NET_RESOURCES: StaticCell<embassy_net::StackResources<4>> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

fn wifi_retry_backoff_secs(consecutive_failures: u32) -> u64 {
    // 2, 4, 8, 16, 32, 64, 120, 120, ...
    let shift = consecutive_failures.min(6);
    WIFI_RETRY_BACKOFF_MIN_SECS
        .saturating_mul(1u64 << shift)
        .min(WIFI_RETRY_BACKOFF_MAX_SECS)
}

async fn wait_before_wifi_retry(consecutive_failures: &mut u32) {
    let delay_secs = wifi_retry_backoff_secs(*consecutive_failures);
    *consecutive_failures = consecutive_failures.saturating_add(1);
    info!(
        "wifi retrying in {}s (consecutive_failures={})",
        delay_secs, *consecutive_failures
    );
    Timer::after_secs(delay_secs).await;
}

async fn wifi_connection_loop(
    wifi_controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    connectivity: &'static ConnectivityHandle,
) -> ! {
    let mut consecutive_failures = 0u32;

    loop {
        connectivity.mark_connecting();

        if !wifi_controller.is_started().unwrap_or(false) {
            if let Err(err) = wifi_controller.start_async().await {
                info!("wifi start failed: {:?}", err);
                connectivity.mark_disconnected();
                wait_before_wifi_retry(&mut consecutive_failures).await;
                continue;
            }
        }

        if let Err(err) = wifi_controller.connect_async().await {
            info!("wifi connect failed: {:?}", err);
            connectivity.mark_disconnected();
            let _ = wifi_controller.disconnect_async().await;
            wait_before_wifi_retry(&mut consecutive_failures).await;
            continue;
        }

        match stack
            .wait_config_up()
            .with_timeout(EmbassyDuration::from_secs(DHCP_TIMEOUT_SECS))
            .await
        {
            Ok(()) => {
                if let Some(config) = stack.config_v4() {
                    let ip = config.address.address().octets();
                    connectivity.mark_connected(ip);
                    info!(
                        "wifi connected, dhcp ready: {}.{}.{}.{}",
                        ip[0], ip[1], ip[2], ip[3]
                    );
                }
            }
            Err(_) => {
                info!("dhcp timeout; forcing reconnect");
                connectivity.mark_disconnected();
                let _ = wifi_controller.disconnect_async().await;
                wait_before_wifi_retry(&mut consecutive_failures).await;
                continue;
            }
        }

        consecutive_failures = 0;

        loop {
            let link_up = stack.is_link_up();
            let ipv4 = stack.config_v4().map(|config| config.address.address().octets());
            let is_connected = matches!(wifi_controller.is_connected(), Ok(true));

            match ipv4 {
                Some(ip) if link_up && is_connected => connectivity.mark_connected(ip),
                _ => {
                    info!(
                        "wifi state lost (link_up={} has_ipv4={} connected={}); reconnecting",
                        link_up,
                        ipv4.is_some(),
                        is_connected
                    );
                    break;
                }
            }

            Timer::after_millis(NETWORK_POLL_INTERVAL_MS).await;
        }

        connectivity.mark_disconnected();
        let _ = wifi_controller.disconnect_async().await;
        wait_before_wifi_retry(&mut consecutive_failures).await;
    }
}

/// Keeps the stream moving while the listener socket has nothing to accept.
async fn drive_audio<P>(pipeline: &mut P) -> !
where
    P: AudioPipeline,
    P::Error: Debug,
{
    loop {
        if let Err(err) = pipeline.advance().await {
            warn!("audio tick failed: {:?}", err);
        }
        Timer::after_millis(AUDIO_TICK_INTERVAL_MS).await;
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length(head: &[u8]) -> Option<usize> {
    let head = core::str::from_utf8(head).ok()?;
    for line in head.split("\r\n") {
        if let Some((key, value)) = line.split_once(':')
            && key.eq_ignore_ascii_case("content-length")
        {
            return value.trim().parse().ok();
        }
    }
    None
}

/// Reads until the header terminator arrives and, when the request announces
/// a body, until the body is complete. Oversized requests are cut at the
/// buffer boundary and handled with whatever arrived.
async fn read_request(socket: &mut TcpSocket<'_>, buf: &mut [u8]) -> Option<usize> {
    let mut len = 0usize;

    loop {
        if len == buf.len() {
            return Some(len);
        }
        let n = socket.read(&mut buf[len..]).await.ok()?;
        if n == 0 {
            return (len > 0).then_some(len);
        }
        len += n;

        if let Some(header_end) = find_blank_line(&buf[..len]) {
            let body_have = len - (header_end + 4);
            let body_want = content_length(&buf[..header_end]).unwrap_or(0);
            if body_have >= body_want {
                return Some(len);
            }
        }
    }
}

async fn serve_request<ST, P, S>(
    socket: &mut TcpSocket<'_>,
    registry: &mut StationRegistry,
    controller: &mut PlaybackController,
    store: &mut ST,
    pipeline: &mut P,
    status: &mut S,
) where
    ST: PresetStore,
    ST::Error: Debug,
    P: AudioPipeline,
    S: StatusSink,
{
    let mut buf = [0u8; REQUEST_BUF_BYTES];
    let Some(len) = read_request(socket, &mut buf).await else {
        return;
    };
    let Ok(raw) = core::str::from_utf8(&buf[..len]) else {
        warn!("dropping request with non-utf8 bytes");
        return;
    };
    let Some(request) = Request::parse(raw) else {
        warn!("dropping malformed request line");
        return;
    };
    info!("{} {}", request.method, request.path);

    let response = dispatch(&request, registry, controller, store, pipeline, status).await;

    let mut head: heapless::String<RESPONSE_HEAD_BYTES> = heapless::String::new();
    if response.write_head(&mut head).is_err() {
        warn!("response head overflow");
        return;
    }
    if socket.write_all(head.as_bytes()).await.is_err()
        || socket.write_all(response.body.as_bytes()).await.is_err()
    {
        warn!("client went away mid-response");
        return;
    }
    let _ = socket.flush().await;
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: tunebox starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio requires an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // OLED wiring: SDA=GPIO4, SCL=GPIO21
    let i2c = I2c::new(peripherals.I2C0, I2cConfig::default())
        .unwrap()
        .with_sda(peripherals.GPIO4)
        .with_scl(peripherals.GPIO21);

    let mut status = {
        let mut oled = OledStatus::new(i2c);
        match oled.initialize() {
            Ok(()) => Some(oled),
            Err(err) => {
                info!("status display unavailable: {:?}", err);
                None
            }
        }
    };
    if status.show(StatusView::Booting).is_err() {
        info!("status display write failed");
    }

    let mut preset_store = match FlashPresetStore::new() {
        Ok(store) => Some(store),
        Err(err) => {
            info!("preset storage unavailable ({:?}); edits will be volatile", err);
            None
        }
    };

    let mut registry = match preset_store.load() {
        Ok(registry) => registry,
        Err(err) => {
            info!("preset load failed: {:?}; starting with empty slots", err);
            StationRegistry::new()
        }
    };
    for (i, station) in registry.iter().enumerate() {
        info!("station {}: '{}' -> '{}'", i, station.name, station.url);
    }

    // Audio wiring: BCLK=GPIO14, WS=GPIO13, DOUT=GPIO12
    let (_, _, _tx_buffer, tx_descriptors) = dma_buffers!(0, I2S_DMA_TX_BYTES);
    let i2s = I2s::new(
        peripherals.I2S0,
        Standard::Philips,
        DataFormat::Data16Channel16,
        Rate::from_hz(AUDIO_SAMPLE_RATE_HZ),
        peripherals.DMA_CH0,
    );
    let i2s_tx = i2s
        .i2s_tx
        .with_bclk(peripherals.GPIO14)
        .with_ws(peripherals.GPIO13)
        .with_dout(peripherals.GPIO12)
        .build(tx_descriptors);
    let sink = I2sOutput::new(i2s_tx);

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            info!("esp-radio init failed: {:?}", err);
            loop {
                Timer::after_secs(1).await;
            }
        }
    };

    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                info!("wifi peripheral init failed: {:?}", err);
                loop {
                    Timer::after_secs(1).await;
                }
            }
        };

    let client_config = ClientConfig::default()
        .with_ssid(WIFI_CONFIG.ssid.into())
        .with_password(WIFI_CONFIG.password.into());
    let wifi_mode = ModeConfig::Client(client_config);
    if let Err(err) = wifi_controller.set_config(&wifi_mode) {
        info!("wifi mode config failed: {:?}", err);
        loop {
            Timer::after_secs(1).await;
        }
    }

    let stack_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        stack_config,
        NET_RESOURCES.init(embassy_net::StackResources::<4>::new()),
        0x7E63_0A11_42B5_9C08,
    );

    let mut stream_rx = [0u8; STREAM_RX_BYTES];
    let mut stream_tx = [0u8; STREAM_TX_BYTES];
    let mut pipeline = StreamPipeline::new(stack, &mut stream_rx, &mut stream_tx, sink);
    pipeline.set_volume(DEFAULT_VOLUME);

    let mut controller = PlaybackController::new();

    info!("Display pins: SDA=GPIO4 SCL=GPIO21");
    info!("Audio pins: BCLK=GPIO14 WS=GPIO13 DOUT=GPIO12");
    info!(
        "Stations loaded: {} slots, volume={}",
        registry.iter().count(),
        DEFAULT_VOLUME
    );
    info!("Wi-Fi bootstrap configured from env");

    CONNECTIVITY.mark_connecting();

    let net_future = net_runner.run();
    let wifi_future = wifi_connection_loop(&mut wifi_controller, stack, &CONNECTIVITY);
    let control_future = async {
        let mut http_rx = [0u8; HTTP_RX_BYTES];
        let mut http_tx = [0u8; HTTP_TX_BYTES];

        if status.show(StatusView::Connecting).is_err() {
            info!("status display write failed");
        }

        // Boot blocks here until the link is up; the radio page and the
        // stream are both useless without it.
        let ip = loop {
            let snapshot = CONNECTIVITY.snapshot();
            if snapshot.is_online()
                && let Some(ip) = snapshot.ipv4
            {
                break ip;
            }
            Timer::after_millis(LINK_POLL_INTERVAL_MS).await;
        };
        if status.show(StatusView::Online { ip }).is_err() {
            info!("status display write failed");
        }
        info!(
            "http server listening on {}.{}.{}.{}:{}",
            ip[0], ip[1], ip[2], ip[3], HTTP_PORT
        );

        let mut last_link_revision = CONNECTIVITY.snapshot().revision;
        loop {
            let snapshot = CONNECTIVITY.snapshot();
            if snapshot.revision != last_link_revision {
                last_link_revision = snapshot.revision;
                // Leave a now-playing screen alone; the stream keeps its
                // own connection and may outlive a brief link wobble.
                if controller.current_station().is_none() {
                    let view = match snapshot.ipv4 {
                        Some(ip) if snapshot.is_online() => StatusView::Online { ip },
                        _ => StatusView::Connecting,
                    };
                    if status.show(view).is_err() {
                        info!("status display write failed");
                    }
                }
            }

            let mut socket = TcpSocket::new(stack, &mut http_rx, &mut http_tx);
            socket.set_timeout(Some(EmbassyDuration::from_secs(HTTP_SOCKET_TIMEOUT_SECS)));

            // Audio runs as the background half of the race: while nobody
            // connects, the stream is ticked; once a client lands, the
            // request is handled and the loop hands the next tick back.
            let accepted = {
                let audio = drive_audio(&mut pipeline);
                match select(socket.accept(HTTP_PORT), audio).await {
                    Either::First(result) => result,
                    Either::Second(never) => never,
                }
            };

            match accepted {
                Ok(()) => {
                    serve_request(
                        &mut socket,
                        &mut registry,
                        &mut controller,
                        &mut preset_store,
                        &mut pipeline,
                        &mut status,
                    )
                    .await;
                    socket.close();

                    if let Err(err) = pipeline.advance().await {
                        warn!("audio tick failed: {:?}", err);
                    }
                }
                Err(err) => {
                    warn!("accept failed: {:?}", err);
                    socket.abort();
                }
            }
        }
    };

    let _ = embassy_futures::join::join3(net_future, wifi_future, control_future).await;
    unreachable!()
}

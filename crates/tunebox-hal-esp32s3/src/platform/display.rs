//! SSD1306 status panel in terminal mode.

use core::fmt::Write;

use embedded_hal::i2c::I2c;
use ssd1306::mode::TerminalMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};
use tunebox_core::status::{StatusSink, StatusView};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OledError {
    Init,
    Draw,
}

/// Board-level wrapper around the 128x64 I2C OLED. Each `show` call clears
/// the panel and prints the view's lines from the top-left corner.
pub struct OledStatus<I2C> {
    display: Ssd1306<I2CInterface<I2C>, DisplaySize128x64, TerminalMode>,
}

impl<I2C: I2c> OledStatus<I2C> {
    pub fn new(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_terminal_mode();
        Self { display }
    }

    pub fn initialize(&mut self) -> Result<(), OledError> {
        self.display.init().map_err(|_| OledError::Init)?;
        self.display.clear().map_err(|_| OledError::Init)?;
        Ok(())
    }
}

impl<I2C: I2c> StatusSink for OledStatus<I2C> {
    type Error = OledError;

    fn show(&mut self, view: StatusView<'_>) -> Result<(), OledError> {
        self.display.clear().map_err(|_| OledError::Draw)?;

        match view {
            StatusView::Booting => {
                self.display
                    .write_str("Booting...")
                    .map_err(|_| OledError::Draw)?;
            }
            StatusView::Connecting => {
                self.display
                    .write_str("Connecting to WiFi...")
                    .map_err(|_| OledError::Draw)?;
            }
            StatusView::Online { ip } => {
                write!(
                    self.display,
                    "WiFi connected!\n{}.{}.{}.{}",
                    ip[0], ip[1], ip[2], ip[3]
                )
                .map_err(|_| OledError::Draw)?;
            }
            StatusView::NowPlaying { name } => {
                write!(self.display, "Now playing:\n{name}").map_err(|_| OledError::Draw)?;
            }
        }

        Ok(())
    }
}

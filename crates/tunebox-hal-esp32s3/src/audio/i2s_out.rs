//! I2S transmit path for the external DAC.

use esp_hal::Blocking;
use esp_hal::i2s::master::{Error as I2sError, I2sTx};

use super::PcmSink;

/// Pushes sample bytes into the I2S DMA transmit queue.
pub struct I2sOutput<'d> {
    tx: I2sTx<'d, Blocking>,
}

impl<'d> I2sOutput<'d> {
    pub fn new(tx: I2sTx<'d, Blocking>) -> Self {
        Self { tx }
    }
}

impl PcmSink for I2sOutput<'_> {
    type Error = I2sError;

    fn write(&mut self, samples: &[u8]) -> Result<(), I2sError> {
        self.tx.write_bytes(samples)?;
        Ok(())
    }
}

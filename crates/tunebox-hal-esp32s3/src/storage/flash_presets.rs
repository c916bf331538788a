//! Flash-backed preset store.
//!
//! The preset region occupies the last 4 KiB sector of the first writable
//! data partition. The on-flash image is exactly the core codec's flat slot
//! layout; erase-then-write of the whole sector is the commit.

use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use tunebox_core::presets::{PresetStore, decode_region, encode_region};
use tunebox_core::registry::StationRegistry;
use tunebox_core::station::REGION_LEN;

const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashPresetError {
    PartitionTable,
    PresetPartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Unaligned,
    ShortRead,
}

/// ROM-routine flash access. Reads and writes go through 4-byte words; the
/// word window around an unaligned span is widened and masked in software.
#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashPresetError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashPresetError::FlashOpFailed(rc));
        }
        Ok(Self)
    }

    fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashPresetError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashPresetError::Unaligned);
        }
        let rc = unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashPresetError::FlashOpFailed(rc));
        }
        Ok(())
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, FlashPresetError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashPresetError::Unaligned);
        }
        let mut word = 0u32;
        let rc = unsafe { esp_rom_spiflash_read(addr, &mut word as *mut u32 as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashPresetError::FlashOpFailed(rc));
        }
        Ok(word)
    }

    fn write_word(&mut self, addr: u32, word: u32) -> Result<(), FlashPresetError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashPresetError::Unaligned);
        }
        let rc = unsafe { esp_rom_spiflash_write(addr, &word as *const u32, 4) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashPresetError::FlashOpFailed(rc));
        }
        Ok(())
    }

    fn read_bytes(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashPresetError> {
        if out.is_empty() {
            return Ok(());
        }

        let mut copied = 0usize;
        let start = addr & !0b11;
        let end = (addr + out.len() as u32 + 3) & !0b11;

        for word_addr in (start..end).step_by(4) {
            let bytes = self.read_word(word_addr)?.to_le_bytes();
            for (i, b) in bytes.iter().enumerate() {
                let Some(dst) = (word_addr as i64 + i as i64 - addr as i64)
                    .try_into()
                    .ok()
                    .filter(|dst: &usize| *dst < out.len())
                else {
                    continue;
                };
                out[dst] = *b;
                copied += 1;
            }
        }

        if copied == out.len() {
            Ok(())
        } else {
            Err(FlashPresetError::ShortRead)
        }
    }

    /// Writes into freshly-erased flash. Bytes outside `data` inside the
    /// word window stay 0xFF so neighbouring content is untouched.
    fn write_erased_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashPresetError> {
        if data.is_empty() {
            return Ok(());
        }

        let start = addr & !0b11;
        let end = (addr + data.len() as u32 + 3) & !0b11;

        for word_addr in (start..end).step_by(4) {
            let mut bytes = [0xFFu8; 4];
            for (i, slot) in bytes.iter_mut().enumerate() {
                let Some(src) = (word_addr as i64 + i as i64 - addr as i64)
                    .try_into()
                    .ok()
                    .filter(|src: &usize| *src < data.len())
                else {
                    continue;
                };
                *slot = data[src];
            }
            self.write_word(word_addr, u32::from_le_bytes(bytes))?;
        }

        Ok(())
    }
}

impl ReadStorage for RawFlash {
    type Error = FlashPresetError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_bytes(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        // The partition-table reader only needs `ReadStorage`.
        Err(FlashPresetError::Unaligned)
    }
}

#[derive(Debug)]
pub struct FlashPresetStore {
    flash: RawFlash,
    region_addr: u32,
}

impl FlashPresetStore {
    pub fn new() -> Result<Self, FlashPresetError> {
        let mut flash = RawFlash::new()?;

        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let table = read_partition_table(&mut flash, &mut table_buf)
            .map_err(|_| FlashPresetError::PartitionTable)?;

        let mut chosen: Option<(u32, u32)> = None;
        for entry in table.iter() {
            if entry.is_read_only() || entry.len() < FLASH_SECTOR_SIZE {
                continue;
            }
            match entry.partition_type() {
                PartitionType::Data(DataPartitionSubType::Undefined) => {
                    chosen = Some((entry.offset(), entry.len()));
                    break;
                }
                PartitionType::Data(DataPartitionSubType::Nvs) if chosen.is_none() => {
                    chosen = Some((entry.offset(), entry.len()));
                }
                _ => {}
            }
        }

        let (offset, len) = chosen.ok_or(FlashPresetError::PresetPartitionMissing)?;
        if len < FLASH_SECTOR_SIZE {
            return Err(FlashPresetError::PartitionTooSmall);
        }
        debug_assert!(REGION_LEN as u32 <= FLASH_SECTOR_SIZE);

        Ok(Self {
            flash,
            region_addr: offset + len - FLASH_SECTOR_SIZE,
        })
    }

    fn commit_image(&mut self, image: &[u8; REGION_LEN]) -> Result<(), FlashPresetError> {
        self.flash.erase_sector(self.region_addr)?;
        self.flash.write_erased_bytes(self.region_addr, image)
    }
}

impl PresetStore for FlashPresetStore {
    type Error = FlashPresetError;

    fn load(&mut self) -> Result<StationRegistry, Self::Error> {
        let mut image = [0u8; REGION_LEN];
        self.flash.read_bytes(self.region_addr, &mut image)?;
        // Decode cannot fail: blank or erased flash is five empty stations.
        Ok(decode_region(&image))
    }

    fn save(&mut self, registry: &StationRegistry) -> Result<(), Self::Error> {
        let mut image = [0u8; REGION_LEN];
        encode_region(registry, &mut image);
        self.commit_image(&image)
    }

    fn erase(&mut self) -> Result<(), Self::Error> {
        self.commit_image(&[0u8; REGION_LEN])
    }
}

pub mod flash_presets;

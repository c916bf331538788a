#![no_std]

//! ESP32-S3 board glue for the Tunebox firmware: flash-backed preset store,
//! Wi-Fi connectivity state, the OLED status panel, and the audio stream
//! pipeline. Everything here implements a contract from `tunebox-core`.

pub mod audio;
pub mod network;
pub mod platform;
pub mod storage;

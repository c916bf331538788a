#![cfg_attr(not(test), no_std)]

//! Platform-independent core of the Tunebox internet-radio appliance:
//! station records, the fixed-slot preset codec, playback control, and the
//! web form handlers. Board glue lives in `tunebox-hal-esp32s3`.

pub mod player;
pub mod presets;
pub mod registry;
pub mod station;
pub mod status;
pub mod web;

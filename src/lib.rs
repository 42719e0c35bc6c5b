//! Jukebox: a Discord music bot with one playback engine per guild.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;

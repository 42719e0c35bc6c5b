//! # Audio Module
//!
//! Per-guild playback engine.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - Ordered entries with a cursor on the current track
//! - Repeat, shuffle and autoplay flags plus the guild volume
//! - Shuffle cycle bookkeeping
//!
//! ### [`policy`] - Next Track Selection
//! - Pure decision of what plays after the current track
//!
//! ### [`player`] - Audio Player
//! - Drives one voice connection from the queue
//! - Lazy stream resolution, autoplay and user notifications
//!
//! ### [`registry`] - Player Registry
//! - One [`player::Player`] per guild, created on demand
//!
//! The voice connection, track resolver, autoplay source, settings store
//! and notifier are traits ([`sink`], [`notify`], [`crate::sources`],
//! [`crate::storage`]) so the engine can run against in-memory fakes.

pub mod notify;
pub mod player;
pub mod policy;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod track;

#[cfg(test)]
pub(crate) mod testing;

pub use player::{NextOptions, Player, PlayerDeps, PlayerOptions, PlayerSnapshot, PlayerState};
pub use queue::{Queue, QueueEntry, QueueInfo, RepeatMode};
pub use registry::PlayerRegistry;
pub use track::TrackRecord;

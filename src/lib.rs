//! RoomScout — turns exported group-chat transcripts into housing listings.

pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod safety;
pub mod transcript;

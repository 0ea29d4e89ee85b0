//! Thin per-table repository modules (§2's "Data layer" note) — plain
//! structs carrying static async functions over a borrowed
//! `DatabaseConnection`, grouped by which component needs them, mirroring
//! the reference deployment's `database.rs` convention.

pub mod processed_videos;
pub mod quota;
pub mod subscriptions;
pub mod users;
pub mod webhook_events;

//! Background Tasks Module
//!
//! # Tasks
//! - TTL Sweep: removes expired in-process cache entries at the configured interval
//! - Idle Reaper: closes pooled Redis connections past their age or idle limit

mod cleanup;
mod reaper;

pub use cleanup::spawn_cleanup_task;
pub use reaper::{spawn_idle_reaper, ConnectionLimits};

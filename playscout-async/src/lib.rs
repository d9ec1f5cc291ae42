//! Thin re-export layer over Tokio used by every other crate in the workspace.
//!
//! Nothing in here is clever: the pipeline runs as a single native daemon, so
//! there is no second target to abstract over. The module split (`task`,
//! `time`, `sync`) exists so callers write `playscout_async::sync::Semaphore`
//! instead of reaching for `tokio` directly, keeping the runtime swappable in
//! one place if that ever changes.

pub mod sync;
pub mod task;
pub mod time;

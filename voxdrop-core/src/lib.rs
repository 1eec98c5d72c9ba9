//! # Voxdrop Core
//!
//! File-arrival reconciliation for text-to-speech output: watch folders for
//! wave + text pairs, decide when a pair is fully written, match it against
//! user rules and hand it to the editing host exactly once.
//!
//! ## Architecture
//!
//! - [`fs_watch`]: notify watchers, the change coalescer and the project
//!   poller. They only produce [`fs_watch::WatchSignal`]s.
//! - [`candidates`]: per-path stay/retry counters and the give-up policy.
//! - [`pipeline`]: one flush cycle: readiness checks, [`dedupe`],
//!   [`rules`] matching, relocation, [`transform`] and the delivery sink.
//! - [`engine`]: the single-owner loop tying the above together.
//! - [`host`]: the project snapshot and the probe that reads it.
//! - [`fairy`]: the adapter interface for driving TTS applications.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//! use voxdrop_core::engine::{Engine, EngineDeps};
//! use voxdrop_core::fs_watch::WatchPlan;
//! use voxdrop_core::host::StaticProjectProbe;
//! use voxdrop_core::pipeline::sink::DeliverySink;
//! use voxdrop_core::rules::{FilePattern, Rule, RuleSet};
//! use voxdrop_core::transform::LuaTransform;
//! use voxdrop_core::EngineConfig;
//!
//! async fn watch(sink: Arc<dyn DeliverySink>) -> voxdrop_core::Result<()> {
//!     let rule = Rule::new("/tmp/tts", FilePattern::wildcard("*.wav").unwrap());
//!     let rules = RuleSet::new(vec![rule]);
//!     let plan = WatchPlan {
//!         dirs: rules.watch_dirs(),
//!         ..Default::default()
//!     };
//!     let deps = EngineDeps {
//!         transform: Arc::new(LuaTransform),
//!         sink,
//!         probe: Arc::new(StaticProjectProbe::absent()),
//!     };
//!     let engine = Engine::new(EngineConfig::default(), rules, deps);
//!     engine.run_watched(plan, &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]

pub mod candidates;
pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod fairy;
pub mod fs_watch;
pub mod host;
pub mod identity;
pub mod pipeline;
pub mod placeholders;
pub mod rules;
pub mod transform;
pub mod wave;

pub use config::EngineConfig;
pub use error::{EngineError, Result};

//! Interruptible tree reconciliation.
//!
//! A host (see [`HostConfig`]) is driven from element descriptors ([`Node`]).
//! Updates carry a lane; the most urgent pending lane of a root is rendered
//! either synchronously from the microtask drain or as a time-sliced
//! scheduler task that yields between work nodes. A completed render is
//! committed in one pass and its passive effects run from a later task.
//!
//! ```ignore
//! let mut engine = Engine::new(dom, EngineConfig::from_env());
//! let root = engine.mount(container);
//! engine.render(root, host("p").child("hello").build())?;
//! engine.run_until_idle()?;
//! ```

#![allow(clippy::missing_errors_doc, reason = "Every fallible operation returns anyhow::Result")]

mod begin_work;
mod child_fibers;
mod commit_work;
mod complete_work;
pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod fiber;
pub mod flags;
pub mod hooks;
pub mod host_config;
pub mod lanes;
pub mod root;
pub mod update_queue;
mod work_loop;

pub use config::{EngineConfig, MAX_FRAME_YIELD_MS};
pub use element::{Attributes, Component, Element, ElementBuilder, ElementKind, Key, Node, Props, fragment, host};
pub use engine::{CommitStats, Engine};
pub use error::ReconcileError;
pub use fiber::FiberId;
pub use flags::{EffectFlags, HookFlags};
pub use hooks::{Cleanup, Dep, Dispatcher, RenderScope, SetState};
pub use host_config::HostConfig;
pub use lanes::{Lane, Lanes};
pub use root::RootId;
pub use update_queue::{Action, Update, UpdateRing, process_update_queue};

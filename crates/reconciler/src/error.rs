//! Typed failures raised by the reconciler.
//!
//! Everything is surfaced through `anyhow::Error`; callers that care about
//! the kind can `downcast_ref::<ReconcileError>()`.

use crate::fiber::FiberId;
use crate::root::RootId;
use core::error::Error;
use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// A component declared more state cells or effects than on its previous render.
    RenderedMoreHooks { component: &'static str, count: usize },
    /// A component declared fewer state cells or effects than on its previous render.
    RenderedFewerHooks {
        component: &'static str,
        expected: usize,
        rendered: usize,
    },
    /// The hook at `index` changed between `use_state` and `use_effect`.
    HookKindMismatch { component: &'static str, index: usize },
    /// `use_state` asked for a different type than the cell holds.
    StateTypeMismatch { component: &'static str, index: usize },
    /// A placed or deleted node has no host ancestor.
    MissingHostParent(FiberId),
    /// A node id that is no longer live.
    StaleNode(FiberId),
    /// The root handle does not belong to this engine.
    UnknownRoot(RootId),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RenderedMoreHooks { component, count } => write!(
                formatter,
                "{component} rendered more hooks than during the previous render (more than {count})"
            ),
            Self::RenderedFewerHooks {
                component,
                expected,
                rendered,
            } => write!(
                formatter,
                "{component} rendered fewer hooks than expected ({rendered} of {expected}); hooks must not be called conditionally"
            ),
            Self::HookKindMismatch { component, index } => {
                write!(formatter, "{component} changed the kind of hook #{index} between renders")
            }
            Self::StateTypeMismatch { component, index } => {
                write!(formatter, "{component} read state #{index} with a different type")
            }
            Self::MissingHostParent(fiber) => {
                write!(formatter, "no host parent found for {fiber}")
            }
            Self::StaleNode(fiber) => write!(formatter, "{fiber} is no longer live"),
            Self::UnknownRoot(root) => write!(formatter, "unknown root {root}"),
        }
    }
}

impl Error for ReconcileError {}

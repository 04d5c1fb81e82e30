//! State cells and passive effects declared by function components.
//!
//! A component renders inside a [`RenderScope`]. The scope's [`Dispatcher`] is
//! picked once per render: `Mount` creates fresh cells, `Update` walks the
//! committed cells of the alternate in declaration order and replays their
//! queues for the render lane.

use crate::error::ReconcileError;
use crate::fiber::FiberId;
use crate::flags::{EffectFlags, HookFlags};
use crate::lanes::Lanes;
use crate::update_queue::{Action, SharedQueue, StateCell, Transform, Update};
use anyhow::Result;
use core::any::Any;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::mem;
use core::marker::PhantomData;
use log::trace;
use scheduler::PriorityLevel;
use std::rc::Rc;

/// Teardown returned by an effect setup.
pub type Cleanup = Box<dyn FnOnce()>;
/// Effect setup, run after commit.
pub type Setup = Box<dyn FnOnce() -> Option<Cleanup>>;

/// Type-erased state value.
pub type AnyState = Rc<dyn Any>;

/// One entry in a component's hook list.
#[derive(Debug)]
pub enum Hook {
    State(StateCell<AnyState>),
    Effect(Rc<Effect>),
}

/// Teardown slot shared by every render of the same effect.
#[derive(Default)]
pub struct EffectInstance {
    destroy: RefCell<Option<Cleanup>>,
}

/// A passive effect registered during one render.
pub struct Effect {
    tag: HookFlags,
    create: RefCell<Option<Setup>>,
    deps: Option<Vec<Dep>>,
    inst: Rc<EffectInstance>,
}

impl Effect {
    #[inline]
    pub const fn tag(&self) -> HookFlags {
        self.tag
    }

    /// Run the stored teardown, if any.
    pub fn run_destroy(&self) {
        let destroy = self.inst.destroy.borrow_mut().take();
        if let Some(destroy) = destroy {
            destroy();
        }
    }

    /// Run the setup and keep its teardown for later.
    ///
    /// Two commits can queue setups for the same instance before one flush;
    /// the earlier setup's teardown runs before the next setup replaces it.
    pub fn run_create(&self) {
        let create = self.create.borrow_mut().take();
        if let Some(create) = create {
            self.run_destroy();
            let destroy = create();
            *self.inst.destroy.borrow_mut() = destroy;
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Effect")
            .field("tag", &self.tag)
            .field("deps", &self.deps)
            .field("pending_create", &self.create.borrow().is_some())
            .finish_non_exhaustive()
    }
}

/// Effect dependency, compared by identity.
#[derive(Clone)]
pub enum Dep {
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    /// Shared value compared by pointer.
    Shared(Rc<dyn Any>),
}

impl Dep {
    /// Depend on the identity of a shared value.
    pub fn shared<T: Any>(value: &Rc<T>) -> Self {
        Self::Shared(Rc::clone(value) as Rc<dyn Any>)
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Str(left), Self::Str(right)) => left == right,
            (Self::Shared(left), Self::Shared(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Str(value) => write!(formatter, "{value:?}"),
            Self::Shared(value) => write!(formatter, "Shared({:p})", Rc::as_ptr(value)),
        }
    }
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Dep {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

/// Absent deps never compare equal, so such an effect runs after every render.
fn are_deps_equal(prev: Option<&[Dep]>, next: Option<&[Dep]>) -> bool {
    match (prev, next) {
        (Some(prev), Some(next)) => {
            prev.len() == next.len() && prev.iter().zip(next).all(|(left, right)| left == right)
        }
        _ => false,
    }
}

/// An update waiting to be routed to its root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateRequest {
    pub fiber: FiberId,
    pub lane: Lanes,
}

/// State shared between the engine and every setter it hands out.
#[derive(Debug, Default)]
pub struct Shared {
    event_priority: Cell<Option<PriorityLevel>>,
    inbox: RefCell<Vec<UpdateRequest>>,
}

impl Shared {
    /// Lane for an update dispatched now.
    ///
    /// Inside a priority scope the lane maps from that level; otherwise updates are synchronous.
    pub fn request_update_lane(&self) -> Lanes {
        self.event_priority
            .get()
            .map_or(Lanes::SYNC, Lanes::from_priority)
    }

    pub(crate) fn replace_event_priority(&self, level: Option<PriorityLevel>) -> Option<PriorityLevel> {
        self.event_priority.replace(level)
    }

    pub(crate) fn push(&self, request: UpdateRequest) {
        self.inbox.borrow_mut().push(request);
    }

    pub(crate) fn take_requests(&self) -> Vec<UpdateRequest> {
        mem::take(&mut *self.inbox.borrow_mut())
    }

    pub fn has_requests(&self) -> bool {
        !self.inbox.borrow().is_empty()
    }
}

/// Setter returned by [`RenderScope::use_state`].
pub struct SetState<T> {
    fiber: FiberId,
    queue: SharedQueue<AnyState>,
    shared: Rc<Shared>,
    marker: PhantomData<fn(T)>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            fiber: self.fiber,
            queue: Rc::clone(&self.queue),
            shared: Rc::clone(&self.shared),
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "SetState({})", self.fiber)
    }
}

impl<T: Any> SetState<T> {
    /// Replace the state.
    pub fn set(&self, value: T) {
        let erased: AnyState = Rc::new(value);
        self.dispatch(Action::Value(erased));
    }

    /// Derive the next state from the previous one.
    pub fn update<F>(&self, func: F)
    where
        F: Fn(&T) -> T + 'static,
    {
        let transform: Transform<AnyState> = Rc::new(move |state: &AnyState| {
            match state.downcast_ref::<T>() {
                Some(value) => Rc::new(func(value)) as AnyState,
                None => Rc::clone(state),
            }
        });
        self.dispatch(Action::Transform(transform));
    }

    /// Node that owns the state.
    #[inline]
    pub const fn fiber(&self) -> FiberId {
        self.fiber
    }

    fn dispatch(&self, action: Action<AnyState>) {
        let lane = self.shared.request_update_lane();
        self.queue.borrow_mut().enqueue(Update::new(action, lane));
        self.shared.push(UpdateRequest {
            fiber: self.fiber,
            lane,
        });
        trace!("state update for {} at lane {lane}", self.fiber);
    }
}

/// Mount or update behaviour, chosen once per component render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatcher {
    Mount,
    Update,
}

/// Context a function component renders in.
pub struct RenderScope<'hooks> {
    dispatcher: Dispatcher,
    component: &'static str,
    fiber: FiberId,
    render_lane: Lanes,
    current: &'hooks mut [Hook],
    hooks: Vec<Hook>,
    flags: EffectFlags,
    shared: Rc<Shared>,
}

impl<'hooks> RenderScope<'hooks> {
    pub(crate) fn new(
        component: &'static str,
        fiber: FiberId,
        render_lane: Lanes,
        current: Option<&'hooks mut [Hook]>,
        shared: Rc<Shared>,
    ) -> Self {
        let (dispatcher, current) = match current {
            Some(hooks) => (Dispatcher::Update, hooks),
            None => (Dispatcher::Mount, <&mut [Hook]>::default()),
        };
        Self {
            dispatcher,
            component,
            fiber,
            render_lane,
            current,
            hooks: Vec::new(),
            flags: EffectFlags::NONE,
            shared,
        }
    }

    #[inline]
    pub const fn dispatcher(&self) -> Dispatcher {
        self.dispatcher
    }

    /// Lane this render is processing.
    #[inline]
    pub const fn render_lane(&self) -> Lanes {
        self.render_lane
    }

    /// Declare a state cell.
    ///
    /// # Errors
    /// Fails when the hook order differs from the previous render.
    pub fn use_state<T, F>(&mut self, init: F) -> Result<(Rc<T>, SetState<T>)>
    where
        T: Any,
        F: FnOnce() -> T,
    {
        let index = self.hooks.len();
        let (cell, value) = match self.dispatcher {
            Dispatcher::Mount => {
                let value = Rc::new(init());
                let erased: AnyState = Rc::clone(&value) as AnyState;
                (StateCell::new(erased), value)
            }
            Dispatcher::Update => {
                let Some(current) = self.current.get_mut(index) else {
                    return Err(ReconcileError::RenderedMoreHooks {
                        component: self.component,
                        count: index,
                    }
                    .into());
                };
                let Hook::State(committed) = current else {
                    return Err(ReconcileError::HookKindMismatch {
                        component: self.component,
                        index,
                    }
                    .into());
                };
                let next = committed.render(self.render_lane);
                let value = Rc::clone(&next.memoized_state)
                    .downcast::<T>()
                    .map_err(|_| ReconcileError::StateTypeMismatch {
                        component: self.component,
                        index,
                    })?;
                (next, value)
            }
        };

        let setter = SetState {
            fiber: self.fiber,
            queue: Rc::clone(&cell.queue),
            shared: Rc::clone(&self.shared),
            marker: PhantomData,
        };
        self.hooks.push(Hook::State(cell));
        Ok((value, setter))
    }

    /// Declare a passive effect.
    ///
    /// On mount it always runs. On update it runs (teardown first) only if
    /// `deps` is `None` or differs from the previous render's deps.
    ///
    /// # Errors
    /// Fails when the hook order differs from the previous render.
    pub fn use_effect<F>(&mut self, deps: Option<Vec<Dep>>, create: F) -> Result<()>
    where
        F: FnOnce() -> Option<Cleanup> + 'static,
    {
        let index = self.hooks.len();
        let (tag, inst) = match self.dispatcher {
            Dispatcher::Mount => (
                HookFlags::PASSIVE | HookFlags::HAS_EFFECT,
                Rc::new(EffectInstance::default()),
            ),
            Dispatcher::Update => {
                let Some(current) = self.current.get(index) else {
                    return Err(ReconcileError::RenderedMoreHooks {
                        component: self.component,
                        count: index,
                    }
                    .into());
                };
                let Hook::Effect(prev) = current else {
                    return Err(ReconcileError::HookKindMismatch {
                        component: self.component,
                        index,
                    }
                    .into());
                };
                let tag = if are_deps_equal(prev.deps.as_deref(), deps.as_deref()) {
                    HookFlags::PASSIVE
                } else {
                    HookFlags::PASSIVE | HookFlags::HAS_EFFECT
                };
                (tag, Rc::clone(&prev.inst))
            }
        };

        if tag.contains(HookFlags::HAS_EFFECT) {
            self.flags |= EffectFlags::PASSIVE;
        }
        self.hooks.push(Hook::Effect(Rc::new(Effect {
            tag,
            create: RefCell::new(Some(Box::new(create))),
            deps,
            inst,
        })));
        Ok(())
    }

    /// Close the render, returning the new hook list and flags for the node.
    pub(crate) fn finish(self) -> Result<(Vec<Hook>, EffectFlags)> {
        if self.dispatcher == Dispatcher::Update && self.hooks.len() < self.current.len() {
            return Err(ReconcileError::RenderedFewerHooks {
                component: self.component,
                expected: self.current.len(),
                rendered: self.hooks.len(),
            }
            .into());
        }
        Ok((self.hooks, self.flags))
    }
}

/// Effects held by a hook list.
pub(crate) fn effects(hooks: &[Hook]) -> impl Iterator<Item = &Rc<Effect>> {
    hooks.iter().filter_map(|hook| match hook {
        Hook::Effect(effect) => Some(effect),
        Hook::State(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deps_compare_pairwise_by_identity() {
        let shared = Rc::new(5u8);
        let same = vec![Dep::from(1i64), Dep::shared(&shared)];
        let again = vec![Dep::from(1i64), Dep::shared(&shared)];
        let other = vec![Dep::from(1i64), Dep::shared(&Rc::new(5u8))];
        assert!(are_deps_equal(Some(same.as_slice()), Some(again.as_slice())));
        assert!(!are_deps_equal(Some(same.as_slice()), Some(other.as_slice())));
        assert!(!are_deps_equal(Some(same.as_slice()), Some(&same[..1])));
        assert!(!are_deps_equal(None, None));
    }

    #[test]
    fn effect_teardown_is_shared_between_renders() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let inst = Rc::new(EffectInstance::default());
        let first_log = Rc::clone(&log);
        let setup: Setup = Box::new(move || {
            let cleanup: Cleanup = Box::new(move || first_log.borrow_mut().push("destroy"));
            Some(cleanup)
        });
        let first = Effect {
            tag: HookFlags::PASSIVE | HookFlags::HAS_EFFECT,
            create: RefCell::new(Some(setup)),
            deps: None,
            inst: Rc::clone(&inst),
        };
        first.run_create();

        let second = Effect {
            tag: HookFlags::PASSIVE | HookFlags::HAS_EFFECT,
            create: RefCell::new(None),
            deps: None,
            inst,
        };
        second.run_destroy();
        second.run_destroy();
        assert_eq!(*log.borrow(), ["destroy"]);
    }

    #[test]
    fn setters_use_the_scoped_event_priority() {
        let shared = Shared::default();
        assert_eq!(shared.request_update_lane(), Lanes::SYNC);
        shared.replace_event_priority(Some(PriorityLevel::Normal));
        assert_eq!(shared.request_update_lane(), Lanes::DEFAULT);
        shared.replace_event_priority(None);
        assert_eq!(shared.request_update_lane(), Lanes::SYNC);
    }
}

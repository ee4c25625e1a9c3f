//! Thread-local configuration stacks with scoped guards.
//!
//! Each logical execution context carries its own stacks for the active
//! policy, policy resolution mode, null behaviour and conversion policy.
//! Entering a scope pushes a value and the returned guard pops it on drop,
//! on every exit path including unwinding.

use crate::convert::ConversionPolicy;
use crate::nullability::NullBehavior;
use crate::policy::{Policy, PolicyResolution};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static POLICIES: RefCell<Vec<Arc<Policy>>> = const { RefCell::new(Vec::new()) };
    static RESOLUTIONS: RefCell<Vec<PolicyResolution>> = const { RefCell::new(Vec::new()) };
    static NULLS: RefCell<Vec<NullBehavior>> = const { RefCell::new(Vec::new()) };
    static CONVERSIONS: RefCell<Vec<ConversionPolicy>> = const { RefCell::new(Vec::new()) };
}

/// Guard returned by [`use_policy`]; pops the policy stack on drop.
pub struct PolicyScope(());

/// Guard returned by [`use_resolution`].
pub struct ResolutionScope(());

/// Guard returned by [`use_nulls`].
pub struct NullsScope(());

/// Guard returned by [`use_conversion_policy`].
pub struct ConversionScope(());

/// Push a policy for the current thread until the guard drops.
#[must_use = "the policy is popped when the guard drops"]
pub fn use_policy(policy: Arc<Policy>) -> PolicyScope {
    POLICIES.with(|stack| stack.borrow_mut().push(policy));
    PolicyScope(())
}

impl Drop for PolicyScope {
    fn drop(&mut self) {
        POLICIES.with(|stack| stack.borrow_mut().pop());
    }
}

/// The scoped context policy, if any scope is active.
pub fn context_policy() -> Option<Arc<Policy>> {
    POLICIES.with(|stack| stack.borrow().last().cloned())
}

/// The effective policy: scoped context policy or the library default.
pub fn current_policy() -> Arc<Policy> {
    context_policy().unwrap_or_else(Policy::default_policy)
}

/// Push a policy resolution mode until the guard drops.
#[must_use = "the resolution mode is popped when the guard drops"]
pub fn use_resolution(resolution: PolicyResolution) -> ResolutionScope {
    RESOLUTIONS.with(|stack| stack.borrow_mut().push(resolution));
    ResolutionScope(())
}

impl Drop for ResolutionScope {
    fn drop(&mut self) {
        RESOLUTIONS.with(|stack| stack.borrow_mut().pop());
    }
}

pub fn current_resolution() -> PolicyResolution {
    RESOLUTIONS.with(|stack| stack.borrow().last().copied().unwrap_or_default())
}

/// Push a null behaviour until the guard drops.
#[must_use = "the null behaviour is popped when the guard drops"]
pub fn use_nulls(nulls: NullBehavior) -> NullsScope {
    NULLS.with(|stack| stack.borrow_mut().push(nulls));
    NullsScope(())
}

impl Drop for NullsScope {
    fn drop(&mut self) {
        NULLS.with(|stack| stack.borrow_mut().pop());
    }
}

pub fn current_nulls() -> NullBehavior {
    NULLS.with(|stack| stack.borrow().last().copied().unwrap_or_default())
}

/// Run a closure under a specific null behaviour.
pub fn with_nulls<T>(nulls: NullBehavior, f: impl FnOnce() -> T) -> T {
    let _scope = use_nulls(nulls);
    f()
}

/// Push a conversion policy until the guard drops.
#[must_use = "the conversion policy is popped when the guard drops"]
pub fn use_conversion_policy(policy: ConversionPolicy) -> ConversionScope {
    CONVERSIONS.with(|stack| stack.borrow_mut().push(policy));
    ConversionScope(())
}

impl Drop for ConversionScope {
    fn drop(&mut self) {
        CONVERSIONS.with(|stack| stack.borrow_mut().pop());
    }
}

pub fn current_conversion_policy() -> ConversionPolicy {
    CONVERSIONS.with(|stack| stack.borrow().last().copied().unwrap_or_default())
}

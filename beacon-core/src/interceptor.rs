//! Ordered, first-match-wins interceptor chain
//!
//! Interceptors are consulted in ascending [`Interceptor::order`]. The first
//! compatible interceptor that returns `true` from `intercept` ends the pass
//! and the subject's `after_intercept` runs; if none does, the subject's
//! `pass_intercept` runs instead. At most one interceptor acts per pass.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::trace;

/// Subject that can be pushed through an [`InterceptorChain`]
pub trait Interceptable: Any + Send + Sync {
    /// No interceptor claimed the subject
    fn pass_intercept(&self);

    /// An interceptor claimed the subject
    fn after_intercept(&self);

    fn as_any(&self) -> &dyn Any;
}

/// Policy handler registered in a chain
pub trait Interceptor<T: ?Sized>: Send + Sync {
    /// Lower values run first
    fn order(&self) -> i32;

    /// Whether this interceptor applies to subjects of the given concrete type
    fn is_intercept_type(&self, subject_type: TypeId) -> bool;

    /// Returns `true` to stop the chain
    fn intercept(&self, subject: &T) -> bool;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Chain of interceptors over subjects of type `T`
pub struct InterceptorChain<T: ?Sized> {
    interceptors: RwLock<Vec<Arc<dyn Interceptor<T>>>>,
}

impl<T: Interceptable + ?Sized> InterceptorChain<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            interceptors: RwLock::new(Vec::new()),
        }
    }

    /// Chain over an explicit registration list
    #[must_use]
    pub fn with_interceptors(interceptors: impl IntoIterator<Item = Arc<dyn Interceptor<T>>>) -> Self {
        let mut interceptors: Vec<_> = interceptors.into_iter().collect();
        interceptors.sort_by_key(|i| i.order());
        Self {
            interceptors: RwLock::new(interceptors),
        }
    }

    /// Register another interceptor; the chain is re-sorted by order.
    /// Interceptors with equal order keep registration order.
    pub fn add_interceptor(&self, interceptor: Arc<dyn Interceptor<T>>) {
        let mut interceptors = self.interceptors.write();
        interceptors.push(interceptor);
        interceptors.sort_by_key(|i| i.order());
    }

    /// Run `subject` through the chain. Returns `true` if an interceptor
    /// claimed it.
    pub fn do_interceptor(&self, subject: &T) -> bool {
        // Snapshot so interceptors may register others without deadlocking
        let interceptors = self.interceptors.read().clone();
        let subject_type = subject.as_any().type_id();

        for interceptor in &interceptors {
            if !interceptor.is_intercept_type(subject_type) {
                continue;
            }
            if interceptor.intercept(subject) {
                trace!(interceptor = interceptor.name(), "Subject intercepted");
                subject.after_intercept();
                return true;
            }
        }

        subject.pass_intercept();
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.read().is_empty()
    }

    /// Interceptor names in execution order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.read().iter().map(|i| i.name()).collect()
    }
}

impl<T: Interceptable + ?Sized> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-call prediction context
//!
//! A [`Context`] belongs to one top-level prediction call (or one sequential
//! scan) and is never shared between threads. It carries the recursion guard
//! that keeps dataplanes which feed each other from re-entering themselves.

use crate::model::DataplaneKey;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Context {
    callouts: HashSet<DataplaneKey>,
    evaluations: u64,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with `key` marked in use.
    ///
    /// Returns `None` without calling `f` when `key` is already in use further
    /// up the call chain. The mark is released when `f` returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use framewise::{Context, DataplaneKey};
    ///
    /// let key = DataplaneKey::new("pos", "text");
    /// let mut ctx = Context::new();
    /// let nested = ctx.with_callout(&key, |ctx| ctx.with_callout(&key, |_| 1));
    /// assert_eq!(nested, Some(None));
    /// assert!(!ctx.is_active(&key));
    /// ```
    pub fn with_callout<R>(
        &mut self,
        key: &DataplaneKey,
        f: impl FnOnce(&mut Context) -> R,
    ) -> Option<R> {
        if !self.callouts.insert(key.clone()) {
            tracing::debug!(dataplane = %key, "recursive callout rejected");
            return None;
        }
        let out = f(self);
        self.callouts.remove(key);
        Some(out)
    }

    pub fn is_active(&self, key: &DataplaneKey) -> bool {
        self.callouts.contains(key)
    }

    /// Number of positions evaluated through this context, nested calls included.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub(crate) fn record_evaluation(&mut self) {
        self.evaluations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_keys_nest() {
        let a = DataplaneKey::new("pos", "a");
        let b = DataplaneKey::new("pos", "b");
        let mut ctx = Context::new();
        let out = ctx.with_callout(&a, |ctx| {
            assert!(ctx.is_active(&a));
            ctx.with_callout(&b, |ctx| ctx.is_active(&a) && ctx.is_active(&b))
        });
        assert_eq!(out, Some(Some(true)));
        assert!(!ctx.is_active(&a));
        assert!(!ctx.is_active(&b));
    }

    #[test]
    fn released_key_can_be_reacquired() {
        let a = DataplaneKey::new("pos", "a");
        let mut ctx = Context::new();
        assert_eq!(ctx.with_callout(&a, |_| 1), Some(1));
        assert_eq!(ctx.with_callout(&a, |_| 2), Some(2));
    }
}

//! Dispatcher contract and the pattern-table implementation

use crate::handler::Handler;
use crate::matcher::PathMatcher;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use transcode_core::{Error, Result};

/// Selects the handler for a request path
pub trait Dispatcher: Send + Sync + fmt::Debug {
    /// Handler for `path`, or `None` if nothing matches
    ///
    /// Fails with [`Error::NotReady`] when the dispatcher cannot route yet.
    fn dispatch(&self, path: &str) -> Result<Option<Arc<dyn Handler>>>;
}

impl<T: Dispatcher + ?Sized> Dispatcher for Arc<T> {
    fn dispatch(&self, path: &str) -> Result<Option<Arc<dyn Handler>>> {
        (**self).dispatch(path)
    }
}

/// Dispatcher over an ordered table of path patterns
///
/// The first registered pattern that matches wins. The table starts out not
/// ready; [`mark_ready`](Self::mark_ready) is called once loading is done.
#[derive(Debug, Default)]
pub struct PatternDispatcher {
    routes: RwLock<Vec<(PathMatcher, Arc<dyn Handler>)>>,
    ready: AtomicBool,
}

impl PatternDispatcher {
    /// Create an empty, not-ready dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`
    pub fn register(&self, pattern: &str, handler: Arc<dyn Handler>) -> Result<()> {
        let matcher = PathMatcher::new(pattern)?;
        self.routes.write().push((matcher, handler));
        tracing::debug!(pattern = %pattern, "Pattern registered");
        Ok(())
    }

    /// Allow dispatching
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
        tracing::info!(patterns = self.len(), "Dispatcher ready");
    }

    /// Whether dispatching is allowed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Registered patterns, in match order
    pub fn patterns(&self) -> Vec<String> {
        self.routes
            .read()
            .iter()
            .map(|(matcher, _)| matcher.pattern().to_string())
            .collect()
    }

    /// Number of registered patterns
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no pattern is registered
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

impl Dispatcher for PatternDispatcher {
    fn dispatch(&self, path: &str) -> Result<Option<Arc<dyn Handler>>> {
        if !self.is_ready() {
            return Err(Error::not_ready("pattern table not loaded"));
        }

        Ok(self
            .routes
            .read()
            .iter()
            .find(|(matcher, _)| matcher.is_match(path))
            .map(|(_, handler)| Arc::clone(handler)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Request, Response};

    fn noop(_req: &Request, _resp: &mut Response) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_not_ready() {
        let dispatcher = PatternDispatcher::new();
        dispatcher.register("/tiles", Arc::new(handler_fn("tiles", noop))).unwrap();

        let err = dispatcher.dispatch("/tiles").unwrap_err();
        assert!(matches!(err, Error::NotReady(_)));
    }

    #[test]
    fn test_first_match_wins() {
        let dispatcher = PatternDispatcher::new();
        dispatcher.register("/layers/roads", Arc::new(handler_fn("roads", noop))).unwrap();
        dispatcher.register("/layers/:id", Arc::new(handler_fn("layer", noop))).unwrap();
        dispatcher.mark_ready();

        let handler = dispatcher.dispatch("/layers/roads").unwrap().unwrap();
        assert_eq!(handler.name(), "roads");

        let handler = dispatcher.dispatch("/layers/rivers").unwrap().unwrap();
        assert_eq!(handler.name(), "layer");

        assert!(dispatcher.dispatch("/unknown").unwrap().is_none());
        assert_eq!(dispatcher.patterns(), vec!["/layers/roads", "/layers/:id"]);
    }

    #[test]
    fn test_register_rejects_bad_pattern() {
        let dispatcher = PatternDispatcher::new();
        assert!(dispatcher.register("layers", Arc::new(handler_fn("x", noop))).is_err());
        assert!(dispatcher.is_empty());
    }
}

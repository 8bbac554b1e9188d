use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::dom::{Dom, Interest, NodeId, WatchId};
use crate::ids::EntityId;
use crate::protocol::{ChangeSet, EntityKind, Prefix};

use super::{DebouncedReporter, EnvelopeSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    Disposed,
}

/// The record every observer kind is built on: identity, the last reported
/// value of each attribute, the watches it registered, and its reporter.
pub struct ObservedEntity {
    prefix: Prefix,
    values: HashMap<String, Value>,
    watches: Vec<WatchId>,
    reporter: DebouncedReporter,
    lifecycle: Lifecycle,
}

impl ObservedEntity {
    pub fn new(
        kind: EntityKind,
        page_id: Option<EntityId>,
        sink: Arc<dyn EnvelopeSink>,
        delay: Duration,
    ) -> Self {
        let prefix = Prefix {
            kind,
            id: EntityId::generate(),
            page_id,
        };
        let reporter = DebouncedReporter::new(prefix.clone(), sink, delay);
        Self {
            prefix,
            values: HashMap::new(),
            watches: Vec::new(),
            reporter,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.prefix.id
    }

    pub fn kind(&self) -> EntityKind {
        self.prefix.kind
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Move to `Initialized`. Returns false (and changes nothing) when the
    /// entity was already initialized or has been disposed.
    pub fn mark_initialized(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Uninitialized {
            return false;
        }
        self.lifecycle = Lifecycle::Initialized;
        true
    }

    /// Record `value` for `name` and report it if it differs from the last
    /// reported value. Returns whether a change was reported.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        if self.lifecycle == Lifecycle::Disposed {
            return false;
        }
        if self.values.get(name) == Some(&value) {
            return false;
        }
        self.values.insert(name.to_string(), value.clone());
        self.reporter.report(ChangeSet::single(name, value));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn snapshot(&self) -> ChangeSet {
        let mut state = ChangeSet::new();
        for (name, value) in &self.values {
            state.insert(name, value.clone());
        }
        state
    }

    /// Register a watch that is released when the entity is disposed.
    pub fn watch(&mut self, dom: &dyn Dom, target: NodeId, interest: Interest) -> WatchId {
        let watch = dom.observe(target, interest);
        self.watches.push(watch);
        watch
    }

    pub fn owns(&self, watch: WatchId) -> bool {
        self.watches.contains(&watch)
    }

    pub fn flush_now(&mut self) {
        self.reporter.flush_now();
    }

    pub fn has_pending_flush(&self) -> bool {
        self.reporter.is_armed()
    }

    /// Flush what is pending, cancel the timer, and release every watch.
    /// Returns false if the entity was already disposed.
    pub fn dispose(&mut self, dom: &dyn Dom) -> bool {
        if self.lifecycle == Lifecycle::Disposed {
            return false;
        }
        self.reporter.flush_now();
        self.reporter.cancel();
        for watch in self.watches.drain(..) {
            dom.disconnect(watch);
        }
        self.lifecycle = Lifecycle::Disposed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use crate::protocol::Envelope;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn entity() -> (ObservedEntity, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ObservedEntity::new(EntityKind::Script, None, Arc::new(tx), Duration::from_millis(20)),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_redundant_set_reports_nothing() {
        let (mut entity, mut rx) = entity();

        assert!(entity.set("text", json!("a")));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_ok());

        assert!(!entity.set("text", json!("a")));
        assert!(!entity.has_pending_flush());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_is_strict_on_type() {
        let (mut entity, _rx) = entity();

        assert!(entity.set("duration", json!(1.5)));
        assert!(!entity.set("duration", json!(1.5)));
        assert!(entity.set("duration", json!("1.5")));
        assert!(entity.set("duration", Value::Null));
        assert!(!entity.set("duration", Value::Null));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_flushes_then_releases_watches_once() {
        let (mut entity, mut rx) = entity();
        let (dom, _events) = MemoryDom::new("https://example.com/");
        let script = dom.append_element(dom.document(), "script");

        entity.mark_initialized();
        entity.watch(&dom, script, Interest::ChildList);
        entity.set("text", json!("x"));
        assert_eq!(dom.watch_count(), 1);

        assert!(entity.dispose(&dom));
        assert_eq!(rx.try_recv().unwrap().changes.get("text"), Some(&json!("x")));
        assert_eq!(dom.watch_count(), 0);

        assert!(!entity.dispose(&dom));
        assert!(!entity.set("text", json!("y")));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(entity.lifecycle(), Lifecycle::Disposed);
    }

    #[tokio::test]
    async fn test_dispose_without_init_is_safe() {
        let (mut entity, mut rx) = entity();
        let (dom, _events) = MemoryDom::new("https://example.com/");

        assert!(entity.dispose(&dom));
        assert!(rx.try_recv().is_err());
        assert!(!entity.mark_initialized());
    }

    #[tokio::test]
    async fn test_reinitialize_is_noop() {
        let (mut entity, _rx) = entity();
        assert!(entity.mark_initialized());
        assert!(!entity.mark_initialized());
        assert_eq!(entity.lifecycle(), Lifecycle::Initialized);
    }
}

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::dom::{Dom, Interest, NodeId, WatchId};
use crate::ids::EntityId;
use crate::protocol::EntityKind;

use super::{EnvelopeSink, ObservedEntity, Observer};

/// Observer for one inline `<script>` node's text.
pub struct ScriptObserver {
    entity: ObservedEntity,
    node: NodeId,
}

impl ScriptObserver {
    pub fn new(page_id: EntityId, node: NodeId, sink: Arc<dyn EnvelopeSink>, delay: Duration) -> Self {
        Self {
            entity: ObservedEntity::new(EntityKind::Script, Some(page_id), sink, delay),
            node,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn text(&self) -> Option<&str> {
        self.entity.get("text").and_then(Value::as_str)
    }

    /// Child-list mutation on a watch this observer owns.
    pub fn on_mutation(&mut self, dom: &dyn Dom, watch: WatchId) {
        if self.entity.owns(watch) {
            self.refresh(dom);
        }
    }

    /// Re-read the node text. Returns whether it changed.
    pub fn refresh(&mut self, dom: &dyn Dom) -> bool {
        match dom.script_text(self.node) {
            Some(text) => self.entity.set("text", Value::String(text)),
            None => false,
        }
    }
}

impl Observer for ScriptObserver {
    fn entity(&self) -> &ObservedEntity {
        &self.entity
    }

    fn attach(&mut self, dom: &dyn Dom) {
        if !self.entity.mark_initialized() {
            return;
        }
        self.refresh(dom);
        self.entity.watch(dom, self.node, Interest::ChildList);
    }

    fn detach(&mut self, dom: &dyn Dom) {
        self.entity.dispose(dom);
    }
}

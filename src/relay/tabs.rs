use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::protocol::{PageEvent, Tab, TabId};

/// The browser's tab facility, as seen by the coordinator.
pub trait TabInventory: Send + Sync {
    /// Every open tab.
    fn tab_ids(&self) -> Vec<TabId>;

    /// Current record for one tab.
    fn tab(&self, id: TabId) -> Option<Tab>;

    /// Deliver an event to the page running in a tab. Best effort.
    fn send(&self, id: TabId, event: PageEvent);
}

struct TabEntry {
    tab: Tab,
    events: mpsc::UnboundedSender<PageEvent>,
}

/// In-process tab table: each open tab owns a channel its page reads from.
#[derive(Default)]
pub struct TabRegistry {
    tabs: Mutex<BTreeMap<TabId, TabEntry>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reopen) a tab and return the receiving end of its event channel.
    pub fn open(&self, id: TabId, mut tab: Tab) -> mpsc::UnboundedReceiver<PageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        tab.id = Some(id);
        self.tabs.lock().insert(id, TabEntry { tab, events: tx });
        rx
    }

    /// Overlay a partial record onto a tab. Returns false for unknown tabs.
    pub fn update(&self, id: TabId, change: &Tab) -> bool {
        match self.tabs.lock().get_mut(&id) {
            Some(entry) => {
                entry.tab.apply(change);
                true
            }
            None => false,
        }
    }

    pub fn close(&self, id: TabId) -> bool {
        self.tabs.lock().remove(&id).is_some()
    }
}

impl TabInventory for TabRegistry {
    fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.lock().keys().copied().collect()
    }

    fn tab(&self, id: TabId) -> Option<Tab> {
        self.tabs.lock().get(&id).map(|entry| entry.tab.clone())
    }

    fn send(&self, id: TabId, event: PageEvent) {
        let tabs = self.tabs.lock();
        match tabs.get(&id) {
            Some(entry) => {
                if entry.events.send(event).is_err() {
                    tracing::trace!("Tab {} no longer listening", id);
                }
            }
            None => tracing::debug!("Dropping {:?} for unknown tab {}", event, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_update_close() {
        let registry = TabRegistry::new();
        let mut rx = registry.open(
            TabId(3),
            Tab {
                title: Some("Before".to_string()),
                ..Default::default()
            },
        );

        assert!(registry.update(
            TabId(3),
            &Tab {
                title: Some("After".to_string()),
                ..Default::default()
            }
        ));
        let tab = registry.tab(TabId(3)).unwrap();
        assert_eq!(tab.id, Some(TabId(3)));
        assert_eq!(tab.title.as_deref(), Some("After"));

        registry.send(TabId(3), PageEvent::Activated);
        assert_eq!(rx.try_recv().unwrap(), PageEvent::Activated);

        assert!(registry.close(TabId(3)));
        assert!(registry.tab_ids().is_empty());
        assert!(!registry.update(TabId(3), &Tab::default()));
    }
}

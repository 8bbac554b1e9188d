use tokio::sync::{mpsc, oneshot};

use crate::observer::EnvelopeSink;
use crate::protocol::{Envelope, TabId, TabInfo};

/// What a page can ask of the coordinator.
#[derive(Debug)]
pub enum PageRequest {
    /// Queue an envelope for the next batch.
    Relay(Envelope),
    /// `{command: "getTabInfo"}`, answered immediately.
    GetTabInfo(oneshot::Sender<Option<TabInfo>>),
}

/// A page request plus the tab it came from, as the browser reports it.
#[derive(Debug)]
pub struct PortMessage {
    pub tab: Option<TabId>,
    pub request: PageRequest,
}

/// A page's connection to the coordinator.
#[derive(Debug, Clone)]
pub struct PagePort {
    tab: Option<TabId>,
    tx: mpsc::UnboundedSender<PortMessage>,
}

impl PagePort {
    pub fn new(tab: Option<TabId>, tx: mpsc::UnboundedSender<PortMessage>) -> Self {
        Self { tab, tx }
    }

    pub fn tab(&self) -> Option<TabId> {
        self.tab
    }

    /// Ask for the current tab metadata. `None` when there is nothing to
    /// report or the coordinator is gone.
    pub async fn tab_info(&self) -> Option<TabInfo> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PageRequest::GetTabInfo(reply_tx));
        reply_rx.await.ok().flatten()
    }

    fn send(&self, request: PageRequest) {
        let message = PortMessage {
            tab: self.tab,
            request,
        };
        if self.tx.send(message).is_err() {
            tracing::trace!("Coordinator gone; page request dropped");
        }
    }
}

impl EnvelopeSink for PagePort {
    fn post(&self, envelope: Envelope) {
        self.send(PageRequest::Relay(envelope));
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::host::HostEndpoint;
use super::port::{PageRequest, PortMessage};
use super::tabs::TabInventory;
use crate::error::Result;
use crate::ids::EntityId;
use crate::observer::Debounced;
use crate::protocol::{Batch, BrowserEvent, EntityKind, Envelope, HostReply, PageEvent, TabId, TabInfo};

struct HostSlot {
    name: String,
    /// Batches waiting for this host's delivery task, in flush order.
    queue: mpsc::UnboundedSender<Round>,
    /// Last session id the host replied with. Empty until the first reply.
    session: String,
}

/// One flushed batch, numbered so replies can be matched to it.
struct Round {
    seq: u64,
    batch: Arc<Batch>,
}

/// Outcome of handing one round to one host.
struct Delivery {
    host: usize,
    round: u64,
    result: Result<Option<HostReply>>,
}

/// Per-browser-instance relay between pages and native hosts.
///
/// Everything pages send is appended to one queue that is flushed as a
/// single batch once the queue has been quiet for the flush delay. Each host
/// gets its own delivery task, so a slow host never holds up tab queries,
/// relays or other hosts. The coordinator also owns the tab → page mapping
/// and the host session table.
pub struct RelayCoordinator {
    instance_id: EntityId,
    tabs: Arc<dyn TabInventory>,
    hosts: Vec<HostSlot>,
    replies: mpsc::UnboundedReceiver<Delivery>,
    in_flight: usize,
    tab_pages: HashMap<TabId, EntityId>,
    outbound: Debounced<Vec<Value>>,
    delivered: u64,
    last_rotation: Option<u64>,
}

/// Hand rounds to `endpoint` one at a time and report each outcome.
async fn deliver_in_order(
    host: usize,
    endpoint: Arc<dyn HostEndpoint>,
    mut rounds: mpsc::UnboundedReceiver<Round>,
    replies: mpsc::UnboundedSender<Delivery>,
) {
    while let Some(round) = rounds.recv().await {
        let result = endpoint.deliver(&round.batch).await;
        let delivery = Delivery {
            host,
            round: round.seq,
            result,
        };
        if replies.send(delivery).is_err() {
            tracing::trace!("Reply from {} dropped: coordinator stopped", endpoint.name());
            break;
        }
    }
}

impl RelayCoordinator {
    /// Returns the coordinator and the stream of flushed batches that
    /// [`RelayCoordinator::run`] delivers to the hosts.
    pub fn new(
        tabs: Arc<dyn TabInventory>,
        hosts: Vec<Arc<dyn HostEndpoint>>,
        delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<Value>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbound = Debounced::new(delay, move |changes: Vec<Value>| {
            if tx.send(changes).is_err() {
                tracing::trace!("Batch dropped: coordinator stopped");
            }
        });
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let hosts = hosts
            .into_iter()
            .enumerate()
            .map(|(index, endpoint)| {
                let (queue, rounds) = mpsc::unbounded_channel();
                let name = endpoint.name().to_string();
                tokio::spawn(deliver_in_order(index, endpoint, rounds, reply_tx.clone()));
                HostSlot {
                    name,
                    queue,
                    session: String::new(),
                }
            })
            .collect();

        let coordinator = Self {
            instance_id: EntityId::generate(),
            tabs,
            hosts,
            replies,
            in_flight: 0,
            tab_pages: HashMap::new(),
            outbound,
            delivered: 0,
            last_rotation: None,
        };
        (coordinator, rx)
    }

    pub fn instance_id(&self) -> &EntityId {
        &self.instance_id
    }

    /// Queue the startup `{title}` message.
    pub fn announce(&mut self, title: &str) {
        self.outbound.push(json!({ "title": title }));
    }

    /// Queue an envelope a page sent from `tab`.
    pub fn relay(&mut self, envelope: Envelope, tab: Option<TabId>) {
        if envelope.prefix.kind == EntityKind::Page {
            if let Some(tab) = tab {
                let page_id = envelope.prefix.id.clone();
                if let Some(previous) = self.tab_pages.insert(tab, page_id.clone()) {
                    if previous != page_id {
                        tracing::debug!("Tab {} moved from page {} to {}", tab, previous, page_id);
                        self.notify_page_disposed(previous);
                    }
                }
            }
        }
        self.outbound.push(envelope.to_value());
    }

    /// Queue `{type: "web-page", id, disposed: true}`.
    pub fn notify_page_disposed(&mut self, page_id: EntityId) {
        self.outbound.push(Envelope::page_disposed(page_id).to_value());
    }

    /// Tab info for the page in `tab`, or `None` when there is nothing to say.
    pub fn tab_info(&self, tab: Option<TabId>) -> Option<TabInfo> {
        let tab = self.tabs.tab(tab?)?;
        let info = TabInfo::from_tab(&tab);
        (!info.is_empty()).then_some(info)
    }

    pub fn page_for_tab(&self, tab: TabId) -> Option<&EntityId> {
        self.tab_pages.get(&tab)
    }

    /// Last session id reported by the named host.
    pub fn host_session(&self, name: &str) -> Option<&str> {
        self.hosts
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.session.as_str())
    }

    /// Batches handed to the hosts so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn has_pending_batch(&self) -> bool {
        self.outbound.is_armed()
    }

    pub fn handle_request(&mut self, message: PortMessage) {
        match message.request {
            PageRequest::Relay(envelope) => self.relay(envelope, message.tab),
            PageRequest::GetTabInfo(reply) => {
                if reply.send(self.tab_info(message.tab)).is_err() {
                    tracing::trace!("Tab info requester went away");
                }
            }
        }
    }

    pub fn handle_browser_event(&mut self, event: BrowserEvent) {
        match event {
            BrowserEvent::TabRemoved(tab) => {
                if let Some(page_id) = self.tab_pages.remove(&tab) {
                    self.notify_page_disposed(page_id);
                }
            }
            BrowserEvent::TabUpdated(tab, change) => {
                let info = TabInfo::from_tab(&change);
                if !info.is_empty() {
                    self.tabs.send(tab, PageEvent::Updated { change: info });
                }
            }
            BrowserEvent::TabActivated(active) => {
                for tab in self.tabs.tab_ids() {
                    if tab != active {
                        self.tabs.send(tab, PageEvent::Deactivated);
                    }
                }
                self.tabs.send(active, PageEvent::Activated);
            }
        }
    }

    /// Queue one batch for every host. Replies come back through
    /// [`RelayCoordinator::settle`] or the [`RelayCoordinator::run`] loop.
    pub fn dispatch(&mut self, changes: Vec<Value>) {
        self.delivered += 1;
        let round = self.delivered;
        let batch = Arc::new(Batch {
            instance_id: self.instance_id.clone(),
            changes,
        });

        for slot in &self.hosts {
            let queued = slot.queue.send(Round {
                seq: round,
                batch: Arc::clone(&batch),
            });
            match queued {
                Ok(()) => self.in_flight += 1,
                Err(_) => tracing::warn!("Delivery task for {} is gone", slot.name),
            }
        }
    }

    /// Wait until every dispatched batch has been answered or has failed.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.replies.recv().await {
                Some(delivery) => self.reconcile(delivery),
                None => break,
            }
        }
    }

    /// Apply one host's outcome. Every open tab is told about a rotation
    /// once per round, however many hosts rotated in it.
    fn reconcile(&mut self, delivery: Delivery) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Some(slot) = self.hosts.get_mut(delivery.host) else {
            return;
        };

        let rotated = match delivery.result {
            Ok(Some(HostReply {
                host_id: Some(host_id),
            })) if host_id != slot.session => {
                tracing::info!(
                    "Host {} session changed: {:?} -> {:?}",
                    slot.name,
                    slot.session,
                    host_id
                );
                slot.session = host_id;
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!("Delivery to {} failed: {}", slot.name, e);
                false
            }
        };

        if rotated && self.last_rotation != Some(delivery.round) {
            self.last_rotation = Some(delivery.round);
            for tab in self.tabs.tab_ids() {
                self.tabs.send(tab, PageEvent::NewHostId);
            }
        }
    }

    /// Serve pages and browser events until both streams close, then deliver
    /// whatever is still queued. Returns the number of batches delivered.
    pub async fn run(
        mut self,
        mut batches: mpsc::UnboundedReceiver<Vec<Value>>,
        mut requests: mpsc::UnboundedReceiver<PortMessage>,
        mut browser_events: mpsc::UnboundedReceiver<BrowserEvent>,
    ) -> u64 {
        let mut requests_open = true;
        let mut events_open = true;

        while requests_open || events_open {
            tokio::select! {
                Some(changes) = batches.recv() => self.dispatch(changes),
                Some(delivery) = self.replies.recv() => self.reconcile(delivery),
                message = requests.recv(), if requests_open => match message {
                    Some(message) => self.handle_request(message),
                    None => requests_open = false,
                },
                event = browser_events.recv(), if events_open => match event {
                    Some(event) => self.handle_browser_event(event),
                    None => events_open = false,
                },
            }
        }

        self.outbound.flush_now();
        while let Ok(changes) = batches.try_recv() {
            self.dispatch(changes);
        }
        self.settle().await;
        tracing::debug!(
            "Coordinator {} stopped after {} batch(es)",
            self.instance_id,
            self.delivered
        );
        self.delivered
    }
}

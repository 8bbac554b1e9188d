use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::aggregator::{Control, PageAggregator};
use crate::config::{Config, ExtensionConfig};
use crate::dom::{Dom, DomEvent};
use crate::ids::EntityId;
use crate::protocol::PageEvent;
use crate::relay::PagePort;

/// Owns the current page of one document and replaces it on reset.
pub struct PageController {
    dom: Arc<dyn Dom>,
    port: PagePort,
    delay: Duration,
    extension: ExtensionConfig,
    page: Option<PageAggregator>,
}

impl PageController {
    pub fn new(dom: Arc<dyn Dom>, port: PagePort, config: &Config) -> Self {
        Self {
            dom,
            port,
            delay: config.observer.flush_delay(),
            extension: config.extension.clone(),
            page: None,
        }
    }

    pub fn page(&self) -> Option<&PageAggregator> {
        self.page.as_ref()
    }

    pub fn page_id(&self) -> Option<&EntityId> {
        self.page.as_ref().map(PageAggregator::id)
    }

    /// Start a page if none is running and seed it with the tab info.
    pub async fn init(&mut self) {
        if self.page.is_some() {
            return;
        }
        let mut page = PageAggregator::new(
            Arc::clone(&self.dom),
            Arc::new(self.port.clone()),
            self.delay,
            self.extension.clone(),
        );
        page.init();
        self.page = Some(page);

        if let Some(info) = self.port.tab_info().await {
            if let Some(page) = self.page.as_mut() {
                page.set_tab_info(&info);
            }
        }
    }

    pub fn dispose(&mut self) {
        if let Some(mut page) = self.page.take() {
            page.dispose();
        }
    }

    /// Dispose the current page and start a fresh one with a new id.
    pub async fn reset(&mut self) {
        self.dispose();
        self.init().await;
    }

    pub fn handle_dom_event(&mut self, event: DomEvent) {
        if let Some(page) = self.page.as_mut() {
            page.handle_dom_event(event);
        }
    }

    /// A disposed controller stops listening until it is initialized again.
    pub async fn handle_page_event(&mut self, event: PageEvent) {
        let Some(page) = self.page.as_mut() else {
            tracing::trace!("No page to receive {:?}", event);
            return;
        };
        match page.handle_page_event(event) {
            Some(Control::Reset) => {
                tracing::debug!("Host rotated; resetting page {}", page.id());
                self.reset().await;
            }
            Some(Control::Dispose) => self.dispose(),
            None => {}
        }
    }

    /// Drive the page until the tab's event stream closes, then dispose it.
    pub async fn run(
        mut self,
        mut dom_events: mpsc::UnboundedReceiver<DomEvent>,
        mut page_events: mpsc::UnboundedReceiver<PageEvent>,
    ) {
        self.init().await;
        loop {
            tokio::select! {
                Some(event) = dom_events.recv() => self.handle_dom_event(event),
                event = page_events.recv() => match event {
                    Some(event) => self.handle_page_event(event).await,
                    None => break,
                },
            }
        }
        self.dispose();
    }
}

//! Change-detecting observers for pages, media elements, and script nodes.

mod entity;
mod media;
mod reporter;
mod script;

pub use entity::{Lifecycle, ObservedEntity};
pub use media::MediaObserver;
pub use reporter::{Coalesce, Debounced, DebouncedReporter};
pub use script::ScriptObserver;

use tokio::sync::mpsc;

use crate::dom::Dom;
use crate::protocol::{ChangeSet, Envelope};

/// Downstream of every flush.
pub trait EnvelopeSink: Send + Sync {
    fn post(&self, envelope: Envelope);
}

impl EnvelopeSink for mpsc::UnboundedSender<Envelope> {
    fn post(&self, envelope: Envelope) {
        if self.send(envelope).is_err() {
            tracing::trace!("Envelope dropped: receiver closed");
        }
    }
}

/// Capability shared by every node observer kind.
pub trait Observer {
    fn entity(&self) -> &ObservedEntity;

    /// Register watches and report the initial snapshot. No-op once attached.
    fn attach(&mut self, dom: &dyn Dom);

    /// Flush, release every watch, and stop reporting. Idempotent.
    fn detach(&mut self, dom: &dyn Dom);

    /// Last reported value of every tracked attribute.
    fn current_state(&self) -> ChangeSet {
        self.entity().snapshot()
    }
}

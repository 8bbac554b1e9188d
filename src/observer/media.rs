use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::dom::{Dom, Interest, MediaEvent, MediaProperties, NodeId, WatchId};
use crate::ids::EntityId;
use crate::protocol::EntityKind;

use super::{EnvelopeSink, ObservedEntity, Observer};

/// Observer for one `<audio>` or `<video>` element.
pub struct MediaObserver {
    entity: ObservedEntity,
    node: NodeId,
}

impl MediaObserver {
    pub fn audio(page_id: EntityId, node: NodeId, sink: Arc<dyn EnvelopeSink>, delay: Duration) -> Self {
        Self::new(EntityKind::Audio, page_id, node, sink, delay)
    }

    pub fn video(page_id: EntityId, node: NodeId, sink: Arc<dyn EnvelopeSink>, delay: Duration) -> Self {
        Self::new(EntityKind::Video, page_id, node, sink, delay)
    }

    fn new(
        kind: EntityKind,
        page_id: EntityId,
        node: NodeId,
        sink: Arc<dyn EnvelopeSink>,
        delay: Duration,
    ) -> Self {
        Self {
            entity: ObservedEntity::new(kind, Some(page_id), sink, delay),
            node,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_video(&self) -> bool {
        self.entity.kind() == EntityKind::Video
    }

    pub fn is_playing(&self) -> bool {
        self.entity.get("playing") == Some(&Value::Bool(true))
    }

    /// Handle a native event delivered on `watch`. Events on watches this
    /// observer did not register are ignored.
    pub fn on_event(&mut self, dom: &dyn Dom, watch: WatchId, event: MediaEvent) {
        if self.entity.owns(watch) {
            self.handle(dom, event);
        }
    }

    fn handle(&mut self, dom: &dyn Dom, event: MediaEvent) {
        let Some(props) = dom.media_properties(self.node) else {
            return;
        };
        match event {
            MediaEvent::Resize => self.refresh_dimensions(&props),
            MediaEvent::VolumeChange => {
                self.refresh_volume(&props);
                self.on_playback_state_changed(&props);
            }
            MediaEvent::LoadedMetadata
            | MediaEvent::DurationChange
            | MediaEvent::LoadedData
            | MediaEvent::CanPlay
            | MediaEvent::Play
            | MediaEvent::Pause
            | MediaEvent::Ended => self.on_playback_state_changed(&props),
        }
    }

    fn bind(&mut self, dom: &dyn Dom, event: MediaEvent) {
        self.entity.watch(dom, self.node, Interest::Media(event));
        // Seed state as if the event had just fired.
        self.handle(dom, event);
    }

    fn on_playback_state_changed(&mut self, props: &MediaProperties) {
        self.refresh_metadata(props);
        self.entity.set("playing", Value::Bool(props.is_playing()));
    }

    fn refresh_metadata(&mut self, props: &MediaProperties) {
        self.entity.set("src", Value::from(props.src.as_str()));
        self.entity.set("currentSrc", Value::from(props.current_src.as_str()));
        self.refresh_duration(props);
        if self.is_video() {
            self.refresh_dimensions(props);
        }
    }

    fn refresh_duration(&mut self, props: &MediaProperties) {
        let duration = props.duration.map(Value::from).unwrap_or(Value::Null);
        self.entity.set("duration", duration);
    }

    fn refresh_volume(&mut self, props: &MediaProperties) {
        self.entity.set("volume", Value::from(props.volume));
        self.entity.set("muted", Value::Bool(props.muted));
    }

    fn refresh_dimensions(&mut self, props: &MediaProperties) {
        self.entity.set("videoWidth", Value::from(props.video_width));
        self.entity.set("videoHeight", Value::from(props.video_height));
    }
}

impl Observer for MediaObserver {
    fn entity(&self) -> &ObservedEntity {
        &self.entity
    }

    fn attach(&mut self, dom: &dyn Dom) {
        if !self.entity.mark_initialized() {
            return;
        }
        for event in MediaEvent::PLAYBACK {
            self.bind(dom, event);
        }
        if self.is_video() {
            self.bind(dom, MediaEvent::Resize);
        }
        if let Some(props) = dom.media_properties(self.node) {
            self.on_playback_state_changed(&props);
        }
        tracing::debug!("Attached {} {}", self.entity.kind().as_str(), self.entity.id());
    }

    fn detach(&mut self, dom: &dyn Dom) {
        if self.entity.dispose(dom) {
            tracing::debug!("Detached {} {}", self.entity.kind().as_str(), self.entity.id());
        }
    }
}

use std::collections::HashMap;
use std::iter;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::config::ExtensionConfig;
use crate::dom::{Dom, DomEvent, Interest, MediaEvent, MutationRecord, NodeId, WatchId};
use crate::ids::EntityId;
use crate::observer::{EnvelopeSink, Lifecycle, MediaObserver, ObservedEntity, Observer, ScriptObserver};
use crate::protocol::{ChangeSet, EntityKind, PageEvent, TabInfo};

/// Page attributes that can be set by name from the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageProperty {
    Browser,
    ExtensionId,
    ExtensionVersion,
    TabId,
    Url,
    Title,
    Audible,
    Muted,
    Active,
    Disposed,
    YoutubeRecordingDetails,
    TimeStamp,
}

impl PageProperty {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "browser" => Self::Browser,
            "extensionId" => Self::ExtensionId,
            "extensionVersion" => Self::ExtensionVersion,
            "tabId" => Self::TabId,
            "url" => Self::Url,
            "title" => Self::Title,
            "audible" => Self::Audible,
            "muted" => Self::Muted,
            "active" => Self::Active,
            "disposed" => Self::Disposed,
            "youtubeRecordingDetails" => Self::YoutubeRecordingDetails,
            "timeStamp" => Self::TimeStamp,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::ExtensionId => "extensionId",
            Self::ExtensionVersion => "extensionVersion",
            Self::TabId => "tabId",
            Self::Url => "url",
            Self::Title => "title",
            Self::Audible => "audible",
            Self::Muted => "muted",
            Self::Active => "active",
            Self::Disposed => "disposed",
            Self::YoutubeRecordingDetails => "youtubeRecordingDetails",
            Self::TimeStamp => "timeStamp",
        }
    }
}

/// What a page event asks of the controller that owns the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Dispose this page and start a fresh one.
    Reset,
    /// Dispose this page.
    Dispose,
}

#[derive(Debug, Default)]
struct FrameState {
    load_watch: Option<WatchId>,
    document: Option<NodeId>,
    document_watch: Option<WatchId>,
}

/// Observer tree for one document load.
///
/// Keeps one child observer per `<audio>`, `<video>`, and `<script>` node in
/// the document and in every loaded `<iframe>` document below it, and reports
/// the page's own attributes as a `web-page` entity.
pub struct PageAggregator {
    entity: ObservedEntity,
    dom: Arc<dyn Dom>,
    sink: Arc<dyn EnvelopeSink>,
    delay: Duration,
    extension: ExtensionConfig,
    audio: HashMap<NodeId, MediaObserver>,
    video: HashMap<NodeId, MediaObserver>,
    scripts: HashMap<NodeId, ScriptObserver>,
    frames: HashMap<NodeId, FrameState>,
}

impl PageAggregator {
    pub fn new(
        dom: Arc<dyn Dom>,
        sink: Arc<dyn EnvelopeSink>,
        delay: Duration,
        extension: ExtensionConfig,
    ) -> Self {
        let mut entity = ObservedEntity::new(EntityKind::Page, None, Arc::clone(&sink), delay);
        entity.set(PageProperty::Disposed.as_str(), Value::Bool(false));
        entity.set(
            PageProperty::Browser.as_str(),
            Value::String(extension.browser.clone()),
        );
        Self {
            entity,
            dom,
            sink,
            delay,
            extension,
            audio: HashMap::new(),
            video: HashMap::new(),
            scripts: HashMap::new(),
            frames: HashMap::new(),
        }
    }

    pub fn id(&self) -> &EntityId {
        self.entity.id()
    }

    pub fn is_disposed(&self) -> bool {
        self.entity.lifecycle() == Lifecycle::Disposed
    }

    pub fn property(&self, property: PageProperty) -> Option<&Value> {
        self.entity.get(property.as_str())
    }

    pub fn set_property(&mut self, property: PageProperty, value: Value) -> bool {
        self.entity.set(property.as_str(), value)
    }

    /// Scan the document, start watching it, and report the initial state.
    /// Returns false if the page was already initialized or disposed.
    pub fn init(&mut self) -> bool {
        if !self.entity.mark_initialized() {
            return false;
        }
        let dom = Arc::clone(&self.dom);
        let document = dom.document();

        self.set_property(
            PageProperty::ExtensionId,
            Value::String(self.extension.id.clone()),
        );
        self.set_property(
            PageProperty::ExtensionVersion,
            Value::String(self.extension.version.clone()),
        );
        for node in dom.descendants(document) {
            self.adopt(node);
        }
        self.entity.watch(&*dom, document, Interest::Subtree);
        let now = self.get_current_time();
        self.set_property(PageProperty::TimeStamp, Value::from(now));

        tracing::debug!(
            "Page {} initialized: {} audio, {} video, {} script, {} frame(s)",
            self.id(),
            self.audio.len(),
            self.video.len(),
            self.scripts.len(),
            self.frames.len()
        );
        true
    }

    /// Dispose every child observer, then the page itself. Idempotent.
    pub fn dispose(&mut self) -> bool {
        if self.is_disposed() {
            return false;
        }
        let dom = Arc::clone(&self.dom);
        for (_, mut observer) in self.video.drain() {
            observer.detach(&*dom);
        }
        for (_, mut observer) in self.audio.drain() {
            observer.detach(&*dom);
        }
        for (_, mut observer) in self.scripts.drain() {
            observer.detach(&*dom);
        }
        for (_, frame) in self.frames.drain() {
            release_frame(&*dom, &frame);
        }
        self.set_property(PageProperty::Disposed, Value::Bool(true));
        self.entity.dispose(&*dom);
        tracing::debug!("Page {} disposed", self.id());
        true
    }

    /// Mirror tab metadata into page attributes.
    pub fn set_tab_info(&mut self, info: &TabInfo) {
        if let Some(url) = &info.url {
            self.set_property(PageProperty::Url, Value::String(url.clone()));
        }
        if let Some(tab) = info.tab_id {
            self.set_property(PageProperty::TabId, Value::from(tab.0));
        }
        if let Some(title) = &info.title {
            self.set_property(PageProperty::Title, Value::String(title.clone()));
        }
        if let Some(audible) = info.audible {
            self.set_property(PageProperty::Audible, Value::Bool(audible));
        }
        if let Some(muted) = info.muted {
            self.set_property(PageProperty::Muted, Value::Bool(muted));
        }
    }

    /// Resync every script's text, then return the current Unix time in seconds.
    pub fn get_current_time(&mut self) -> u64 {
        let dom = Arc::clone(&self.dom);
        for script in self.scripts.values_mut() {
            script.refresh(&*dom);
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn handle_dom_event(&mut self, event: DomEvent) {
        if self.is_disposed() {
            return;
        }
        match event {
            DomEvent::Mutations { watch, records } => {
                if self.watches_tree(watch) {
                    self.on_tree_mutations(&records);
                }
                let dom = Arc::clone(&self.dom);
                for script in self.scripts.values_mut() {
                    script.on_mutation(&*dom, watch);
                }
            }
            DomEvent::Media {
                watch,
                target,
                event,
            } => self.on_media_event(watch, target, event),
            DomEvent::Loaded { watch, target } => {
                let owned = self
                    .frames
                    .get(&target)
                    .is_some_and(|frame| frame.load_watch == Some(watch));
                if owned {
                    self.on_frame_loaded(target);
                }
            }
        }
    }

    /// Apply a coordinator event. Events the controller has to act on are
    /// returned instead of applied.
    pub fn handle_page_event(&mut self, event: PageEvent) -> Option<Control> {
        match event {
            PageEvent::Updated { change } => self.set_tab_info(&change),
            PageEvent::Activated => {
                self.set_property(PageProperty::Active, Value::Bool(true));
            }
            PageEvent::Deactivated => {
                self.set_property(PageProperty::Active, Value::Bool(false));
            }
            PageEvent::NewHostId => return Some(Control::Reset),
            PageEvent::Dispose => return Some(Control::Dispose),
            PageEvent::SetProperty { prop_name, value } => match PageProperty::from_name(&prop_name) {
                Some(property) => {
                    self.set_property(property, value);
                }
                None => tracing::debug!("Ignoring unknown page property {:?}", prop_name),
            },
            PageEvent::SetTimeStamp => {
                let now = self.get_current_time();
                self.set_property(PageProperty::TimeStamp, Value::from(now));
            }
        }
        None
    }

    /// Nodes currently backed by a child observer, in node order.
    pub fn observed_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .audio
            .keys()
            .chain(self.video.keys())
            .chain(self.scripts.keys())
            .copied()
            .collect();
        nodes.sort();
        nodes
    }

    pub fn audio_count(&self) -> usize {
        self.audio.len()
    }

    pub fn video_count(&self) -> usize {
        self.video.len()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.len()
    }

    /// Frames whose content document is being observed.
    pub fn frame_documents(&self) -> Vec<NodeId> {
        self.frames.values().filter_map(|frame| frame.document).collect()
    }

    pub fn current_state(&self) -> ChangeSet {
        self.entity.snapshot()
    }

    fn watches_tree(&self, watch: WatchId) -> bool {
        self.entity.owns(watch)
            || self
                .frames
                .values()
                .any(|frame| frame.document_watch == Some(watch))
    }

    fn on_tree_mutations(&mut self, records: &[MutationRecord]) {
        let location = self.dom.location();
        self.set_property(PageProperty::Url, Value::String(location));

        for record in records {
            for &node in &record.removed {
                self.evict_tree(node);
            }
            for &node in &record.added {
                self.adopt_tree(node);
            }
        }
    }

    fn on_media_event(&mut self, watch: WatchId, target: NodeId, event: MediaEvent) {
        let dom = Arc::clone(&self.dom);
        let observer = match self.video.get_mut(&target) {
            Some(observer) => observer,
            None => match self.audio.get_mut(&target) {
                Some(observer) => observer,
                None => return,
            },
        };
        observer.on_event(&*dom, watch, event);
        if observer.is_playing() {
            self.mark_audible();
        }
    }

    fn on_frame_loaded(&mut self, frame: NodeId) {
        let Some(document) = self.dom.content_document(frame) else {
            return;
        };
        let current = self.frames.get(&frame).and_then(|state| state.document);
        if current == Some(document) {
            return;
        }
        if let Some(previous) = current {
            self.release_frame_document(frame, previous);
        }
        self.observe_frame_document(frame, document);
    }

    /// A child media element started playing. Never cleared from here.
    fn mark_audible(&mut self) {
        self.set_property(PageProperty::Audible, Value::Bool(true));
    }

    fn adopt_tree(&mut self, root: NodeId) {
        let nodes: Vec<NodeId> = iter::once(root).chain(self.dom.descendants(root)).collect();
        for node in nodes {
            self.adopt(node);
        }
    }

    fn adopt(&mut self, node: NodeId) {
        let Some(tag) = self.dom.tag_name(node) else {
            return;
        };
        match tag.as_str() {
            "iframe" => self.observe_frame(node),
            "video" => self.adopt_media(node, true),
            "audio" => self.adopt_media(node, false),
            "script" => self.adopt_script(node),
            _ => {}
        }
    }

    fn adopt_media(&mut self, node: NodeId, video: bool) {
        let collection = if video { &self.video } else { &self.audio };
        if collection.contains_key(&node) {
            return;
        }
        let page_id = self.id().clone();
        let sink = Arc::clone(&self.sink);
        let mut observer = if video {
            MediaObserver::video(page_id, node, sink, self.delay)
        } else {
            MediaObserver::audio(page_id, node, sink, self.delay)
        };
        observer.attach(&*self.dom);
        let playing = observer.is_playing();
        if video {
            self.video.insert(node, observer);
        } else {
            self.audio.insert(node, observer);
        }
        if playing {
            self.mark_audible();
        }
    }

    fn adopt_script(&mut self, node: NodeId) {
        if self.scripts.contains_key(&node) {
            return;
        }
        let mut observer = ScriptObserver::new(self.id().clone(), node, Arc::clone(&self.sink), self.delay);
        observer.attach(&*self.dom);
        self.scripts.insert(node, observer);
    }

    fn observe_frame(&mut self, frame: NodeId) {
        if self.frames.contains_key(&frame) {
            return;
        }
        let load_watch = self.dom.observe(frame, Interest::Load);
        self.frames.insert(
            frame,
            FrameState {
                load_watch: Some(load_watch),
                ..Default::default()
            },
        );
        if let Some(document) = self.dom.content_document(frame) {
            self.observe_frame_document(frame, document);
        }
    }

    fn observe_frame_document(&mut self, frame: NodeId, document: NodeId) {
        let dom = Arc::clone(&self.dom);
        let watch = dom.observe(document, Interest::Subtree);
        if let Some(state) = self.frames.get_mut(&frame) {
            state.document = Some(document);
            state.document_watch = Some(watch);
        }
        for node in dom.descendants(document) {
            self.adopt(node);
        }
    }

    fn evict_tree(&mut self, root: NodeId) {
        let nodes: Vec<NodeId> = iter::once(root).chain(self.dom.descendants(root)).collect();
        for node in nodes {
            self.evict(node);
        }
    }

    fn evict(&mut self, node: NodeId) {
        let dom = Arc::clone(&self.dom);
        if let Some(mut observer) = self.video.remove(&node) {
            observer.detach(&*dom);
        }
        if let Some(mut observer) = self.audio.remove(&node) {
            observer.detach(&*dom);
        }
        if let Some(mut observer) = self.scripts.remove(&node) {
            observer.detach(&*dom);
        }
        if let Some(frame) = self.frames.remove(&node) {
            if let Some(watch) = frame.load_watch {
                dom.disconnect(watch);
            }
            if let Some(document) = frame.document {
                if let Some(watch) = frame.document_watch {
                    dom.disconnect(watch);
                }
                for inner in dom.descendants(document) {
                    self.evict(inner);
                }
            }
        }
    }

    fn release_frame_document(&mut self, frame: NodeId, document: NodeId) {
        let dom = Arc::clone(&self.dom);
        if let Some(state) = self.frames.get_mut(&frame) {
            if let Some(watch) = state.document_watch.take() {
                dom.disconnect(watch);
            }
            state.document = None;
        }
        for node in dom.descendants(document) {
            self.evict(node);
        }
    }
}

fn release_frame(dom: &dyn Dom, frame: &FrameState) {
    for watch in [frame.load_watch, frame.document_watch].into_iter().flatten() {
        dom.disconnect(watch);
    }
}

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Dom, DomEvent, Interest, MediaEvent, MediaProperties, MutationRecord, NodeId, WatchId};

#[derive(Debug)]
enum NodeKind {
    Document,
    Element(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    media: Option<MediaProperties>,
    text: String,
    content_document: Option<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            media: None,
            text: String::new(),
            content_document: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Watch {
    target: NodeId,
    interest: Interest,
}

struct Tree {
    nodes: HashMap<NodeId, NodeData>,
    watches: HashMap<WatchId, Watch>,
    next_node: u64,
    next_watch: u64,
    document: NodeId,
    location: String,
}

impl Tree {
    fn insert(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, data);
        id
    }

    /// `node` followed by its ancestors, stopping at a document root.
    fn ancestry(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = vec![node];
        let mut current = node;
        while let Some(parent) = self.nodes.get(&current).and_then(|n| n.parent) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Watches that see a child-list change on `target`.
    fn child_list_watches(&self, target: NodeId) -> Vec<WatchId> {
        let ancestry = self.ancestry(target);
        let mut ids: Vec<WatchId> = self
            .watches
            .iter()
            .filter(|(_, w)| match w.interest {
                Interest::ChildList => w.target == target,
                Interest::Subtree => ancestry.contains(&w.target),
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    fn watches_for(&self, target: NodeId, interest: Interest) -> Vec<WatchId> {
        let mut ids: Vec<WatchId> = self
            .watches
            .iter()
            .filter(|(_, w)| w.target == target && w.interest == interest)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    fn media_mut(&mut self, node: NodeId) -> Option<&mut MediaProperties> {
        self.nodes.get_mut(&node).and_then(|n| n.media.as_mut())
    }
}

/// In-memory document tree implementing [`Dom`].
///
/// Mutating methods behave like their browser counterparts: they update the
/// tree, then emit events to every matching watch on the channel returned by
/// [`MemoryDom::new`]. Used by scenario replay and by tests.
pub struct MemoryDom {
    tree: Mutex<Tree>,
    events: mpsc::UnboundedSender<DomEvent>,
}

impl MemoryDom {
    pub fn new(location: &str) -> (Self, mpsc::UnboundedReceiver<DomEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut tree = Tree {
            nodes: HashMap::new(),
            watches: HashMap::new(),
            next_node: 1,
            next_watch: 1,
            document: NodeId(0),
            location: location.to_string(),
        };
        tree.document = tree.insert(NodeData::new(NodeKind::Document));
        (
            Self {
                tree: Mutex::new(tree),
                events: tx,
            },
            rx,
        )
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let mut data = NodeData::new(NodeKind::Element(tag.clone()));
        if tag == "audio" || tag == "video" {
            data.media = Some(MediaProperties::default());
        }
        self.tree.lock().insert(data)
    }

    /// Attach `child` as the last child of `parent`, detaching it first if needed.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        if self.tree.lock().nodes.get(&child).and_then(|n| n.parent).is_some() {
            self.remove(child);
        }
        let watches = {
            let mut tree = self.tree.lock();
            if !tree.nodes.contains_key(&parent) {
                return;
            }
            if let Some(node) = tree.nodes.get_mut(&child) {
                node.parent = Some(parent);
            } else {
                return;
            }
            if let Some(node) = tree.nodes.get_mut(&parent) {
                node.children.push(child);
            }
            tree.child_list_watches(parent)
        };
        self.emit_mutation(
            watches,
            MutationRecord {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            },
        );
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(&self, parent: NodeId, tag: &str) -> NodeId {
        let node = self.create_element(tag);
        self.append_child(parent, node);
        node
    }

    /// Detach `node` from its parent. The detached subtree keeps its structure.
    pub fn remove(&self, node: NodeId) {
        let (parent, watches) = {
            let mut tree = self.tree.lock();
            let Some(parent) = tree.nodes.get(&node).and_then(|n| n.parent) else {
                return;
            };
            let watches = tree.child_list_watches(parent);
            if let Some(p) = tree.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node);
            }
            if let Some(n) = tree.nodes.get_mut(&node) {
                n.parent = None;
            }
            (parent, watches)
        };
        self.emit_mutation(
            watches,
            MutationRecord {
                target: parent,
                added: Vec::new(),
                removed: vec![node],
            },
        );
    }

    /// Change the location without any structural event, like `history.pushState`.
    pub fn set_location(&self, location: &str) {
        self.tree.lock().location = location.to_string();
    }

    /// Replace a script's text; reported as a child-list change of the script node.
    pub fn set_script_text(&self, node: NodeId, text: &str) {
        let watches = {
            let mut tree = self.tree.lock();
            match tree.nodes.get_mut(&node) {
                Some(n) => n.text = text.to_string(),
                None => return,
            }
            tree.child_list_watches(node)
        };
        self.emit_mutation(
            watches,
            MutationRecord {
                target: node,
                added: Vec::new(),
                removed: Vec::new(),
            },
        );
    }

    /// Replace a script's text without notifying anyone.
    pub fn set_script_text_silently(&self, node: NodeId, text: &str) {
        if let Some(n) = self.tree.lock().nodes.get_mut(&node) {
            n.text = text.to_string();
        }
    }

    /// Finish loading a frame: create its content document and fire `load`.
    pub fn load_frame(&self, frame: NodeId) -> Option<NodeId> {
        let (document, watches) = {
            let mut tree = self.tree.lock();
            match tree.nodes.get(&frame).map(|n| &n.kind) {
                Some(NodeKind::Element(tag)) if tag == "iframe" => {}
                _ => return None,
            }
            let existing = tree.nodes.get(&frame).and_then(|n| n.content_document);
            let document = match existing {
                Some(doc) => doc,
                None => {
                    let doc = tree.insert(NodeData::new(NodeKind::Document));
                    if let Some(n) = tree.nodes.get_mut(&frame) {
                        n.content_document = Some(doc);
                    }
                    doc
                }
            };
            (document, tree.watches_for(frame, Interest::Load))
        };
        for watch in watches {
            self.emit(DomEvent::Loaded {
                watch,
                target: frame,
            });
        }
        Some(document)
    }

    pub fn load_metadata(&self, node: NodeId, src: &str, duration: f64) {
        self.update_media(node, &[MediaEvent::LoadedMetadata, MediaEvent::DurationChange], |m| {
            m.src = src.to_string();
            m.current_src = src.to_string();
            m.duration = Some(duration);
        });
    }

    pub fn play(&self, node: NodeId) {
        self.update_media(node, &[MediaEvent::Play], |m| {
            m.paused = false;
            m.ended = false;
        });
    }

    pub fn pause(&self, node: NodeId) {
        self.update_media(node, &[MediaEvent::Pause], |m| m.paused = true);
    }

    /// Playback reached the end of the media.
    pub fn end(&self, node: NodeId) {
        self.update_media(node, &[MediaEvent::Pause, MediaEvent::Ended], |m| {
            m.paused = true;
            m.ended = true;
        });
    }

    pub fn set_volume(&self, node: NodeId, volume: f64, muted: bool) {
        self.update_media(node, &[MediaEvent::VolumeChange], |m| {
            m.volume = volume;
            m.muted = muted;
        });
    }

    pub fn resize(&self, node: NodeId, width: u32, height: u32) {
        self.update_media(node, &[MediaEvent::Resize], |m| {
            m.video_width = width;
            m.video_height = height;
        });
    }

    /// Number of live watches, across all targets.
    pub fn watch_count(&self) -> usize {
        self.tree.lock().watches.len()
    }

    fn update_media<F>(&self, node: NodeId, events: &[MediaEvent], update: F)
    where
        F: FnOnce(&mut MediaProperties),
    {
        let deliveries: Vec<(WatchId, MediaEvent)> = {
            let mut tree = self.tree.lock();
            match tree.media_mut(node) {
                Some(media) => update(media),
                None => return,
            }
            events
                .iter()
                .flat_map(|event| {
                    tree.watches_for(node, Interest::Media(*event))
                        .into_iter()
                        .map(move |watch| (watch, *event))
                })
                .collect()
        };
        for (watch, event) in deliveries {
            self.emit(DomEvent::Media {
                watch,
                target: node,
                event,
            });
        }
    }

    fn emit_mutation(&self, watches: Vec<WatchId>, record: MutationRecord) {
        for watch in watches {
            self.emit(DomEvent::Mutations {
                watch,
                records: vec![record.clone()],
            });
        }
    }

    fn emit(&self, event: DomEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No listener for document events");
        }
    }
}

impl Dom for MemoryDom {
    fn document(&self) -> NodeId {
        self.tree.lock().document
    }

    fn location(&self) -> String {
        self.tree.lock().location.clone()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        match &self.tree.lock().nodes.get(&node)?.kind {
            NodeKind::Element(tag) => Some(tag.clone()),
            NodeKind::Document => None,
        }
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.tree.lock();
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match tree.nodes.get(&node) {
            Some(n) => n.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(n) = tree.nodes.get(&id) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    fn content_document(&self, frame: NodeId) -> Option<NodeId> {
        self.tree.lock().nodes.get(&frame)?.content_document
    }

    fn media_properties(&self, node: NodeId) -> Option<MediaProperties> {
        self.tree.lock().nodes.get(&node)?.media.clone()
    }

    fn script_text(&self, node: NodeId) -> Option<String> {
        let tree = self.tree.lock();
        let data = tree.nodes.get(&node)?;
        match &data.kind {
            NodeKind::Element(tag) if tag == "script" => Some(data.text.clone()),
            _ => None,
        }
    }

    fn observe(&self, target: NodeId, interest: Interest) -> WatchId {
        let mut tree = self.tree.lock();
        let id = WatchId(tree.next_watch);
        tree.next_watch += 1;
        tree.watches.insert(id, Watch { target, interest });
        id
    }

    fn disconnect(&self, watch: WatchId) {
        self.tree.lock().watches.remove(&watch);
    }
}

//! The document capability that observers are attached to.
//!
//! Pages never walk a live browser DOM directly. Everything they need is
//! expressed through the [`Dom`] trait: tree queries, element properties, and
//! watch registration. Registered watches deliver [`DomEvent`]s on the event
//! stream handed out by the implementation; disconnecting a watch stops its
//! delivery.

mod memory;

pub use memory::MemoryDom;

use serde::{Deserialize, Serialize};

/// Handle of a node in the observed tree. Stable while the node exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Handle of a registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// Native media element events observers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEvent {
    LoadedMetadata,
    DurationChange,
    /// Fired for both volume and mute changes.
    VolumeChange,
    LoadedData,
    CanPlay,
    Play,
    Pause,
    Ended,
    /// Video only.
    Resize,
}

impl MediaEvent {
    /// Events every media element observer listens to.
    pub const PLAYBACK: [MediaEvent; 8] = [
        MediaEvent::LoadedMetadata,
        MediaEvent::DurationChange,
        MediaEvent::VolumeChange,
        MediaEvent::LoadedData,
        MediaEvent::CanPlay,
        MediaEvent::Play,
        MediaEvent::Pause,
        MediaEvent::Ended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaEvent::LoadedMetadata => "loadedmetadata",
            MediaEvent::DurationChange => "durationchange",
            MediaEvent::VolumeChange => "volumechange",
            MediaEvent::LoadedData => "loadeddata",
            MediaEvent::CanPlay => "canplay",
            MediaEvent::Play => "play",
            MediaEvent::Pause => "pause",
            MediaEvent::Ended => "ended",
            MediaEvent::Resize => "resize",
        }
    }
}

/// What a watch asks to be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Child-list changes anywhere under the target.
    Subtree,
    /// Child-list changes of the target itself.
    ChildList,
    /// One native media event on the target element.
    Media(MediaEvent),
    /// The `load` event of a frame element.
    Load,
}

/// One structural change: children added to or removed from `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    Mutations {
        watch: WatchId,
        records: Vec<MutationRecord>,
    },
    Media {
        watch: WatchId,
        target: NodeId,
        event: MediaEvent,
    },
    Loaded {
        watch: WatchId,
        target: NodeId,
    },
}

impl DomEvent {
    pub fn watch(&self) -> WatchId {
        match self {
            DomEvent::Mutations { watch, .. }
            | DomEvent::Media { watch, .. }
            | DomEvent::Loaded { watch, .. } => *watch,
        }
    }
}

/// Snapshot of the native properties of an `<audio>` or `<video>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProperties {
    pub paused: bool,
    pub ended: bool,
    pub src: String,
    pub current_src: String,
    /// `None` until metadata is known.
    pub duration: Option<f64>,
    pub volume: f64,
    pub muted: bool,
    pub video_width: u32,
    pub video_height: u32,
}

impl Default for MediaProperties {
    fn default() -> Self {
        Self {
            paused: true,
            ended: false,
            src: String::new(),
            current_src: String::new(),
            duration: None,
            volume: 1.0,
            muted: false,
            video_width: 0,
            video_height: 0,
        }
    }
}

impl MediaProperties {
    pub fn is_playing(&self) -> bool {
        !self.paused && !self.ended
    }
}

/// Capability over a live document tree.
pub trait Dom: Send + Sync {
    /// Root node of the top-level document.
    fn document(&self) -> NodeId;

    /// Current location href of the top-level document.
    fn location(&self) -> String;

    /// Lowercase tag name, or `None` for anything that is not an element.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// Element descendants of `node` in tree order, excluding `node` itself.
    fn descendants(&self, node: NodeId) -> Vec<NodeId>;

    /// Loaded content document of a frame element.
    fn content_document(&self, frame: NodeId) -> Option<NodeId>;

    fn media_properties(&self, node: NodeId) -> Option<MediaProperties>;

    fn script_text(&self, node: NodeId) -> Option<String>;

    /// Register a watch. Events for it arrive on the implementation's event stream.
    fn observe(&self, target: NodeId, interest: Interest) -> WatchId;

    /// Stop delivery for a watch. Unknown or already disconnected ids are ignored.
    fn disconnect(&self, watch: WatchId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_event_names_match_dom() {
        assert_eq!(MediaEvent::LoadedMetadata.as_str(), "loadedmetadata");
        assert_eq!(MediaEvent::VolumeChange.as_str(), "volumechange");
        assert_eq!(
            serde_json::to_value(MediaEvent::DurationChange).unwrap(),
            serde_json::json!("durationchange")
        );
    }

    #[test]
    fn test_default_media_properties_are_not_playing() {
        let props = MediaProperties::default();
        assert!(!props.is_playing());

        let ended = MediaProperties {
            paused: false,
            ended: true,
            ..Default::default()
        };
        assert!(!ended.is_playing());
    }
}

//! Wire types for both hops: page → coordinator → native host, and the
//! events the coordinator sends back to pages.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EntityId;

/// Browser tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag carried by every outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "web-page")]
    Page,
    #[serde(rename = "web-audio-element")]
    Audio,
    #[serde(rename = "web-video-element")]
    Video,
    #[serde(rename = "web-script-node")]
    Script,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Page => "web-page",
            EntityKind::Audio => "web-audio-element",
            EntityKind::Video => "web-video-element",
            EntityKind::Script => "web-script-node",
        }
    }
}

/// Fixed part of every message an entity sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prefix {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: EntityId,
    #[serde(rename = "pageId", skip_serializing_if = "Option::is_none")]
    pub page_id: Option<EntityId>,
}

/// Attribute name → new value for everything that changed since the last flush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(Map<String, Value>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(name: &str, value: Value) -> Self {
        let mut change = Self::new();
        change.insert(name, value);
        change
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge; keys in `other` win.
    pub fn merge(&mut self, other: ChangeSet) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// `{type, id, pageId?, ...changedFields}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub prefix: Prefix,
    #[serde(flatten)]
    pub changes: ChangeSet,
}

impl Envelope {
    /// `{type: "web-page", id, disposed: true}`
    pub fn page_disposed(page_id: EntityId) -> Self {
        Self {
            prefix: Prefix {
                kind: EntityKind::Page,
                id: page_id,
                page_id: None,
            },
            changes: ChangeSet::single("disposed", Value::Bool(true)),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Tab metadata a page mirrors into its own state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "tabId", default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

impl TabInfo {
    /// Project a browser tab record (or a partial change record) onto tab info.
    pub fn from_tab(tab: &Tab) -> Self {
        Self {
            url: tab.url.clone(),
            tab_id: tab.id,
            title: tab.title.clone(),
            audible: tab.audible,
            muted: tab.muted_info.as_ref().and_then(|m| m.muted),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.tab_id.is_none()
            && self.title.is_none()
            && self.audible.is_none()
            && self.muted.is_none()
    }
}

/// Browser tab record, as reported by the tab inventory. Every field is
/// optional so the same shape serves as a partial update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    #[serde(default)]
    pub id: Option<TabId>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audible: Option<bool>,
    #[serde(default)]
    pub muted_info: Option<MutedInfo>,
}

impl Tab {
    /// Overlay the fields present in `change`.
    pub fn apply(&mut self, change: &Tab) {
        if change.url.is_some() {
            self.url = change.url.clone();
        }
        if change.title.is_some() {
            self.title = change.title.clone();
        }
        if change.audible.is_some() {
            self.audible = change.audible;
        }
        if change.muted_info.is_some() {
            self.muted_info = change.muted_info.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutedInfo {
    #[serde(default)]
    pub muted: Option<bool>,
}

/// Coordinator → page events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PageEvent {
    #[serde(rename = "tabs.onUpdated")]
    Updated { change: TabInfo },
    #[serde(rename = "tabs.onActivated")]
    Activated,
    #[serde(rename = "tabs.onDeactivated")]
    Deactivated,
    #[serde(rename = "tabs.newHostId")]
    NewHostId,
    #[serde(rename = "tabs.dispose")]
    Dispose,
    #[serde(rename = "tabs.setProperty")]
    SetProperty {
        #[serde(rename = "propName")]
        prop_name: String,
        value: Value,
    },
    #[serde(rename = "tabs.setTimeStamp")]
    SetTimeStamp,
}

/// Browser → coordinator tab lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    TabRemoved(TabId),
    TabUpdated(TabId, Tab),
    TabActivated(TabId),
}

/// One flush of the coordinator queue, as sent to every native host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(rename = "instanceId")]
    pub instance_id: EntityId,
    pub changes: Vec<Value>,
}

/// Native host reply. Anything besides `hostId` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostReply {
    #[serde(rename = "hostId", default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_flattens_prefix_and_changes() {
        let mut changes = ChangeSet::new();
        changes.insert("playing", json!(false));
        changes.insert("src", json!("https://cdn.example/a.mp4"));
        let envelope = Envelope {
            prefix: Prefix {
                kind: EntityKind::Video,
                id: EntityId::from("aaaaaaaaaaaaaaaa-bbbbbbbbbbbbbbbb"),
                page_id: Some(EntityId::from("cccccccccccccccc-dddddddddddddddd")),
            },
            changes,
        };

        assert_eq!(
            envelope.to_value(),
            json!({
                "type": "web-video-element",
                "id": "aaaaaaaaaaaaaaaa-bbbbbbbbbbbbbbbb",
                "pageId": "cccccccccccccccc-dddddddddddddddd",
                "playing": false,
                "src": "https://cdn.example/a.mp4",
            })
        );
    }

    #[test]
    fn test_page_disposed_notice_shape() {
        let notice = Envelope::page_disposed(EntityId::from("0000000000000000-1111111111111111"));
        assert_eq!(
            notice.to_value(),
            json!({"type": "web-page", "id": "0000000000000000-1111111111111111", "disposed": true})
        );
    }

    #[test]
    fn test_merge_is_last_write_wins() {
        let mut a = ChangeSet::single("volume", json!(0.5));
        a.insert("muted", json!(false));
        a.merge(ChangeSet::single("volume", json!(0.25)));

        assert_eq!(a.get("volume"), Some(&json!(0.25)));
        assert_eq!(a.get("muted"), Some(&json!(false)));
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_tab_info_projection() {
        let tab: Tab = serde_json::from_value(json!({
            "id": 7,
            "url": "https://example.com/watch",
            "title": "Watch",
            "audible": true,
            "mutedInfo": {"muted": false},
            "pinned": true
        }))
        .unwrap();

        let info = TabInfo::from_tab(&tab);
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"url": "https://example.com/watch", "tabId": 7, "title": "Watch", "audible": true, "muted": false})
        );

        let status_only: Tab = serde_json::from_value(json!({"status": "loading"})).unwrap();
        assert!(TabInfo::from_tab(&status_only).is_empty());
    }

    #[test]
    fn test_page_event_wire_names() {
        assert_eq!(
            serde_json::to_value(PageEvent::NewHostId).unwrap(),
            json!({"event": "tabs.newHostId"})
        );
        let event: PageEvent = serde_json::from_value(json!({
            "event": "tabs.setProperty",
            "propName": "youtubeRecordingDetails",
            "value": {"location": "studio"}
        }))
        .unwrap();
        assert_eq!(
            event,
            PageEvent::SetProperty {
                prop_name: "youtubeRecordingDetails".to_string(),
                value: json!({"location": "studio"}),
            }
        );
    }

    #[test]
    fn test_host_reply_ignores_unknown_fields() {
        let reply: HostReply =
            serde_json::from_value(json!({"hostId": "h-1", "status": "ok"})).unwrap();
        assert_eq!(reply.host_id.as_deref(), Some("h-1"));

        let empty: HostReply = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.host_id, None);
    }
}

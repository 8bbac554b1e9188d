//! Scripted page sessions for `mediascope replay`.
//!
//! A scenario is a TOML file describing a page load and a sequence of steps
//! applied to a [`MemoryDom`]:
//!
//! ```toml
//! url = "https://example.com/watch"
//! title = "Watch"
//!
//! [[steps]]
//! action = "append"
//! id = "player"
//! tag = "video"
//!
//! [[steps]]
//! action = "play"
//! node = "player"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::dom::{Dom, MemoryDom, NodeId};
use crate::error::{MediascopeError, Result};
use crate::protocol::{MutedInfo, Tab, TabId};

/// Name under which steps refer to the top-level document.
pub const DOCUMENT: &str = "document";

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_tab_id")]
    pub tab_id: u32,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_tab_id() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    /// Create `tag` under `parent` (the document by default) and name it `id`.
    Append {
        id: String,
        tag: String,
        #[serde(default)]
        parent: Option<String>,
    },
    Remove {
        node: String,
    },
    /// Load an iframe; its content document becomes available as `id`.
    LoadFrame {
        node: String,
        #[serde(default)]
        id: Option<String>,
    },
    Metadata {
        node: String,
        src: String,
        duration: f64,
    },
    Play {
        node: String,
    },
    Pause {
        node: String,
    },
    End {
        node: String,
    },
    SetText {
        node: String,
        text: String,
    },
    SetVolume {
        node: String,
        volume: f64,
        #[serde(default)]
        muted: bool,
    },
    Resize {
        node: String,
        width: u32,
        height: u32,
    },
    /// Change the location without a structural change.
    Navigate {
        url: String,
    },
    Wait {
        ms: u64,
    },
    Activate {
        #[serde(default)]
        tab: Option<u32>,
    },
    UpdateTab {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        audible: Option<bool>,
        #[serde(default)]
        muted: Option<bool>,
    },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MediascopeError::ScenarioError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MediascopeError::ScenarioError(e.to_string()))
    }

    pub fn tab(&self) -> TabId {
        TabId(self.tab_id)
    }

    /// The browser's record for the scenario tab at load time.
    pub fn tab_record(&self) -> Tab {
        Tab {
            id: Some(self.tab()),
            url: Some(self.url.clone()),
            title: self.title.clone(),
            audible: Some(false),
            muted_info: Some(MutedInfo { muted: Some(false) }),
        }
    }
}

/// What the driver has to do after a step, beyond the DOM change.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    Wait(Duration),
    Activate(Option<TabId>),
    UpdateTab(Tab),
}

/// Applies steps to a [`MemoryDom`], resolving node names.
pub struct Stage {
    dom: Arc<MemoryDom>,
    nodes: HashMap<String, NodeId>,
}

impl Stage {
    pub fn new(dom: Arc<MemoryDom>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(DOCUMENT.to_string(), dom.document());
        Self { dom, nodes }
    }

    pub fn node(&self, name: &str) -> Result<NodeId> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| MediascopeError::ScenarioError(format!("Unknown node {:?}", name)))
    }

    pub fn apply(&mut self, step: &Step) -> Result<Effect> {
        match step {
            Step::Append { id, tag, parent } => {
                if self.nodes.contains_key(id) {
                    return Err(MediascopeError::ScenarioError(format!(
                        "Node {:?} already exists",
                        id
                    )));
                }
                let parent = self.node(parent.as_deref().unwrap_or(DOCUMENT))?;
                let node = self.dom.append_element(parent, tag);
                self.nodes.insert(id.clone(), node);
            }
            Step::Remove { node } => self.dom.remove(self.node(node)?),
            Step::LoadFrame { node, id } => {
                let frame = self.node(node)?;
                let document = self.dom.load_frame(frame).ok_or_else(|| {
                    MediascopeError::ScenarioError(format!("{:?} is not an iframe", node))
                })?;
                if let Some(id) = id {
                    self.nodes.insert(id.clone(), document);
                }
            }
            Step::Metadata {
                node,
                src,
                duration,
            } => self.dom.load_metadata(self.node(node)?, src, *duration),
            Step::Play { node } => self.dom.play(self.node(node)?),
            Step::Pause { node } => self.dom.pause(self.node(node)?),
            Step::End { node } => self.dom.end(self.node(node)?),
            Step::SetText { node, text } => self.dom.set_script_text(self.node(node)?, text),
            Step::SetVolume {
                node,
                volume,
                muted,
            } => self.dom.set_volume(self.node(node)?, *volume, *muted),
            Step::Resize {
                node,
                width,
                height,
            } => self.dom.resize(self.node(node)?, *width, *height),
            Step::Navigate { url } => self.dom.set_location(url),
            Step::Wait { ms } => return Ok(Effect::Wait(Duration::from_millis(*ms))),
            Step::Activate { tab } => return Ok(Effect::Activate(tab.map(TabId))),
            Step::UpdateTab {
                url,
                title,
                audible,
                muted,
            } => {
                return Ok(Effect::UpdateTab(Tab {
                    id: None,
                    url: url.clone(),
                    title: title.clone(),
                    audible: *audible,
                    muted_info: muted.map(|muted| MutedInfo { muted: Some(muted) }),
                }))
            }
        }
        Ok(Effect::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
url = "https://example.com/watch"
title = "Watch"
tab_id = 7

[[steps]]
action = "append"
id = "frame"
tag = "iframe"

[[steps]]
action = "load-frame"
node = "frame"
id = "inner"

[[steps]]
action = "append"
id = "clip"
tag = "audio"
parent = "inner"

[[steps]]
action = "set-volume"
node = "clip"
volume = 0.5

[[steps]]
action = "wait"
ms = 40

[[steps]]
action = "update-tab"
title = "Renamed"
muted = true
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        assert_eq!(scenario.tab(), TabId(7));
        assert_eq!(scenario.steps.len(), 6);
        assert_eq!(
            scenario.steps[3],
            Step::SetVolume {
                node: "clip".to_string(),
                volume: 0.5,
                muted: false,
            }
        );
    }

    #[test]
    fn test_unknown_action_is_scenario_error() {
        let err = Scenario::parse("url = \"https://a/\"\n[[steps]]\naction = \"explode\"\n").unwrap_err();
        assert!(matches!(err, MediascopeError::ScenarioError(_)));
    }

    #[test]
    fn test_stage_resolves_frame_documents() {
        let scenario = Scenario::parse(SCENARIO).unwrap();
        let (dom, _events) = MemoryDom::new(&scenario.url);
        let dom = Arc::new(dom);
        let mut stage = Stage::new(dom.clone());

        let effects: Vec<Effect> = scenario
            .steps
            .iter()
            .map(|step| stage.apply(step).unwrap())
            .collect();

        let clip = stage.node("clip").unwrap();
        assert_eq!(dom.tag_name(clip).as_deref(), Some("audio"));
        let inner = stage.node("inner").unwrap();
        assert_eq!(dom.tag_name(inner), None);
        assert_eq!(dom.content_document(stage.node("frame").unwrap()), Some(inner));
        assert!(dom.descendants(inner).contains(&clip));
        assert!(stage.node("missing").is_err());
        assert_eq!(effects[4], Effect::Wait(Duration::from_millis(40)));
        match &effects[5] {
            Effect::UpdateTab(tab) => {
                assert_eq!(tab.title.as_deref(), Some("Renamed"));
                assert_eq!(tab.muted_info.as_ref().and_then(|m| m.muted), Some(true));
            }
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_unknown_node_is_scenario_error() {
        let (dom, _events) = MemoryDom::new("https://example.com/");
        let mut stage = Stage::new(Arc::new(dom));

        let err = stage
            .apply(&Step::Play {
                node: "missing".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, MediascopeError::ScenarioError(_)));
    }
}

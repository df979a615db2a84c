//! Flow node wire format and the typed node model parsed from it.
//!
//! Nodes arrive as `{ id, type, properties }` with a loose property bag. The bag is
//! parsed once, when the tree is loaded, into a [`NodeKind`] variant holding only the
//! fields that node type uses. Missing fields stay `None`; handlers decide what a gap
//! means.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A node as the editor sends it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, properties: Value) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            properties: match properties {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// How a `selector` string should be read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    Id,
    Class,
    Name,
    Xpath,
    #[default]
    Css,
}

/// Element target shared by every node that acts on the page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub selector_type: Option<SelectorType>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BrowserAction {
    Goto,
    Back,
    Forward,
    Reload,
    Close,
    Maximize,
    Minimize,
    Click,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserProps {
    pub action_type: Option<BrowserAction>,
    pub url: Option<String>,
    pub wait_for_load: bool,
    /// Seconds
    pub timeout: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub user_agent: Option<String>,
    pub click_selector: Option<String>,
    pub click_selector_type: Option<SelectorType>,
    pub wait_after_click: bool,
    /// Seconds
    pub click_timeout: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClickProps {
    #[serde(flatten)]
    pub target: Target,
    pub wait_after_click: bool,
    /// Seconds
    pub click_timeout: Option<f64>,
    /// Seconds
    pub timeout: Option<f64>,
    pub use_loop_element: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InputProps {
    #[serde(flatten)]
    pub target: Target,
    pub text: Option<String>,
    pub clear_first: bool,
    pub simulate_typing: bool,
    /// Milliseconds between characters
    pub typing_delay: Option<u64>,
    pub wait_after_input: bool,
    /// Seconds
    pub wait_timeout: Option<f64>,
    /// Seconds
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExtractType {
    Text,
    Attribute,
    Html,
    List,
    Table,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ListItemType {
    #[default]
    Text,
    Html,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FilterType {
    Regex,
    Contains,
    NotContains,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterProps {
    pub enable_filter: bool,
    pub filter_type: Option<FilterType>,
    /// Accepts a string or a number from the editor
    pub filter_value: Option<Value>,
    pub case_sensitive: Option<bool>,
    pub numeric: bool,
    pub filter_column: Option<usize>,
}

impl FilterProps {
    pub fn filter_value_text(&self) -> Option<String> {
        match self.filter_value.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractProps {
    #[serde(flatten)]
    pub target: Target,
    pub extract_type: Option<ExtractType>,
    pub attribute_name: Option<String>,
    pub variable_name: Option<String>,
    pub list_item_type: Option<ListItemType>,
    pub header_selector: Option<String>,
    pub row_selector: Option<String>,
    pub cell_selector: Option<String>,
    pub append: bool,
    pub use_loop_element: bool,
    /// Seconds
    pub timeout: Option<f64>,
    #[serde(flatten)]
    pub filter: FilterProps,
}

impl ExtractProps {
    /// Parse a standalone property bag, as sent for extraction previews.
    pub fn from_value(properties: Value) -> Result<Self> {
        serde_json::from_value(properties).map_err(|e| FlowError::InvalidNode {
            id: "preview".to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum KeyboardAction {
    Press,
    Type,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyboardProps {
    #[serde(flatten)]
    pub target: Target,
    pub action_type: Option<KeyboardAction>,
    pub key: Option<String>,
    pub modifiers: Vec<String>,
    pub text: Option<String>,
    /// Milliseconds between characters
    pub delay: Option<u64>,
    /// Seconds
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MouseAction {
    MoveToElement,
    MoveToPosition,
    ScrollToElement,
    ScrollToPosition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MouseProps {
    #[serde(flatten)]
    pub target: Target,
    pub action_type: Option<MouseAction>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub smooth: bool,
    /// Seconds
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScrollKind {
    Element,
    Position,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrollProps {
    #[serde(flatten)]
    pub target: Target,
    pub scroll_type: Option<ScrollKind>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub smooth: bool,
    /// Milliseconds to settle after scrolling
    pub scroll_delay: Option<u64>,
    /// Seconds
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WaitKind {
    Timeout,
    Visible,
    Exists,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitProps {
    #[serde(flatten)]
    pub target: Target,
    pub wait_type: Option<WaitKind>,
    /// Seconds
    pub timeout: Option<f64>,
    pub reverse: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScreenshotKind {
    FullPage,
    Viewport,
    Element,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenshotProps {
    #[serde(flatten)]
    pub target: Target,
    pub screenshot_type: Option<ScreenshotKind>,
    pub path: Option<String>,
    pub omit_background: bool,
    pub quality: Option<u8>,
    /// Seconds
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SwitchCondition {
    Exists,
    NotExists,
    Visible,
    NotVisible,
    Clickable,
    NotClickable,
    TextEquals,
    TextNotEquals,
    TextContains,
    TextNotContains,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchProps {
    #[serde(flatten)]
    pub target: Target,
    pub condition: Option<SwitchCondition>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoopType {
    Count,
    Elements,
    Condition,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoopCondition {
    Exists,
    Visible,
    Hidden,
    Clickable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopProps {
    #[serde(flatten)]
    pub target: Target,
    pub loop_type: Option<LoopType>,
    pub count: Option<u64>,
    pub condition: Option<LoopCondition>,
}

/// Typed node payload, one variant per node type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Start,
    End,
    Browser(BrowserProps),
    Click(ClickProps),
    Input(InputProps),
    Extract(ExtractProps),
    Keyboard(KeyboardProps),
    Mouse(MouseProps),
    Wait(WaitProps),
    Screenshot(ScreenshotProps),
    Switch(SwitchProps),
    Loop(LoopProps),
    Scroll(ScrollProps),
}

impl NodeKind {
    pub fn parse(node: &FlowNode) -> Result<Self> {
        let props = Value::Object(node.properties.clone());
        let invalid = |e: serde_json::Error| FlowError::InvalidNode {
            id: node.id.clone(),
            reason: e.to_string(),
        };

        let kind = match node.node_type.as_str() {
            "start" => NodeKind::Start,
            "end" => NodeKind::End,
            "browser" => NodeKind::Browser(serde_json::from_value(props).map_err(invalid)?),
            "click" => NodeKind::Click(serde_json::from_value(props).map_err(invalid)?),
            "input" => NodeKind::Input(serde_json::from_value(props).map_err(invalid)?),
            "extract" => NodeKind::Extract(serde_json::from_value(props).map_err(invalid)?),
            "keyboard" => NodeKind::Keyboard(serde_json::from_value(props).map_err(invalid)?),
            "mouse" => NodeKind::Mouse(serde_json::from_value(props).map_err(invalid)?),
            "wait" => NodeKind::Wait(serde_json::from_value(props).map_err(invalid)?),
            "screenshot" => NodeKind::Screenshot(serde_json::from_value(props).map_err(invalid)?),
            "switch" => NodeKind::Switch(serde_json::from_value(props).map_err(invalid)?),
            "loop" => NodeKind::Loop(serde_json::from_value(props).map_err(invalid)?),
            "scroll" => NodeKind::Scroll(serde_json::from_value(props).map_err(invalid)?),
            other => return Err(FlowError::UnknownNodeType(other.to_string())),
        };
        Ok(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Browser(_) => "browser",
            NodeKind::Click(_) => "click",
            NodeKind::Input(_) => "input",
            NodeKind::Extract(_) => "extract",
            NodeKind::Keyboard(_) => "keyboard",
            NodeKind::Mouse(_) => "mouse",
            NodeKind::Wait(_) => "wait",
            NodeKind::Screenshot(_) => "screenshot",
            NodeKind::Switch(_) => "switch",
            NodeKind::Loop(_) => "loop",
            NodeKind::Scroll(_) => "scroll",
        }
    }
}

/// Which switch outcome a child node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    True,
    False,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub branch: Option<Branch>,
    pub kind: NodeKind,
}

/// A validated node tree. Node order is the input array order.
#[derive(Debug, Clone, Default)]
pub struct FlowTree {
    nodes: Vec<TreeNode>,
    index: HashMap<String, usize>,
}

impl FlowTree {
    pub fn parse(nodes: &[FlowNode]) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(FlowError::InvalidNode {
                    id: node.id.clone(),
                    reason: "duplicate node id".to_string(),
                });
            }
        }

        let mut parsed = Vec::with_capacity(nodes.len());
        for node in nodes {
            let parent_id = node
                .properties
                .get("parentId")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let branch = match node.properties.get("branchType").and_then(|v| v.as_str()) {
                Some("true") => Some(Branch::True),
                Some("false") => Some(Branch::False),
                _ => None,
            };
            parsed.push(TreeNode {
                id: node.id.clone(),
                parent_id,
                branch,
                kind: NodeKind::parse(node)?,
            });
        }

        Ok(Self {
            nodes: parsed,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes whose parent is absent or not part of the tree, in array order.
    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.iter().filter(move |n| match &n.parent_id {
            Some(parent) => !self.index.contains_key(parent),
            None => true,
        })
    }

    /// Direct children of `id`, in array order.
    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a TreeNode> {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id.as_deref() == Some(id))
    }
}

//! In-memory document used by the CLI bridge and the test-suite.
//!
//! A `MemoryDocument` holds a small element tree with tags, ids, classes,
//! text and input values. Queries understand three forms:
//! - `#id`
//! - `.class`
//! - a tag name such as `button`
//!
//! Hidden elements never match. Every effect is recorded so callers can
//! assert on what the engine did.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use tm_protocol::run_models::Key;

use super::{ElementHandle, ElementInfo, EnvError, Environment};
use crate::config::error::{ConfigError, ConfigResult};

const INPUT_TAGS: [&str; 3] = ["input", "select", "textarea"];

/// Serializable description of a document, e.g. loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFixture {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub nodes: Vec<NodeFixture>,
}

impl DocumentFixture {
    /// Reads a fixture from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileRead` if the file cannot be read and
    /// `ConfigError::FixtureParse` if it is not a valid fixture.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::FixtureParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A single element and its children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeFixture {
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeFixture>,
}

impl NodeFixture {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_child(mut self, child: NodeFixture) -> Self {
        self.children.push(child);
        self
    }
}

/// An effect applied to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Click(ElementHandle),
    SetValue(ElementHandle, String),
    PressKey(ElementHandle, Key),
    Reload,
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    dom_id: Option<String>,
    classes: Vec<String>,
    text: String,
    value: Option<String>,
    hidden: bool,
    parent: Option<usize>,
    removed: bool,
}

#[derive(Debug)]
struct DocState {
    url: String,
    nodes: Vec<Node>,
    interactions: Vec<Interaction>,
    initial: DocumentFixture,
}

impl DocState {
    fn load(fixture: DocumentFixture) -> Self {
        let mut state = Self {
            url: fixture.url.clone(),
            nodes: Vec::new(),
            interactions: Vec::new(),
            initial: DocumentFixture::default(),
        };
        for node in &fixture.nodes {
            state.insert(None, node);
        }
        state.initial = fixture;
        state
    }

    fn insert(&mut self, parent: Option<usize>, fixture: &NodeFixture) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            tag: fixture.tag.to_lowercase(),
            dom_id: fixture.id.clone(),
            classes: fixture.classes.clone(),
            text: fixture.text.clone(),
            value: fixture.value.clone(),
            hidden: fixture.hidden,
            parent,
            removed: false,
        });
        for child in &fixture.children {
            self.insert(Some(index), child);
        }
        index
    }

    fn resolve(&self, handle: &ElementHandle) -> Result<usize, EnvError> {
        handle
            .0
            .strip_prefix('n')
            .and_then(|index| index.parse::<usize>().ok())
            .filter(|index| self.nodes.get(*index).is_some_and(|node| !node.removed))
            .ok_or_else(|| EnvError::new(format!("Element {handle} is no longer attached")))
    }

    fn is_descendant(&self, mut index: usize, ancestor: usize) -> bool {
        while let Some(parent) = self.nodes[index].parent {
            if parent == ancestor {
                return true;
            }
            index = parent;
        }
        false
    }

    fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| !node.removed && node.parent == Some(parent))
            .map(|(index, _)| index)
    }

    fn matches(node: &Node, query: &str) -> bool {
        if let Some(id) = query.strip_prefix('#') {
            node.dom_id.as_deref() == Some(id)
        } else if let Some(class) = query.strip_prefix('.') {
            node.classes.iter().any(|c| c == class)
        } else {
            node.tag.eq_ignore_ascii_case(query)
        }
    }

    fn text_content(&self, index: usize) -> String {
        let mut parts = Vec::new();
        let own = self.nodes[index].text.trim();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        for child in self.children(index) {
            let text = self.text_content(child);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join(" ")
    }

    fn info(&self, index: usize) -> ElementInfo {
        let node = &self.nodes[index];
        ElementInfo {
            handle: handle_for(index),
            tag: node.tag.clone(),
            dom_id: node.dom_id.clone(),
            classes: node.classes.clone(),
            text: self.text_content(index),
            value: node.value.clone(),
        }
    }

    /// The element itself when it is an input, else the first input it wraps.
    fn input_target(&self, index: usize) -> Option<usize> {
        if INPUT_TAGS.contains(&self.nodes[index].tag.as_str()) {
            return Some(index);
        }
        self.nodes.iter().enumerate().find_map(|(candidate, node)| {
            (!node.removed && node.tag == "input" && self.is_descendant(candidate, index))
                .then_some(candidate)
        })
    }

    fn fixture(&self, index: usize) -> NodeFixture {
        let node = &self.nodes[index];
        NodeFixture {
            tag: node.tag.clone(),
            id: node.dom_id.clone(),
            classes: node.classes.clone(),
            text: node.text.clone(),
            value: node.value.clone(),
            hidden: node.hidden,
            children: self.children(index).map(|child| self.fixture(child)).collect(),
        }
    }

    fn roots(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.removed && node.parent.is_none())
            .map(|(index, _)| index)
            .collect()
    }
}

fn handle_for(index: usize) -> ElementHandle {
    ElementHandle(format!("n{index}"))
}

/// Thread-safe in-memory document.
#[derive(Debug)]
pub struct MemoryDocument {
    state: Mutex<DocState>,
}

impl MemoryDocument {
    pub fn new(fixture: DocumentFixture) -> Self {
        Self {
            state: Mutex::new(DocState::load(fixture)),
        }
    }

    /// Empty document at `url`.
    pub fn empty(url: impl Into<String>) -> Self {
        Self::new(DocumentFixture {
            url: url.into(),
            nodes: Vec::new(),
        })
    }

    /// Appends `node` (and its children) below `parent`, or at the top level.
    pub fn insert(&self, parent: Option<&ElementHandle>, node: NodeFixture) -> Result<ElementHandle, EnvError> {
        let mut state = self.state.lock();
        let parent = parent.map(|handle| state.resolve(handle)).transpose()?;
        Ok(handle_for(state.insert(parent, &node)))
    }

    /// Detaches the element and its whole subtree.
    pub fn remove(&self, handle: &ElementHandle) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        let target = state.resolve(handle)?;
        let doomed: Vec<usize> = (0..state.nodes.len())
            .filter(|index| *index == target || state.is_descendant(*index, target))
            .collect();
        for index in doomed {
            state.nodes[index].removed = true;
        }
        Ok(())
    }

    pub fn set_hidden(&self, handle: &ElementHandle, hidden: bool) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        let index = state.resolve(handle)?;
        state.nodes[index].hidden = hidden;
        Ok(())
    }

    pub fn set_text(&self, handle: &ElementHandle, text: impl Into<String>) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        let index = state.resolve(handle)?;
        state.nodes[index].text = text.into();
        Ok(())
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    /// Effects applied so far, oldest first.
    pub fn interactions(&self) -> Vec<Interaction> {
        self.state.lock().interactions.clone()
    }
}

#[async_trait]
impl Environment for MemoryDocument {
    async fn query_all(
        &self,
        root: Option<&ElementHandle>,
        query: &str,
    ) -> Result<Vec<ElementInfo>, EnvError> {
        let state = self.state.lock();
        let root = root.map(|handle| state.resolve(handle)).transpose()?;
        let query = query.trim();

        Ok(state
            .nodes
            .iter()
            .enumerate()
            .filter(|(index, node)| {
                !node.removed
                    && !node.hidden
                    && DocState::matches(node, query)
                    && root.map_or(true, |root| state.is_descendant(*index, root))
            })
            .map(|(index, _)| state.info(index))
            .collect())
    }

    async fn snapshot(&self) -> Value {
        let state = self.state.lock();
        let nodes: Vec<NodeFixture> = state.roots().into_iter().map(|index| state.fixture(index)).collect();
        json!({ "url": state.url, "nodes": nodes })
    }

    async fn input_values(&self) -> Value {
        let state = self.state.lock();
        let values: Map<String, Value> = state
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.removed && INPUT_TAGS.contains(&node.tag.as_str()))
            .map(|(index, node)| {
                let key = node.dom_id.clone().unwrap_or_else(|| handle_for(index).0);
                (key, Value::String(node.value.clone().unwrap_or_default()))
            })
            .collect();
        Value::Object(values)
    }

    async fn current_url(&self) -> String {
        self.state.lock().url.clone()
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        state.resolve(element)?;
        state.interactions.push(Interaction::Click(element.clone()));
        Ok(())
    }

    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        let index = state.resolve(element)?;
        let target = state
            .input_target(index)
            .ok_or_else(|| EnvError::new("Input element not found"))?;
        state.nodes[target].value = Some(value.to_string());
        state
            .interactions
            .push(Interaction::SetValue(handle_for(target), value.to_string()));
        Ok(())
    }

    async fn press_key(&self, element: &ElementHandle, key: Key) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        state.resolve(element)?;
        state.interactions.push(Interaction::PressKey(element.clone(), key));
        Ok(())
    }

    async fn text_of(&self, element: &ElementHandle) -> Result<String, EnvError> {
        let state = self.state.lock();
        let index = state.resolve(element)?;
        Ok(state.text_content(index))
    }

    async fn value_of(&self, element: &ElementHandle) -> Result<String, EnvError> {
        let state = self.state.lock();
        let index = state.resolve(element)?;
        let target = state
            .input_target(index)
            .ok_or_else(|| EnvError::new("Input element not found"))?;
        Ok(state.nodes[target].value.clone().unwrap_or_default())
    }

    async fn reload(&self) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        let mut interactions = std::mem::take(&mut state.interactions);
        interactions.push(Interaction::Reload);
        let initial = state.initial.clone();
        *state = DocState::load(initial);
        state.interactions = interactions;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::filters;

    fn login_page() -> MemoryDocument {
        MemoryDocument::new(DocumentFixture {
            url: "https://app.test/login".to_string(),
            nodes: vec![NodeFixture::new("form")
                .with_id("login")
                .with_child(NodeFixture::new("div").with_class("field").with_child(NodeFixture::new("input").with_id("user")))
                .with_child(NodeFixture::new("button").with_text("Cancel").hidden())
                .with_child(NodeFixture::new("button").with_text("Sign in"))],
        })
    }

    #[tokio::test]
    async fn query_skips_hidden_elements() {
        let doc = login_page();

        let buttons = doc.query_all(None, "button").await.unwrap();

        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].text, "Sign in");
    }

    #[tokio::test]
    async fn query_is_scoped_to_root() {
        let doc = login_page();
        let outside = doc.insert(None, NodeFixture::new("button").with_text("Help")).unwrap();

        let form = doc.query_element(None, "#login", None).await.unwrap().unwrap();
        let scoped = doc.query_all(Some(&form.handle), "button").await.unwrap();
        let everywhere = doc.query_all(None, "button").await.unwrap();

        assert_eq!(scoped.len(), 1);
        assert_eq!(everywhere.len(), 2);
        assert_eq!(everywhere[1].handle, outside);
    }

    #[tokio::test]
    async fn query_element_applies_filter() {
        let doc = login_page();
        doc.insert(None, NodeFixture::new("button").with_text("Help")).unwrap();
        let filter = filters::inner_text_is("Help");

        let found = doc.query_element(None, "button", Some(&filter)).await.unwrap();

        assert_eq!(found.map(|info| info.text), Some("Help".to_string()));
    }

    #[tokio::test]
    async fn set_value_writes_into_wrapped_input() {
        let doc = login_page();
        let field = doc.query_element(None, ".field", None).await.unwrap().unwrap();

        doc.set_value(&field.handle, "alice").await.unwrap();

        assert_eq!(doc.value_of(&field.handle).await.unwrap(), "alice");
        let values = doc.input_values().await;
        assert_eq!(values["user"], "alice");
    }

    #[tokio::test]
    async fn set_value_without_input_fails() {
        let doc = login_page();
        let button = doc.query_element(None, "button", None).await.unwrap().unwrap();

        let err = doc.set_value(&button.handle, "x").await.unwrap_err();

        assert_eq!(err.to_string(), "Input element not found");
    }

    #[tokio::test]
    async fn removed_subtree_is_gone() {
        let doc = login_page();
        let form = doc.query_element(None, "#login", None).await.unwrap().unwrap();

        doc.remove(&form.handle).unwrap();

        assert!(doc.query_all(None, "input").await.unwrap().is_empty());
        assert!(doc.click(&form.handle).await.is_err());
    }

    #[tokio::test]
    async fn reload_restores_initial_document() {
        let doc = login_page();
        let form = doc.query_element(None, "#login", None).await.unwrap().unwrap();
        doc.remove(&form.handle).unwrap();

        doc.reload().await.unwrap();

        assert_eq!(doc.query_all(None, "#login").await.unwrap().len(), 1);
        assert_eq!(doc.interactions(), vec![Interaction::Reload]);
    }

    #[tokio::test]
    async fn text_content_includes_descendants() {
        let doc = MemoryDocument::new(DocumentFixture {
            url: String::new(),
            nodes: vec![NodeFixture::new("div")
                .with_id("banner")
                .with_text("Welcome")
                .with_child(NodeFixture::new("span").with_text(" alice "))],
        });
        let banner = doc.query_element(None, "#banner", None).await.unwrap().unwrap();

        assert_eq!(doc.text_of(&banner.handle).await.unwrap(), "Welcome alice");
    }

    #[test]
    fn fixture_with_wrong_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document.json");
        std::fs::write(&path, r#"{ "url": 42 }"#).unwrap();

        match DocumentFixture::from_path(&path) {
            Err(ConfigError::FixtureParse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("Expected FixtureParse error, got {other:?}"),
        }
    }
}

//! Structured text reported by the content frame.
//!
//! A page's text is a tree: strings are trimmed text runs, arrays are
//! elements. Nodes are numbered in preorder, and the content frame refers to
//! them by that number (visibility updates). The numbering is computed once
//! per checkin into a [`TextIndex`] so every consumer agrees on it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SText {
    Leaf(String),
    Node(Vec<SText>),
}

impl Default for SText {
    fn default() -> Self {
        Self::Node(Vec::new())
    }
}

impl SText {
    /// `None` unless `value` is a string or nested arrays of strings.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// Position of one node in the concatenated leaf text, in UTF-16 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextNode {
    pub offset: usize,
    pub len: usize,
}

/// Preorder node table plus the concatenated leaf text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextIndex {
    nodes: Vec<TextNode>,
    text: String,
}

impl TextIndex {
    pub fn build(stext: &SText) -> Self {
        let mut index = Self::default();
        index.visit(stext, 0);
        index
    }

    /// Returns the end offset of `node`.
    fn visit(&mut self, node: &SText, offset: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TextNode { offset, len: 0 });
        let end = match node {
            SText::Leaf(s) => {
                self.text.push_str(s);
                offset + s.encode_utf16().count()
            }
            SText::Node(children) => children
                .iter()
                .fold(offset, |pos, child| self.visit(child, pos)),
        };
        self.nodes[id].len = end - offset;
        end
    }

    /// All leaves, in document order.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn node(&self, id: usize) -> Option<TextNode> {
        self.nodes.get(id).copied()
    }

    /// Number of nodes, containers included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        assert_eq!(
            SText::from_value(json!(["Title", ["Some", "text"]])),
            Some(SText::Node(vec![
                SText::Leaf("Title".into()),
                SText::Node(vec![SText::Leaf("Some".into()), SText::Leaf("text".into())]),
            ]))
        );
        assert_eq!(SText::from_value(json!("leaf")), Some(SText::Leaf("leaf".into())));
        assert_eq!(SText::from_value(json!(["a", 1])), None);
        assert_eq!(SText::from_value(json!({"a": "b"})), None);
        assert_eq!(SText::from_value(Value::Null), None);
    }

    #[test]
    fn test_preorder_index() {
        // 0:[ 1:"Title" 2:[ 3:"Some" 4:"café" ] 5:"end" ]
        let stext = SText::from_value(json!(["Title", ["Some", "café"], "end"])).unwrap();
        let index = TextIndex::build(&stext);

        assert_eq!(index.text(), "TitleSomecaféend");
        assert_eq!(index.len(), 6);
        assert_eq!(index.node(0), Some(TextNode { offset: 0, len: 16 }));
        assert_eq!(index.node(2), Some(TextNode { offset: 5, len: 8 }));
        assert_eq!(index.node(4), Some(TextNode { offset: 9, len: 4 }));
        assert_eq!(index.node(5), Some(TextNode { offset: 13, len: 3 }));
        assert_eq!(index.node(6), None);
    }

    #[test]
    fn test_offsets_count_utf16_units() {
        let stext = SText::from_value(json!(["😀", "x"])).unwrap();
        let index = TextIndex::build(&stext);
        assert_eq!(index.node(1), Some(TextNode { offset: 0, len: 2 }));
        assert_eq!(index.node(2), Some(TextNode { offset: 2, len: 1 }));
    }

    #[test]
    fn test_empty() {
        let index = TextIndex::build(&SText::default());
        assert_eq!(index.len(), 1);
        assert_eq!(index.text(), "");
    }
}

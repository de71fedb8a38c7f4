//! Minimal owned XML element tree.
//!
//! Used for both the PubMed article payload and the podcast feed. Element
//! and attribute names keep their namespace prefix verbatim
//! (`itunes:duration`), so documents round-trip without namespace
//! resolution.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::PodcastError;

/// A node inside an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: set an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder: append a text node.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Builder: append a child element.
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(e) if e.name == name => Some(e),
            _ => None,
        })
    }

    /// Direct child elements with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    /// First element with the given name anywhere below this one (depth first).
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in self.elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// All elements with the given name below this one, in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in self.elements() {
            if child.name == name {
                found.push(child);
            }
            child.collect_named(name, found);
        }
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    /// Index (into `children`) of the first child element with the given name.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(e) if e.name == name))
    }

    pub fn insert_child(&mut self, index: usize, child: XmlElement) {
        self.children.insert(index, XmlNode::Element(child));
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Remove the first child element with the given name, returning it
    /// together with the index it occupied.
    pub fn take_child(&mut self, name: &str) -> Option<(usize, XmlElement)> {
        let index = self.position_of(name)?;
        match self.children.remove(index) {
            XmlNode::Element(e) => Some((index, e)),
            XmlNode::Text(_) => None,
        }
    }
}

/// Parse a document into its root element.
///
/// Whitespace-only text is dropped from elements that contain no other
/// text; declarations, comments and processing instructions are ignored.
pub fn parse_document(xml: &str) -> Result<XmlElement, PodcastError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack.pop().ok_or_else(|| {
                    PodcastError::MalformedXml("unexpected closing tag".to_string())
                })?;
                drop_layout_whitespace(&mut element);
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                push_text(&mut stack, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                push_text(&mut stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(PodcastError::MalformedXml(format!(
            "unclosed element <{}>",
            open.name
        )));
    }

    root.ok_or_else(|| PodcastError::MalformedXml("document has no root element".to_string()))
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, PodcastError> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), PodcastError> {
    match stack.last_mut() {
        Some(parent) => parent.push_child(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(PodcastError::MalformedXml(format!(
                "second root element <{}>",
                element.name
            )));
        }
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Text(text.to_string()));
    }
}

/// Blank text spanning a line break is indentation unless the element also
/// holds real text. Blank text within a line separates inline markup and
/// is always kept.
fn drop_layout_whitespace(element: &mut XmlElement) {
    let is_blank = |node: &XmlNode| matches!(node, XmlNode::Text(t) if t.trim().is_empty());
    let mixed = element
        .children
        .iter()
        .any(|node| matches!(node, XmlNode::Text(_)) && !is_blank(node));
    if !mixed {
        element
            .children
            .retain(|node| !matches!(node, XmlNode::Text(t) if t.trim().is_empty() && t.contains('\n')));
    }
}

/// Serialize a document with an XML declaration and two-space indentation.
pub fn write_document(root: &XmlElement) -> Result<String, PodcastError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(write_error)?;
    write_element(&mut writer, root)?;

    let mut output = String::from_utf8(writer.into_inner())
        .map_err(|e| PodcastError::MalformedXml(format!("non UTF-8 output: {}", e)))?;
    output.push('\n');
    Ok(output)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<(), PodcastError> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(write_error);
    }

    writer.write_event(Event::Start(start)).map_err(write_error)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(write_error)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_error)
}

fn write_error(e: impl std::fmt::Display) -> PodcastError {
    PodcastError::MalformedXml(format!("failed to serialize XML: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let xml = r#"<?xml version="1.0"?>
<root version="2">
  <a>one &amp; two</a>
  <b><c x="1"/><c x="2"/></b>
</root>"#;
        let root = parse_document(xml).unwrap();

        assert_eq!(root.name, "root");
        assert_eq!(root.attr("version"), Some("2"));
        assert_eq!(root.child("a").unwrap().text(), "one & two");
        let cs = root.find_all("c");
        assert_eq!(cs.len(), 2);
        assert_eq!(cs[1].attr("x"), Some("2"));
    }

    #[test]
    fn test_inline_markup_keeps_spacing() {
        let root = parse_document("<t>Effect of <i>semaglutide</i> on mass</t>").unwrap();
        assert_eq!(root.text(), "Effect of semaglutide on mass");
    }

    #[test]
    fn test_space_between_inline_elements_is_kept() {
        let root = parse_document("<t>HbA<sub>1c</sub> <i>versus</i> weight</t>").unwrap();
        assert_eq!(root.text(), "HbA1c versus weight");
    }

    #[test]
    fn test_space_between_inline_elements_without_text() {
        let root = parse_document("<t><b>Aim</b> <i>Assess</i></t>").unwrap();
        assert_eq!(root.text(), "Aim Assess");
    }

    #[test]
    fn test_indentation_is_not_kept() {
        let root = parse_document("<a>\n  <b>x</b>\n  <c/>\n</a>").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.text(), "x");
    }

    #[test]
    fn test_prefixed_names_are_preserved() {
        let xml = r#"<rss xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"><itunes:author>Me</itunes:author></rss>"#;
        let root = parse_document(xml).unwrap();

        assert!(root.attr("xmlns:itunes").is_some());
        assert_eq!(root.child("itunes:author").unwrap().text(), "Me");
    }

    #[test]
    fn test_mismatched_tags_fail() {
        assert!(parse_document("<a><b></a>").is_err());
    }

    #[test]
    fn test_unclosed_tag_fails() {
        assert!(parse_document("<a><b></b>").is_err());
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(parse_document("   ").is_err());
    }

    #[test]
    fn test_write_then_parse_preserves_tree() {
        let root = XmlElement::new("rss")
            .with_attr("version", "2.0")
            .with_child(
                XmlElement::new("channel")
                    .with_child(XmlElement::new("title").with_text("A <b> & \"c\""))
                    .with_child(XmlElement::new("enclosure").with_attr("url", "x?a=1&b=2")),
            );

        let xml = write_document(&root).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("\n  <channel>"));
        assert!(xml.contains("<title>A &lt;b&gt; &amp; "));
        assert_eq!(parse_document(&xml).unwrap(), root);
    }

    #[test]
    fn test_insert_child_before_position() {
        let mut parent = XmlElement::new("channel")
            .with_child(XmlElement::new("title"))
            .with_child(XmlElement::new("item").with_text("old"));

        let index = parent.position_of("item").unwrap();
        parent.insert_child(index, XmlElement::new("item").with_text("new"));

        let items: Vec<String> = parent.children_named("item").map(|i| i.text()).collect();
        assert_eq!(items, vec!["new", "old"]);
    }

    #[test]
    fn test_take_child_reports_position() {
        let mut root = XmlElement::new("rss")
            .with_child(XmlElement::new("meta"))
            .with_child(XmlElement::new("channel").with_text("c"));

        let (index, channel) = root.take_child("channel").unwrap();
        assert_eq!(index, 1);
        assert_eq!(channel.text(), "c");
        assert!(root.take_child("channel").is_none());
    }
}

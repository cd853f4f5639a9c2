//! In-memory XML documents: parsed from text, resolved against a `ResourceTable` and
//! flattened to binary XML.

mod flatten;

pub use flatten::FlattenFlags;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use xml::common::Position;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use crate::table::CoerceParams;
use crate::{
    ErrorLog, ResValue, ResourceTable, SourcePos, ValueType, RESOURCES_AUTO_PACKAGE_NAMESPACE,
    RESOURCES_PRV_PREFIX, RESOURCES_ROOT_NAMESPACE,
};

/// Attributes without a resource ID sort after every attribute that has one, in the order they
/// were added.
const UNRESOLVED_ORDER_BASE: u32 = 0x80000000;

#[derive(Debug, Clone, PartialEq)]
pub struct XmlAttribute {
    pub namespace: String,
    pub name: String,
    /// The literal text. After `parse_values` this is the processed text of string values.
    pub string: String,
    pub value: ResValue,
    /// Resource ID of the `attr` this attribute names, 0 if it has none.
    pub name_res_id: u32,
    index: u32,
}

impl XmlAttribute {
    /// Key the attributes of an element are written in.
    fn order(&self) -> u32 {
        if self.name_res_id != 0 {
            self.name_res_id
        } else {
            self.index
        }
    }

    /// Whether the raw string must be written even when raw values are stripped.
    fn needs_string(&self) -> bool {
        self.name_res_id == 0
            || matches!(self.value.data_type, ValueType::Null | ValueType::String)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Namespace {
        prefix: String,
        uri: String,
    },
    Element {
        namespace: String,
        name: String,
        attributes: Vec<XmlAttribute>,
    },
    CData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    pub data: NodeData,
    pub pos: SourcePos,
    pub end_line: u32,
    /// Comments directly before the node, joined with newlines.
    pub comment: String,
    pub children: Vec<XmlNode>,
    next_attribute_index: u32,
}

impl XmlNode {
    fn new(data: NodeData, pos: SourcePos) -> Self {
        Self {
            data,
            end_line: pos.line,
            pos,
            comment: String::new(),
            children: Vec::new(),
            next_attribute_index: UNRESOLVED_ORDER_BASE,
        }
    }

    pub fn new_namespace(pos: SourcePos, prefix: &str, uri: &str) -> Self {
        Self::new(
            NodeData::Namespace {
                prefix: prefix.to_owned(),
                uri: uri.to_owned(),
            },
            pos,
        )
    }

    pub fn new_element(pos: SourcePos, namespace: &str, name: &str) -> Self {
        Self::new(
            NodeData::Element {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
                attributes: Vec::new(),
            },
            pos,
        )
    }

    pub fn new_cdata(pos: SourcePos, text: &str) -> Self {
        Self::new(NodeData::CData(text.to_owned()), pos)
    }

    /// Parses the XML file at `path`, naming it `file` in diagnostics.
    pub fn parse_file(path: impl AsRef<Path>, file: &str) -> Result<Self> {
        let handle = File::open(path.as_ref())
            .with_context(|| format!("Opening {}", path.as_ref().display()))?;
        Self::parse(file, BufReader::new(handle))
    }

    /// Parses a whole document into a tree. Namespace declarations become `Namespace` nodes
    /// wrapping the element that declared them.
    pub fn parse(file: &str, data: impl Read) -> Result<Self> {
        let mut reader = EventReader::new_with_config(
            data,
            ParserConfig::new()
                .trim_whitespace(false)
                .whitespace_to_characters(true)
                .cdata_to_characters(true)
                .coalesce_characters(true)
                .ignore_comments(false),
        );

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root = None;
        // Number of namespace nodes opened by each open element
        let mut declared_nses: Vec<usize> = Vec::new();
        // Prefix to URI maps in scope for each open element
        let mut ns_maps: Vec<BTreeMap<String, String>> = Vec::new();
        let mut pending_comment = String::new();

        loop {
            let event = reader.next().map_err(|err| {
                SourcePos::new(file, err.position().row as u32 + 1).error(err.msg())
            })?;
            let pos = SourcePos::new(file, reader.position().row as u32 + 1);
            match event {
                XmlEvent::StartElement {
                    name,
                    attributes,
                    namespace,
                } => {
                    // xml-rs hands out every namespace in scope, so the ones this element
                    // declares are those that differ from the parent's.
                    let parent_map = ns_maps.last().cloned().unwrap_or_default();
                    let mut declared = 0;
                    for (prefix, uri) in &namespace.0 {
                        if prefix == "xml"
                            || prefix == "xmlns"
                            || uri.is_empty()
                            || parent_map.get(prefix) == Some(uri)
                        {
                            continue;
                        }

                        let mut node = XmlNode::new_namespace(pos.clone(), prefix, uri);
                        node.comment = std::mem::take(&mut pending_comment);
                        stack.push(node);
                        declared += 1;
                    }
                    declared_nses.push(declared);
                    ns_maps.push(namespace.0);

                    let mut node = XmlNode::new_element(
                        pos,
                        name.namespace.as_deref().unwrap_or_default(),
                        &name.local_name,
                    );
                    node.comment = std::mem::take(&mut pending_comment);
                    for attr in attributes {
                        node.add_attribute(
                            attr.name.namespace.as_deref().unwrap_or_default(),
                            &attr.name.local_name,
                            &attr.value,
                        );
                    }
                    stack.push(node);
                }
                XmlEvent::EndElement { .. } => {
                    if let Some(element) = stack.last_mut() {
                        element.end_line = pos.line;
                    }
                    close_node(&mut stack, &mut root);
                    for _ in 0..declared_nses.pop().unwrap_or(0) {
                        if let Some(ns) = stack.last_mut() {
                            ns.end_line = pos.line;
                        }
                        close_node(&mut stack, &mut root);
                    }
                    ns_maps.pop();
                }
                XmlEvent::Characters(text) => {
                    if let Some(parent) = stack.last_mut() {
                        match parent.children.last_mut() {
                            Some(XmlNode {
                                data: NodeData::CData(existing),
                                ..
                            }) => existing.push_str(&text),
                            _ => parent.children.push(XmlNode::new_cdata(pos, &text)),
                        }
                    }
                }
                XmlEvent::Comment(text) => {
                    if !pending_comment.is_empty() {
                        pending_comment.push('\n');
                    }
                    pending_comment.push_str(&text);
                }
                XmlEvent::EndDocument => break,
                _ => {}
            }
        }

        root.ok_or_else(|| anyhow!("{file}: No XML data generated when parsing"))
    }

    pub fn element_name(&self) -> Option<&str> {
        match &self.data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn element_namespace(&self) -> Option<&str> {
        match &self.data {
            NodeData::Element { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    pub fn is_element(&self, namespace: &str, name: &str) -> bool {
        matches!(&self.data, NodeData::Element { namespace: ns, name: n, .. } if ns == namespace && n == name)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::CData(text) => Some(text),
            _ => None,
        }
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        match &self.data {
            NodeData::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn find_attribute(&self, namespace: &str, name: &str) -> Option<&XmlAttribute> {
        self.attributes()
            .iter()
            .find(|attr| attr.namespace == namespace && attr.name == name)
    }

    /// Literal value of the un-namespaced attribute `name`.
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.find_attribute("", name).map(|attr| attr.string.as_str())
    }

    /// Adds an attribute to an element. Other node kinds ignore it.
    pub fn add_attribute(&mut self, namespace: &str, name: &str, value: &str) {
        let index = self.next_attribute_index;
        if let NodeData::Element { attributes, .. } = &mut self.data {
            attributes.push(XmlAttribute {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
                string: value.to_owned(),
                value: ResValue::null(),
                name_res_id: 0,
                index,
            });
            self.next_attribute_index += 1;
        }
    }

    pub fn add_child(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// The first element of the document, looking through namespace declarations.
    pub fn root_element(&self) -> Option<&XmlNode> {
        match &self.data {
            NodeData::Element { .. } => Some(self),
            NodeData::Namespace { .. } => self.children.iter().find_map(|c| c.root_element()),
            NodeData::CData(_) => None,
        }
    }

    pub fn root_element_mut(&mut self) -> Option<&mut XmlNode> {
        match &self.data {
            NodeData::Element { .. } => Some(self),
            NodeData::Namespace { .. } => self
                .children
                .iter_mut()
                .find_map(|c| c.root_element_mut()),
            NodeData::CData(_) => None,
        }
    }

    /// Element children, skipping text and namespace nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter(|c| c.element_name().is_some())
    }

    /// Drops or compacts whitespace text. With `strip_all`, whitespace-only text is deleted
    /// except below elements named in `cdata_tags`, where it becomes a single space.
    pub fn remove_whitespace(&mut self, strip_all: bool, cdata_tags: &[&str]) {
        let strip_all = strip_all
            && !self
                .element_name()
                .is_some_and(|name| cdata_tags.contains(&name));

        self.children.retain_mut(|child| {
            let NodeData::CData(text) = &mut child.data else {
                child.remove_whitespace(strip_all, cdata_tags);
                return true;
            };

            let is_ws = |c: char| c.is_ascii_whitespace();
            let trimmed = text.trim_matches(is_ws);
            if trimmed.is_empty() {
                if strip_all {
                    return false;
                }
                *text = " ".to_owned();
            } else if trimmed.len() != text.len() {
                let mut compact = String::with_capacity(trimmed.len() + 2);
                if text.starts_with(is_ws) {
                    compact.push(' ');
                }
                compact.push_str(trimmed);
                if text.ends_with(is_ws) {
                    compact.push(' ');
                }
                *text = compact;
            }
            true
        });
    }

    /// Resolves the names of attributes in resource namespaces to `attr` resource IDs.
    pub fn assign_resource_ids(&mut self, table: &ResourceTable) -> Result<()> {
        let mut errors = ErrorLog::new();
        self.assign_resource_ids_inner(table, &mut errors);
        errors.finish("Assigning attribute resource IDs")
    }

    fn assign_resource_ids_inner(&mut self, table: &ResourceTable, errors: &mut ErrorLog) {
        if let NodeData::Element { attributes, .. } = &mut self.data {
            for attr in attributes.iter_mut() {
                let Some((package, only_public)) =
                    namespace_package(table.assets_package(), &attr.namespace)
                else {
                    continue;
                };

                match table.get_res_id(&package, "attr", &attr.name, only_public) {
                    Some(id) => attr.name_res_id = id,
                    None => errors.push(self.pos.error(format!(
                        "No resource identifier found for attribute '{}' in package '{package}'",
                        attr.name
                    ))),
                }
            }
        }

        for child in &mut self.children {
            child.assign_resource_ids_inner(table, errors);
        }
    }

    /// Converts every attribute's literal into a typed value, checked against the format of the
    /// `attr` it names. `@+` references create their resources.
    pub fn parse_values(&mut self, table: &mut ResourceTable) -> Result<()> {
        let mut errors = ErrorLog::new();
        self.parse_values_inner(table, &mut errors);
        errors.finish("Parsing attribute values")
    }

    fn parse_values_inner(&mut self, table: &mut ResourceTable, errors: &mut ErrorLog) {
        if let NodeData::Element { attributes, .. } = &mut self.data {
            for attr in attributes.iter_mut() {
                let params = CoerceParams {
                    attr_id: attr.name_res_id,
                    preserve_spaces: true,
                    ..CoerceParams::default()
                };
                match table.string_to_value(&self.pos, &attr.string, &params) {
                    Ok(coerced) => {
                        attr.value = coerced.value;
                        if let Some(text) = coerced.string {
                            attr.string = text;
                        }
                    }
                    Err(msg) => errors.push(self.pos.error(format!(
                        "Error: {msg} (at '{}' with value '{}').",
                        attr.name, attr.string
                    ))),
                }
            }
        }

        for child in &mut self.children {
            child.parse_values_inner(table, errors);
        }
    }
}

// Moves the innermost open node into its parent, or makes it the root.
fn close_node(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>) {
    let Some(node) = stack.pop() else {
        return;
    };
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

/// The package whose `attr` resources an attribute namespace refers to, and whether only
/// public attributes may be used. `None` for namespaces that are not resource namespaces.
pub(crate) fn namespace_package(own_package: &str, uri: &str) -> Option<(String, bool)> {
    if uri.starts_with(RESOURCES_AUTO_PACKAGE_NAMESPACE) {
        Some((own_package.to_owned(), true))
    } else if let Some(package) = uri.strip_prefix(RESOURCES_ROOT_NAMESPACE) {
        Some((package.to_owned(), true))
    } else {
        uri.strip_prefix(RESOURCES_PRV_PREFIX)
            .map(|package| (package.to_owned(), false))
    }
}

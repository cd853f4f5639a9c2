//! LICENSING
//! Although the MBF project is licensed under the GNU Affero General Public License,
//! this file and any others with the same notice (but NO FILES OTHER THAN THAT) are also available under the MIT License.
//! Copyright 2024 Laurie ?
//!
//! Permission is hereby granted, free of charge, to any person obtaining a copy of this software and
//! associated documentation files (the “Software”), to deal in the Software without restriction,
//! including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense,
//! and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
//!
//! The above copyright notice and this permission notice shall be included
//! in all copies or substantial portions of the Software.
//!
//! THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED,
//! INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.
//! IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY,
//! WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//! OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use byteorder::{WriteBytesExt, LE};

use super::{NodeData, XmlAttribute, XmlNode};
use crate::{
    begin_chunk, end_chunk, ChunkType, ResValue, StringPool, ValueType, ANDROID_NS_URI,
    TOOLS_NS_URI,
};

const NO_INDEX: u32 = 0xFFFFFFFF;

/// Layout of the attribute array: offset from the start of the extension, then entry size.
const ATTRIBUTE_LAYOUT: u32 = 0x00140014;

/// How a tree is written out.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenFlags {
    /// Pool strings as UTF-8 instead of UTF-16.
    pub utf8: bool,
    pub strip_comments: bool,
    /// Omit the literal text of attributes whose typed value says everything.
    pub strip_raw_values: bool,
}

struct XmlWriter {
    pool: StringPool,
    // Resource ID of an attribute name to its index in both the pool and the resource map
    res_map: HashMap<u32, u32>,
    linear_res_map: Vec<u32>,
    flags: FlattenFlags,
    out: Vec<u8>,
}

impl XmlNode {
    /// Writes the tree as a binary XML document.
    pub fn flatten(&self, flags: FlattenFlags) -> Result<Vec<u8>> {
        let mut writer = XmlWriter {
            pool: StringPool::new(flags.utf8),
            res_map: HashMap::new(),
            linear_res_map: Vec::new(),
            flags,
            out: Vec::new(),
        };

        // Names of attributes with resource IDs go first so that string pool indices
        // and resource map indices line up.
        writer.collect_res_id_strings(self);
        writer.collect_strings(self);

        let xml_start = begin_chunk(&mut writer.out, ChunkType::Xml)?;
        writer.pool.write_string_block(&mut writer.out)?;
        if !writer.linear_res_map.is_empty() {
            let map_start = begin_chunk(&mut writer.out, ChunkType::XmlResourceMap)?;
            for res_id in &writer.linear_res_map {
                writer.out.write_u32::<LE>(*res_id)?;
            }
            end_chunk(&mut writer.out, map_start)?;
        }

        writer.write_node(self)?;
        end_chunk(&mut writer.out, xml_start)?;
        Ok(writer.out)
    }
}

fn is_tools_namespace(node: &XmlNode) -> bool {
    matches!(&node.data, NodeData::Namespace { uri, .. } if uri == TOOLS_NS_URI)
}

// Attributes in the order they are written. Tools attributes only matter at compile time.
fn written_attributes(attributes: &[XmlAttribute]) -> Vec<&XmlAttribute> {
    let mut written: Vec<&XmlAttribute> = attributes
        .iter()
        .filter(|attr| attr.namespace != TOOLS_NS_URI)
        .collect();
    // Android looks some attributes up by binary search, so they must be in increasing ID order
    written.sort_by_key(|attr| attr.order());
    written
}

impl XmlWriter {
    fn collect_res_id_strings(&mut self, node: &XmlNode) {
        for attr in written_attributes(node.attributes()) {
            if attr.name_res_id == 0 || self.res_map.contains_key(&attr.name_res_id) {
                continue;
            }

            let idx = self.pool.add(&attr.name, false) as u32;
            self.res_map.insert(attr.name_res_id, idx);
            self.linear_res_map.push(attr.name_res_id);
        }

        for child in &node.children {
            self.collect_res_id_strings(child);
        }
    }

    fn collect_strings(&mut self, node: &XmlNode) {
        let skip = is_tools_namespace(node);
        if !skip && !self.flags.strip_comments && !node.comment.is_empty() {
            self.pool.add(&node.comment, true);
        }

        match &node.data {
            NodeData::Namespace { prefix, uri } if !skip => {
                if !prefix.is_empty() {
                    self.pool.add(prefix, true);
                }
                self.pool.add(uri, true);
            }
            NodeData::Namespace { .. } => {}
            NodeData::Element {
                namespace,
                name,
                attributes,
            } => {
                if !namespace.is_empty() {
                    self.pool.add(namespace, true);
                }
                self.pool.add(name, true);

                for attr in written_attributes(attributes) {
                    if !attr.namespace.is_empty() {
                        self.pool.add(&attr.namespace, true);
                    }
                    if attr.name_res_id == 0 {
                        self.pool.add(&attr.name, true);
                    }
                    if !self.flags.strip_raw_values || attr.needs_string() {
                        self.pool.add(&attr.string, true);
                    }
                }
            }
            NodeData::CData(text) => {
                self.pool.add(text, true);
            }
        }

        for child in &node.children {
            self.collect_strings(child);
        }
    }

    fn string_idx(&self, s: &str) -> Result<u32> {
        let idx = self
            .pool
            .offset_for_string(s)
            .ok_or_else(|| anyhow!("String \"{s}\" was not collected into the pool"))?;
        idx.try_into().context("String pool too large")
    }

    fn optional_string_idx(&self, s: &str) -> Result<u32> {
        if s.is_empty() {
            Ok(NO_INDEX)
        } else {
            self.string_idx(s)
        }
    }

    // Writes the line number and comment that every node starts with.
    fn write_node_header(&mut self, line: u32, comment: &str) -> Result<()> {
        self.out.write_u32::<LE>(line)?;
        let comment_idx = if self.flags.strip_comments {
            NO_INDEX
        } else {
            self.optional_string_idx(comment)?
        };
        self.out.write_u32::<LE>(comment_idx)?;
        Ok(())
    }

    fn write_node(&mut self, node: &XmlNode) -> Result<()> {
        match &node.data {
            NodeData::Namespace { .. } if is_tools_namespace(node) => {
                self.write_children(node)?;
            }
            NodeData::Namespace { prefix, uri } => {
                self.write_namespace(ChunkType::XmlStartNamespace, node, prefix, uri)?;
                self.write_children(node)?;
                self.write_namespace(ChunkType::XmlEndNamespace, node, prefix, uri)?;
            }
            NodeData::Element {
                namespace,
                name,
                attributes,
            } => {
                self.write_start_element(node, namespace, name, attributes)?;
                self.write_children(node)?;
                self.write_end_element(node, namespace, name)?;
            }
            NodeData::CData(text) => self.write_cdata(node, text)?,
        }

        Ok(())
    }

    fn write_children(&mut self, node: &XmlNode) -> Result<()> {
        for child in &node.children {
            self.write_node(child)?;
        }
        Ok(())
    }

    fn write_namespace(
        &mut self,
        chunk_type: ChunkType,
        node: &XmlNode,
        prefix: &str,
        uri: &str,
    ) -> Result<()> {
        let start = begin_chunk(&mut self.out, chunk_type)?;
        if chunk_type == ChunkType::XmlStartNamespace {
            self.write_node_header(node.pos.line, &node.comment)?;
        } else {
            self.write_node_header(node.end_line, "")?;
        }

        let prefix_idx = self.optional_string_idx(prefix)?;
        let uri_idx = self.string_idx(uri)?;
        self.out.write_u32::<LE>(prefix_idx)?;
        self.out.write_u32::<LE>(uri_idx)?;
        end_chunk(&mut self.out, start)
    }

    fn write_start_element(
        &mut self,
        node: &XmlNode,
        namespace: &str,
        name: &str,
        attributes: &[XmlAttribute],
    ) -> Result<()> {
        let start = begin_chunk(&mut self.out, ChunkType::XmlStartElement)?;
        self.write_node_header(node.pos.line, &node.comment)?;

        let ns_idx = self.optional_string_idx(namespace)?;
        let name_idx = self.string_idx(name)?;
        self.out.write_u32::<LE>(ns_idx)?;
        self.out.write_u32::<LE>(name_idx)?;
        self.out.write_u32::<LE>(ATTRIBUTE_LAYOUT)?;

        let attributes = written_attributes(attributes);
        let (mut id_index, mut class_index, mut style_index) = (0u16, 0u16, 0u16);
        for (i, attr) in attributes.iter().enumerate() {
            let position: u16 = (i + 1).try_into().context("Too many attributes")?;
            match (attr.namespace.as_str(), attr.name.as_str()) {
                ("" | ANDROID_NS_URI, "id") => id_index = position,
                ("", "class") => class_index = position,
                ("", "style") => style_index = position,
                _ => {}
            }
        }

        self.out.write_u16::<LE>(
            attributes
                .len()
                .try_into()
                .context("Too many attributes for element")?,
        )?;
        self.out.write_u16::<LE>(id_index)?;
        self.out.write_u16::<LE>(class_index)?;
        self.out.write_u16::<LE>(style_index)?;

        for attr in attributes {
            self.write_attribute(attr)?;
        }
        end_chunk(&mut self.out, start)
    }

    fn write_attribute(&mut self, attr: &XmlAttribute) -> Result<()> {
        let ns_idx = self.optional_string_idx(&attr.namespace)?;
        self.out.write_u32::<LE>(ns_idx)?;

        let name_idx = if attr.name_res_id != 0 {
            *self.res_map.get(&attr.name_res_id).ok_or_else(|| {
                anyhow!(
                    "Attribute {} with ID {:#010x} was not prepared in the resource map",
                    attr.name,
                    attr.name_res_id
                )
            })?
        } else {
            self.string_idx(&attr.name)?
        };
        self.out.write_u32::<LE>(name_idx)?;

        let raw_idx = if !self.flags.strip_raw_values || attr.needs_string() {
            self.string_idx(&attr.string)?
        } else {
            NO_INDEX
        };
        self.out.write_u32::<LE>(raw_idx)?;

        // Values that never got a type are written as their text
        let typed = match attr.value.data_type {
            ValueType::Null | ValueType::String => {
                ResValue::new(ValueType::String, self.string_idx(&attr.string)?)
            }
            _ => attr.value,
        };
        typed.write(&mut self.out)
    }

    fn write_end_element(&mut self, node: &XmlNode, namespace: &str, name: &str) -> Result<()> {
        let start = begin_chunk(&mut self.out, ChunkType::XmlEndElement)?;
        self.write_node_header(node.end_line, "")?;
        let ns_idx = self.optional_string_idx(namespace)?;
        let name_idx = self.string_idx(name)?;
        self.out.write_u32::<LE>(ns_idx)?;
        self.out.write_u32::<LE>(name_idx)?;
        end_chunk(&mut self.out, start)
    }

    fn write_cdata(&mut self, node: &XmlNode, text: &str) -> Result<()> {
        let start = begin_chunk(&mut self.out, ChunkType::XmlCData)?;
        self.write_node_header(node.pos.line, "")?;
        let text_idx = self.string_idx(text)?;
        self.out.write_u32::<LE>(text_idx)?;
        ResValue::null().write(&mut self.out)?;
        end_chunk(&mut self.out, start)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        AttributeValue, AxmlReader, Event, NoIncluded, PackageType, ResourceIds, ResourceTable,
        SpecialAttributes,
    };

    const MANIFEST: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    xmlns:tools="http://schemas.android.com/tools"
    package="com.example" android:versionCode="3">
    <!-- Launcher entry -->
    <application android:label="Demo" tools:ignore="MissingApplicationIcon" android:debuggable="true">
        <meta-data android:name="key" android:value="12" />
    </application>
</manifest>
"#;

    fn framework() -> Box<ResourceIds> {
        let mut ids = ResourceIds::new("android");
        ids.insert("attr", "label", 0x01010001)
            .insert("attr", "name", 0x01010003)
            .insert("attr", "value", 0x01010024)
            .insert("attr", "debuggable", 0x0101000f)
            .insert("attr", "versionCode", 0x0101021b);
        Box::new(ids)
    }

    fn compile(flags: FlattenFlags) -> Vec<u8> {
        let mut table = ResourceTable::new("com.example", PackageType::App, framework());
        table.assign_resource_ids().unwrap();
        let mut root = XmlNode::parse("AndroidManifest.xml", MANIFEST.as_bytes()).unwrap();
        root.remove_whitespace(true, &[]);
        root.assign_resource_ids(&table).unwrap();
        root.parse_values(&mut table).unwrap();
        root.flatten(flags).unwrap()
    }

    fn read_events(bytes: &[u8]) -> (Vec<Event>, Vec<String>, Vec<u32>) {
        let mut cursor = Cursor::new(bytes);
        let mut reader = AxmlReader::new(&mut cursor).unwrap();
        let mut events = Vec::new();
        while let Some(event) = reader.read_next_event().unwrap() {
            events.push(event);
        }
        let pool = reader.string_pool().to_vec();
        let res_map = reader.resource_map().to_vec();
        (events, pool, res_map)
    }

    #[test]
    fn resource_map_matches_the_front_of_the_pool() {
        let (_, pool, res_map) = read_events(&compile(FlattenFlags::default()));
        assert_eq!(
            res_map,
            vec![0x0101021b, 0x01010001, 0x0101000f, 0x01010003, 0x01010024]
        );
        assert_eq!(
            &pool[..5],
            &["versionCode", "label", "debuggable", "name", "value"]
        );
    }

    #[test]
    fn tools_namespace_is_dropped() {
        let bytes = compile(FlattenFlags::default());
        let (events, pool, _) = read_events(&bytes);
        assert!(!pool.iter().any(|s| s == TOOLS_NS_URI));

        let starts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::StartNamespace(_)))
            .collect();
        assert_eq!(starts.len(), 1);

        let Event::StartElement { attributes, .. } = &events[2] else {
            panic!("expected <application>, got {:?}", events[2]);
        };
        assert_eq!(attributes.len(), 2);
    }

    #[test]
    fn attributes_are_sorted_and_typed() {
        let (events, _, _) = read_events(&compile(FlattenFlags::default()));
        let Event::StartElement {
            attributes,
            name,
            line_num,
            ..
        } = &events[1]
        else {
            panic!("expected <manifest>, got {:?}", events[1]);
        };
        assert_eq!(name, "manifest");
        assert_eq!(*line_num, 1);

        assert_eq!(attributes[0].name, "versionCode");
        assert_eq!(attributes[0].resource_id, Some(0x0101021b));
        assert_eq!(attributes[0].value, AttributeValue::Integer(3));
        assert_eq!(attributes[0].raw_value.as_deref(), Some("3"));
        assert_eq!(attributes[1].name, "package");
        assert_eq!(attributes[1].resource_id, None);
        assert_eq!(
            attributes[1].value,
            AttributeValue::String("com.example".into())
        );

        let Event::StartElement {
            attributes,
            comment,
            ..
        } = &events[2]
        else {
            panic!("expected <application>, got {:?}", events[2]);
        };
        assert_eq!(comment.as_deref(), Some(" Launcher entry "));
        assert_eq!(attributes[0].name, "label");
        assert_eq!(attributes[1].value, AttributeValue::Boolean(true));
    }

    #[test]
    fn stripping_drops_comments_and_typed_raw_values() {
        let (events, pool, _) = read_events(&compile(FlattenFlags {
            utf8: true,
            strip_comments: true,
            strip_raw_values: true,
        }));
        assert!(!pool.iter().any(|s| s == " Launcher entry "));

        let Event::StartElement {
            attributes,
            comment,
            ..
        } = &events[2]
        else {
            panic!("expected <application>, got {:?}", events[2]);
        };
        assert_eq!(*comment, None);
        // The label is a string, so its text stays
        assert_eq!(attributes[0].raw_value.as_deref(), Some("Demo"));
        assert_eq!(attributes[1].raw_value, None);
    }

    #[test]
    fn special_attribute_positions() {
        let table = ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded));
        let mut root = XmlNode::parse(
            "v.xml",
            r#"<view style="a" class="b" id="c" other="d">text</view>"#.as_bytes(),
        )
        .unwrap();
        root.assign_resource_ids(&table).unwrap();

        let (events, _, res_map) = read_events(&root.flatten(FlattenFlags::default()).unwrap());
        assert!(res_map.is_empty());
        let Event::StartElement { special, .. } = &events[0] else {
            panic!("expected <view>, got {:?}", events[0]);
        };
        assert_eq!(
            *special,
            SpecialAttributes {
                id: 3,
                class: 2,
                style: 1
            }
        );
        assert!(matches!(&events[1], Event::CData { text, .. } if text == "text"));
        assert!(matches!(&events[2], Event::EndElement { name, .. } if name == "view"));
    }
}

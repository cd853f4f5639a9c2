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

use std::io::{Read, Seek, SeekFrom};

use anyhow::{anyhow, Context, Result};
use byteorder::{ReadBytesExt, LE};

use super::{
    Attribute, AttributeValue, ChunkType, Event, Namespace, ResValue, SpecialAttributes,
    StyleSpan, ValueType, UTF8_FLAG,
};

const NO_INDEX: u32 = 0xFFFFFFFF;

/// Reads back the binary XML produced by `XmlNode::flatten`, one event at a time.
pub struct AxmlReader<'r, R: Read + Seek> {
    data: &'r mut R,

    string_pool: Vec<String>,

    // Resource IDs of the attribute names at the front of the string pool
    res_map: Vec<u32>,

    end_file_offset: u64,
}

impl<'r, R: Read + Seek> AxmlReader<'r, R> {
    pub fn new(data: &'r mut R) -> Result<Self> {
        // The document is one XML chunk which contains, in order:
        // the StringPool, then an optional XmlResourceMap, then all of the nodes within the file

        let file_start = data.stream_position()?;
        if ChunkType::parse(data.read_u32::<LE>()?) != Some(ChunkType::Xml) {
            return Err(anyhow!("Initial chunk was not XML"));
        }

        let file_size = data.read_u32::<LE>()?;
        if ChunkType::parse(data.read_u32::<LE>()?) != Some(ChunkType::StringPool) {
            return Err(anyhow!("Expected string pool after first XML tag"));
        }
        let post_string_pool = data.read_u32::<LE>()? as u64 + data.stream_position()? - 8;
        let pool = load_string_pool(data).context("Loading string pool")?;
        data.seek(SeekFrom::Start(post_string_pool))?;

        let end_file_offset = file_start + file_size as u64;
        let mut res_map = Vec::new();
        if post_string_pool < end_file_offset {
            let c_type = ChunkType::parse(data.read_u32::<LE>()?);
            if c_type == Some(ChunkType::XmlResourceMap) {
                let res_map_len = data.read_u32::<LE>()?;
                let post_resource_map = data.stream_position()? + res_map_len as u64 - 8;

                // Number of integers within the resource map. Subtract 2 due to the chunk type and length
                let res_map_size = (res_map_len >> 2) - 2;
                res_map.reserve(res_map_size as usize);
                for _ in 0..res_map_size {
                    res_map.push(data.read_u32::<LE>()?);
                }
                data.seek(SeekFrom::Start(post_resource_map))?;
            } else {
                // No resource map, so this is already the first node
                data.seek(SeekFrom::Start(post_string_pool))?;
            }
        }

        Ok(Self {
            data,
            string_pool: pool.strings,
            res_map,
            end_file_offset,
        })
    }

    pub fn string_pool(&self) -> &[String] {
        &self.string_pool
    }

    pub fn resource_map(&self) -> &[u32] {
        &self.res_map
    }

    /// Reads the next event from the file.
    pub fn read_next_event(&mut self) -> Result<Option<Event>> {
        if self.data.stream_position()? >= self.end_file_offset {
            return Ok(None);
        }

        let raw_res_type = self.data.read_u32::<LE>()?;
        let length = self.data.read_u32::<LE>()?;
        let post_ev_offset = self.data.stream_position()? - 8 + length as u64;

        match ChunkType::parse(raw_res_type) {
            Some(known) => {
                let result = match known {
                    ChunkType::XmlStartNamespace => Event::StartNamespace(self.read_namespace()?),
                    ChunkType::XmlEndNamespace => Event::EndNamespace(self.read_namespace()?),
                    ChunkType::XmlStartElement => self.read_element()?,
                    ChunkType::XmlEndElement => self.read_end_element()?,
                    ChunkType::XmlCData => self.read_cdata()?,
                    _ => {
                        return Err(anyhow!(
                            "Invalid res type {raw_res_type} for main file contents"
                        ))
                    }
                };

                // Make sure to seek to the start of the next element
                // (in case reading this element fails, we can continue from the next element)
                self.data.seek(SeekFrom::Start(post_ev_offset))?;

                Ok(Some(result))
            }
            None => {
                let mut contents = vec![0u8; (length as usize).saturating_sub(8)];
                self.data.read_exact(&mut contents)?;

                Ok(Some(Event::Unknown {
                    contents,
                    res_type: raw_res_type,
                }))
            }
        }
    }

    // Reads the line number and comment shared by every node.
    fn read_node_header(&mut self) -> Result<(u32, Option<String>)> {
        let line_num = self.data.read_u32::<LE>()?;
        let comment = self.read_optional_string()?;
        Ok((line_num, comment))
    }

    fn read_optional_string(&mut self) -> Result<Option<String>> {
        let idx = self.data.read_u32::<LE>()?;
        if idx == NO_INDEX {
            Ok(None)
        } else {
            Ok(Some(self.get_pooled_string(idx)?.to_owned()))
        }
    }

    fn read_element(&mut self) -> Result<Event> {
        let (line_num, comment) = self.read_node_header()?;
        let namespace = self.read_optional_string()?;

        let name_idx = self.data.read_u32::<LE>()?;
        let name = self.get_pooled_string(name_idx)?.to_owned();
        if self.data.read_u32::<LE>()? != 0x00140014 {
            return Err(anyhow!("Expected 0x00140014"));
        }

        let num_attributes = self.data.read_u16::<LE>()?;
        let special = SpecialAttributes {
            id: self.data.read_u16::<LE>()?,
            class: self.data.read_u16::<LE>()?,
            style: self.data.read_u16::<LE>()?,
        };

        let mut attributes = Vec::with_capacity(num_attributes as usize);
        for _ in 0..num_attributes {
            attributes.push(self.read_attribute()?);
        }

        Ok(Event::StartElement {
            attributes,
            name,
            namespace,
            line_num,
            comment,
            special,
        })
    }

    fn read_attribute(&mut self) -> Result<Attribute> {
        let namespace = self.read_optional_string()?;
        let name_and_res_id = self.data.read_u32::<LE>()?;
        let raw_value = self.read_optional_string()?;
        let typed = ResValue::read(self.data)?;

        Ok(Attribute {
            name: self.get_pooled_string(name_and_res_id)?.to_string(),
            namespace,
            resource_id: self.res_map.get(name_and_res_id as usize).copied(),
            raw_value,
            value: self.attribute_value(typed)?,
        })
    }

    fn attribute_value(&self, typed: ResValue) -> Result<AttributeValue> {
        Ok(match typed.data_type {
            ValueType::Null => AttributeValue::Null,
            ValueType::String => {
                AttributeValue::String(self.get_pooled_string(typed.data)?.to_string())
            }
            ValueType::IntBoolean => AttributeValue::Boolean(typed.data != 0),
            ValueType::IntDec => AttributeValue::Integer(typed.data as i32),
            ValueType::IntHex => AttributeValue::Hex(typed.data),
            ValueType::Reference => AttributeValue::Reference(typed.data),
            ValueType::Attribute | ValueType::DynamicAttribute => {
                AttributeValue::Attribute(typed.data)
            }
            ValueType::DynamicReference => AttributeValue::DynamicReference(typed.data),
            ValueType::Float => AttributeValue::Float(f32::from_bits(typed.data)),
            ValueType::Dimension => AttributeValue::Dimension(typed.data),
            ValueType::Fraction => AttributeValue::Fraction(typed.data),
            ValueType::IntColorArgb8
            | ValueType::IntColorRgb8
            | ValueType::IntColorArgb4
            | ValueType::IntColorRgb4 => AttributeValue::Color(typed.data),
        })
    }

    fn read_end_element(&mut self) -> Result<Event> {
        let (line_num, _comment) = self.read_node_header()?;
        let namespace = self.read_optional_string()?;

        let name_idx = self.data.read_u32::<LE>()?;
        let name = self.get_pooled_string(name_idx)?;
        Ok(Event::EndElement {
            line_num,
            namespace,
            name: name.to_string(),
        })
    }

    fn read_namespace(&mut self) -> Result<Namespace> {
        let _header = self.read_node_header()?;
        let prefix = self.read_optional_string()?;
        let uri_id = self.data.read_u32::<LE>()?;

        let uri = self.get_pooled_string(uri_id)?;
        Ok(Namespace {
            prefix,
            uri: uri.to_string(),
        })
    }

    fn read_cdata(&mut self) -> Result<Event> {
        let (line_num, _comment) = self.read_node_header()?;
        let text_idx = self.data.read_u32::<LE>()?;
        let _typed = ResValue::read(self.data)?;
        Ok(Event::CData {
            line_num,
            text: self.get_pooled_string(text_idx)?.to_string(),
        })
    }

    fn get_pooled_string(&self, id: u32) -> Result<&str> {
        match self.string_pool.get(id as usize) {
            Some(s) => Ok(s),
            None => Err(anyhow!("Invalid string index {id}")),
        }
    }
}

/// The decoded contents of a `ResStringPool` chunk.
#[derive(Debug, Clone, Default)]
pub struct StringPoolContents {
    pub strings: Vec<String>,
    /// Spans of the first `styles.len()` strings, with span names resolved.
    pub styles: Vec<Vec<StyleSpan>>,
    pub utf8: bool,
}

/// Loads a string pool chunk. `data` must be positioned just past the 8 byte chunk header.
pub fn load_string_pool(data: &mut (impl Read + Seek)) -> Result<StringPoolContents> {
    let begin_chunk = data.stream_position()? - 8; // -8 because of the chunk type/chunk length
    let num_strings = data.read_u32::<LE>()?;
    let num_styles = data.read_u32::<LE>()?;

    let flags = data.read_u32::<LE>()?;
    // Default is UTF16 if the flag is not set
    let utf8 = (flags & UTF8_FLAG) != 0;

    let string_data_offset = data.read_u32::<LE>()?;
    let style_data_offset = data.read_u32::<LE>()?;

    // Load the offsets of each string, which must be added to string_data_offset, then to the offset of the chunk beginning.
    // This calculates the actual location of the string data.
    let mut string_offsets = Vec::with_capacity(num_strings as usize);
    for _ in 0..num_strings {
        string_offsets.push(data.read_u32::<LE>()?);
    }
    let mut style_offsets = Vec::with_capacity(num_styles as usize);
    for _ in 0..num_styles {
        style_offsets.push(data.read_u32::<LE>()?);
    }

    let mut strings: Vec<String> = Vec::with_capacity(num_strings as usize);
    for offset in string_offsets.into_iter() {
        data.seek(SeekFrom::Start(
            begin_chunk + string_data_offset as u64 + offset as u64,
        ))?;

        if utf8 {
            // Length in UTF-16 code units, then in bytes
            let _utf16_len = read_utf8_len(data)?;
            let length = read_utf8_len(data)? as usize;
            let mut buffer = vec![0u8; length];
            data.read_exact(&mut buffer)?;

            strings.push(std::str::from_utf8(&buffer)?.into());
        } else {
            // Length is in UTF-16 codepoints
            let length = read_utf16_len(data)? as usize;
            let mut buffer: Vec<u16> = Vec::with_capacity(length);
            for _ in 0..length {
                buffer.push(data.read_u16::<LE>()?);
            }

            strings.push(String::from_utf16(&buffer)?);
        }
    }

    let mut styles = Vec::with_capacity(num_styles as usize);
    for offset in style_offsets {
        data.seek(SeekFrom::Start(
            begin_chunk + style_data_offset as u64 + offset as u64,
        ))?;
        let mut spans = Vec::new();
        loop {
            let name_idx = data.read_u32::<LE>()?;
            if name_idx == NO_INDEX {
                break;
            }
            let first_char = data.read_u32::<LE>()?;
            let last_char = data.read_u32::<LE>()?;
            let name = strings
                .get(name_idx as usize)
                .ok_or_else(|| anyhow!("Invalid span name index {name_idx}"))?
                .clone();
            spans.push(StyleSpan {
                name,
                first_char,
                last_char,
            });
        }
        styles.push(spans);
    }

    Ok(StringPoolContents {
        strings,
        styles,
        utf8,
    })
}

// Reads the length of a UTF-8 string as encoded in the pool.
// This is a 1-2 byte varint, meaning its maximum value is 32767, as 1 bit is wasted.
fn read_utf8_len(data: &mut impl Read) -> Result<u16> {
    let mut length = data.read_u8()? as u16;
    if length & 0x80 != 0 {
        // High bit set, so length is 2 bytes
        length = ((length & 0x7F) << 8) | data.read_u8()? as u16;
    }

    Ok(length)
}

// Reads the length of a UTF-16 string as encoded in the pool.
// This is a 2 or 4 byte varint.
fn read_utf16_len(data: &mut impl Read) -> Result<u32> {
    let mut length = data.read_u16::<LE>()? as u32;
    if length & 0x8000 != 0 {
        length = ((length & 0x7FFF) << 16) | data.read_u16::<LE>()? as u32;
    }

    Ok(length)
}

//! Compiles Android resource sources into the binary formats the platform loads:
//! the resource table (`resources.arsc`) and binary XML documents.

pub mod compile;
mod config;
mod diag;
mod dump;
mod filter;
mod included;
mod options;
mod pseudo;
mod reader;
mod string_pool;
pub mod table;
mod values;
pub mod xml;

use anyhow::{Context, Result};
use byteorder::{ByteOrder, WriteBytesExt, LE};

pub use config::ConfigDescription;
pub use diag::{ErrorLog, SourcePos};
pub use dump::axml_to_xml;
pub use filter::ResourceFilter;
pub use included::{IncludedResources, NoIncluded, ResourceIds};
pub use options::{CompileOptions, PackageType, Pseudolocalize};
pub use pseudo::{PseudoMethod, Pseudolocalizer};
pub use reader::{load_string_pool, AxmlReader, StringPoolContents};
pub use string_pool::{StringPool, StyleSpan};
pub use table::ResourceTable;
pub use values::{format, ResValue, ValueType};

const UTF8_FLAG: u32 = 0x00000100;

pub const ANDROID_NS_URI: &str = "http://schemas.android.com/apk/res/android";
pub const RESOURCES_ROOT_NAMESPACE: &str = "http://schemas.android.com/apk/res/";
pub const RESOURCES_AUTO_PACKAGE_NAMESPACE: &str = "http://schemas.android.com/apk/res-auto";
pub const RESOURCES_PRV_PREFIX: &str = "http://schemas.android.com/apk/prv/res/";
pub const TOOLS_NS_URI: &str = "http://schemas.android.com/tools";
pub const XLIFF_XMLNS: &str = "urn:oasis:names:tc:xliff:document:1.2";

/// An XML event within the main body of a binary XML file.
#[derive(Debug, Clone)]
pub enum Event {
    /// A chunk this implementation does not understand
    Unknown {
        contents: Vec<u8>,
        res_type: u32,
    },
    StartNamespace(Namespace),
    EndNamespace(Namespace),
    StartElement {
        attributes: Vec<Attribute>,
        name: String,
        namespace: Option<String>,
        line_num: u32,
        comment: Option<String>,
        special: SpecialAttributes,
    },
    EndElement {
        line_num: u32,
        namespace: Option<String>,
        name: String,
    },
    CData {
        line_num: u32,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub prefix: Option<String>,
    pub uri: String,
}

/// 1-based positions of the `id`, `class` and `style` attributes of an element, 0 if absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialAttributes {
    pub id: u16,
    pub class: u16,
    pub style: u16,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub namespace: Option<String>,
    pub resource_id: Option<u32>,
    /// The literal text, unless it was stripped at compile time.
    pub raw_value: Option<String>,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    String(String),
    Boolean(bool),
    Integer(i32),
    Hex(u32),
    Reference(u32), // Reference ID
    Attribute(u32),
    DynamicReference(u32),
    Float(f32),
    Dimension(u32), // Complex value
    Fraction(u32),
    Color(u32),
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub(crate) enum ChunkType {
    StringPool,
    Table,
    Xml,
    XmlResourceMap,
    XmlStartNamespace,
    XmlEndNamespace,
    XmlStartElement,
    XmlEndElement,
    XmlCData,
    TablePackage,
    TableType,
    TableTypeSpec,
    TableLibrary,
}

impl ChunkType {
    pub(crate) fn parse(from: u32) -> Option<Self> {
        match from & 0xFFFF {
            0x0001 => Some(Self::StringPool),
            0x0002 => Some(Self::Table),
            0x0003 => Some(Self::Xml),
            0x0180 => Some(Self::XmlResourceMap),
            0x0103 => Some(Self::XmlEndElement),
            0x0100 => Some(Self::XmlStartNamespace),
            0x0101 => Some(Self::XmlEndNamespace),
            0x0102 => Some(Self::XmlStartElement),
            0x0104 => Some(Self::XmlCData),
            0x0200 => Some(Self::TablePackage),
            0x0201 => Some(Self::TableType),
            0x0202 => Some(Self::TableTypeSpec),
            0x0203 => Some(Self::TableLibrary),
            _ => None,
        }
    }

    /// Size of the fixed header that starts every chunk of this type.
    pub(crate) fn header_size(&self) -> u32 {
        match self {
            ChunkType::StringPool => 0x001C,
            ChunkType::Table | ChunkType::TableLibrary => 0x000C,
            ChunkType::XmlResourceMap | ChunkType::Xml => 0x0008,
            ChunkType::TablePackage => 0x0120,
            ChunkType::TableType => 0x0054,
            _ => 0x0010,
        }
    }

    pub(crate) fn save(&self) -> u32 {
        let id = match self {
            ChunkType::StringPool => 0x0001,
            ChunkType::Table => 0x0002,
            ChunkType::Xml => 0x0003,
            ChunkType::XmlResourceMap => 0x0180,
            ChunkType::XmlStartNamespace => 0x0100,
            ChunkType::XmlEndNamespace => 0x0101,
            ChunkType::XmlStartElement => 0x0102,
            ChunkType::XmlEndElement => 0x0103,
            ChunkType::XmlCData => 0x0104,
            ChunkType::TablePackage => 0x0200,
            ChunkType::TableType => 0x0201,
            ChunkType::TableTypeSpec => 0x0202,
            ChunkType::TableLibrary => 0x0203,
        };

        id | self.header_size() << 16
    }
}

// Starts a chunk whose total size is not yet known. Returns the offset to pass to `end_chunk`.
pub(crate) fn begin_chunk(out: &mut Vec<u8>, chunk_type: ChunkType) -> Result<usize> {
    let start = out.len();
    out.write_u32::<LE>(chunk_type.save())?;
    out.write_u32::<LE>(0)?;
    Ok(start)
}

// Patches the size field of a chunk started with `begin_chunk`.
pub(crate) fn end_chunk(out: &mut [u8], start: usize) -> Result<()> {
    let size: u32 = (out.len() - start)
        .try_into()
        .context("Chunk too large")?;
    LE::write_u32(&mut out[start + 4..start + 8], size);
    Ok(())
}

/// Builds a resource ID from its package, type and entry parts.
pub const fn make_res_id(package_id: u32, type_id: u32, entry_id: u32) -> u32 {
    (package_id << 24) | ((type_id & 0xFF) << 16) | (entry_id & 0xFFFF)
}

pub const fn res_package_id(id: u32) -> u32 {
    id >> 24
}

pub const fn res_type_id(id: u32) -> u32 {
    (id >> 16) & 0xFF
}

pub const fn res_entry_id(id: u32) -> u32 {
    id & 0xFFFF
}

/// IDs with a type but no package are compiler-internal (`^type`, `^index_N` and friends).
pub const fn is_internal_id(id: u32) -> bool {
    (id & 0xFFFF0000) != 0 && (id & 0x00FF0000) == 0
}

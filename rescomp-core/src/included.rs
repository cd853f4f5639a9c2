use anyhow::{anyhow, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::{
    collections::HashMap,
    io::{Cursor, Read, Seek, Write},
    rc::Rc,
};

use crate::res_package_id;

/// Resources from already-built packages (usually the framework) that the table being compiled
/// can reference but not modify.
pub trait IncludedResources {
    /// Looks up `package:type/name`. With `only_public`, private resources are not found.
    fn identifier_for_name(
        &self,
        package: &str,
        type_name: &str,
        name: &str,
        only_public: bool,
    ) -> Option<u32>;

    /// The `^type` format bits of an attribute resource, if known.
    fn attribute_type(&self, res_id: u32) -> Option<u32>;

    /// Enum or flag symbols declared by an attribute resource.
    fn attribute_bag(&self, res_id: u32) -> Option<Vec<(String, u32)>>;

    /// Package IDs and names of every included package.
    fn packages(&self) -> Vec<(u8, String)>;
}

/// No included resources at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIncluded;

impl IncludedResources for NoIncluded {
    fn identifier_for_name(&self, _: &str, _: &str, _: &str, _: bool) -> Option<u32> {
        None
    }

    fn attribute_type(&self, _: u32) -> Option<u32> {
        None
    }

    fn attribute_bag(&self, _: u32) -> Option<Vec<(String, u32)>> {
        None
    }

    fn packages(&self) -> Vec<(u8, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
struct AttrInfo {
    format: u32,
    symbols: Vec<(String, u32)>,
}

/// Stores a map of `type/name` resource names to resource IDs for one included package.
///
/// The symbol file is a sequence of records: the byte length of the name as a `u32`, the name in
/// UTF-16LE, then the `u32` resource ID.
#[derive(Debug, Clone)]
pub struct ResourceIds {
    package: String,
    ids: HashMap<Rc<str>, u32>,
    private: HashMap<Rc<str>, u32>,
    attrs: HashMap<u32, AttrInfo>,
}

impl ResourceIds {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ids: HashMap::new(),
            private: HashMap::new(),
            attrs: HashMap::new(),
        }
    }

    /// Loads the public resource IDs of `package` from a symbol file.
    pub fn load(package: impl Into<String>, data: &mut (impl Read + Seek)) -> Result<Self> {
        let mut result = Self::new(package);
        let end = data.seek(std::io::SeekFrom::End(0))?;
        data.seek(std::io::SeekFrom::Start(0))?;

        while data.stream_position()? < end {
            let name_length = data.read_u32::<LE>()? >> 1;

            let mut buffer: Vec<u16> = Vec::with_capacity(name_length as usize);
            for _ in 0..name_length {
                buffer.push(data.read_u16::<LE>()?);
            }

            let resource_id = data.read_u32::<LE>()?;
            let name = String::from_utf16(&buffer)?;
            if !name.contains('/') {
                return Err(anyhow!("Symbol `{name}` is not of the form type/name"));
            }
            result.ids.insert(name.into(), resource_id);
        }

        Ok(result)
    }

    pub fn load_from_bytes(package: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        Self::load(package, &mut Cursor::new(bytes))
    }

    /// Writes the public resource IDs in the symbol file format.
    pub fn save(&self, to: &mut impl Write) -> Result<()> {
        let mut names: Vec<(&Rc<str>, &u32)> = self.ids.iter().collect();
        names.sort_by_key(|(_, id)| **id);
        for (name, id) in names {
            let units: Vec<u16> = name.encode_utf16().collect();
            to.write_u32::<LE>((units.len() * 2) as u32)?;
            for unit in units {
                to.write_u16::<LE>(unit)?;
            }
            to.write_u32::<LE>(*id)?;
        }
        Ok(())
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn insert(&mut self, type_name: &str, name: &str, id: u32) -> &mut Self {
        self.ids.insert(format!("{type_name}/{name}").into(), id);
        self
    }

    pub fn insert_private(&mut self, type_name: &str, name: &str, id: u32) -> &mut Self {
        self.private.insert(format!("{type_name}/{name}").into(), id);
        self
    }

    /// Declares an attribute together with its format and enum/flag symbols.
    pub fn insert_attr(
        &mut self,
        name: &str,
        id: u32,
        format: u32,
        symbols: &[(&str, u32)],
    ) -> &mut Self {
        self.insert("attr", name, id);
        self.attrs.insert(
            id,
            AttrInfo {
                format,
                symbols: symbols
                    .iter()
                    .map(|(name, value)| (name.to_string(), *value))
                    .collect(),
            },
        );
        self
    }

    // Gets the resource ID for a particular `type/name`. Returns None if no ID exists.
    pub fn get_res_id_or_none(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }
}

impl IncludedResources for ResourceIds {
    fn identifier_for_name(
        &self,
        package: &str,
        type_name: &str,
        name: &str,
        only_public: bool,
    ) -> Option<u32> {
        if package != self.package {
            return None;
        }
        let key = format!("{type_name}/{name}");
        match self.ids.get(key.as_str()) {
            Some(id) => Some(*id),
            None if !only_public => self.private.get(key.as_str()).copied(),
            None => None,
        }
    }

    fn attribute_type(&self, res_id: u32) -> Option<u32> {
        self.attrs.get(&res_id).map(|attr| attr.format)
    }

    fn attribute_bag(&self, res_id: u32) -> Option<Vec<(String, u32)>> {
        self.attrs.get(&res_id).map(|attr| attr.symbols.clone())
    }

    fn packages(&self) -> Vec<(u8, String)> {
        let package_id = self
            .ids
            .values()
            .chain(self.private.values())
            .next()
            .map(|id| res_package_id(*id) as u8)
            .unwrap_or(0x01);
        vec![(package_id, self.package.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_saved_symbols() {
        let mut ids = ResourceIds::new("android");
        ids.insert("attr", "label", 0x01010001)
            .insert("style", "Theme", 0x01030005);

        let mut data = Vec::new();
        ids.save(&mut data).unwrap();
        let loaded = ResourceIds::load_from_bytes("android", &data).unwrap();
        assert_eq!(loaded.get_res_id_or_none("attr/label"), Some(0x01010001));
        assert_eq!(
            loaded.identifier_for_name("android", "style", "Theme", true),
            Some(0x01030005)
        );
        assert_eq!(loaded.identifier_for_name("other", "style", "Theme", true), None);
        assert_eq!(loaded.packages(), vec![(0x01, "android".to_string())]);
    }

    #[test]
    fn private_symbols_need_private_lookup() {
        let mut ids = ResourceIds::new("android");
        ids.insert_private("string", "secret", 0x01040099);
        assert_eq!(ids.identifier_for_name("android", "string", "secret", true), None);
        assert_eq!(
            ids.identifier_for_name("android", "string", "secret", false),
            Some(0x01040099)
        );
    }
}

//! Writes the table as a `resources.arsc` chunk.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, WriteBytesExt, LE};
use log::debug;

use super::{CoerceParams, Entry, EntryValue, Item, ResourceTable};
use crate::{
    begin_chunk, end_chunk, make_res_id, ChunkType, CompileOptions, ConfigDescription, ErrorLog,
    ResValue, ResourceFilter, StringPool, ValueType,
};

const NO_ENTRY: u32 = 0xFFFFFFFF;
const SPEC_PUBLIC: u32 = 0x40000000;
const FLAG_COMPLEX: u16 = 0x0001;
const FLAG_PUBLIC: u16 = 0x0002;
const EMPTY_TYPE: &str = "<empty>";
/// Package names are a fixed array of UTF-16 units.
const PACKAGE_NAME_LEN: usize = 128;

/// Types whose strings are grouped first in the value pool, since they rarely vary by locale.
const COMPLEX_TYPES: &[&str] = &[
    "drawable",
    "layout",
    "color",
    "anim",
    "interpolator",
    "animator",
    "xml",
    "menu",
    "mipmap",
    "raw",
];

// Where an entry lives: type slot, entry slot and configuration.
type EntryKey = (usize, usize, ConfigDescription);

#[derive(Debug)]
enum Prepared {
    Item(ResValue),
    /// Sorted by key ID. A key given twice keeps its last value.
    Bag(BTreeMap<u32, ResValue>),
}

fn config_type_name(type_name: &str) -> &'static str {
    if COMPLEX_TYPES.contains(&type_name) {
        "1complex"
    } else {
        "2value"
    }
}

fn write_package_name(out: &mut Vec<u8>, name: &str) -> Result<()> {
    let mut units: Vec<u16> = name.encode_utf16().take(PACKAGE_NAME_LEN - 1).collect();
    units.resize(PACKAGE_NAME_LEN, 0);
    for unit in units {
        out.write_u16::<LE>(unit)?;
    }
    Ok(())
}

impl ResourceTable {
    // Coerces one item, placing strings in the value pool.
    fn prepare_item(
        &self,
        item: &Item,
        name: &str,
        params: &CoerceParams,
        pool: &mut StringPool,
        type_name: &str,
        config: &ConfigDescription,
    ) -> Result<ResValue> {
        let ctn = Some(config_type_name(type_name));
        if !item.style.is_empty() {
            let pos = pool.add_styled(&item.value, &item.style, ctn, Some(config));
            return Ok(ResValue::new(ValueType::String, pos as u32));
        }

        let coerced = self.coerce(&item.value, params).map_err(|msg| {
            item.pos.error(format!(
                "Error: {msg} (at '{name}' with value '{}').",
                item.value
            ))
        })?;
        match coerced.string {
            Some(text) => {
                let pos = pool.add_with_config(&text, true, ctn, Some(config));
                Ok(ResValue::new(ValueType::String, pos as u32))
            }
            None => Ok(coerced.value),
        }
    }

    fn prepare_entry(
        &self,
        entry: &Entry,
        pool: &mut StringPool,
        type_name: &str,
        config: &ConfigDescription,
        errors: &mut ErrorLog,
    ) -> Option<Prepared> {
        match &entry.value {
            EntryValue::Item(item) => {
                let params = CoerceParams {
                    attr_type: entry.item_format,
                    ..Default::default()
                };
                errors
                    .record(self.prepare_item(item, &entry.name, &params, pool, type_name, config))
                    .map(Prepared::Item)
            }
            EntryValue::Bag(bag) => {
                let mut values = BTreeMap::new();
                for (key, item) in bag {
                    let params = CoerceParams {
                        attr_id: item.bag_key_id,
                        attr_type: item.format,
                        ..Default::default()
                    };
                    let value = errors
                        .record(self.prepare_item(item, key, &params, pool, type_name, config))?;
                    values.insert(item.bag_key_id, value);
                }
                Some(Prepared::Bag(values))
            }
            EntryValue::Unknown => {
                errors.push(entry.pos.error(format!(
                    "Error: entry {} is not a single item or a bag.",
                    entry.name
                )));
                None
            }
        }
    }

    /// Builds `resources.arsc`. Resource IDs must have been assigned.
    ///
    /// Configurations rejected by `filter` are left out, except for mipmaps.
    pub fn flatten(&self, filter: &ResourceFilter, options: &CompileOptions) -> Result<Vec<u8>> {
        let utf8 = !options.utf16_strings;
        let mut value_pool = StringPool::new(utf8);
        let mut type_strings = StringPool::new(utf8);
        let mut key_strings = StringPool::new(utf8);
        let mut key_indices: HashMap<(usize, usize), u32> = HashMap::new();
        let mut prepared: HashMap<EntryKey, Prepared> = HashMap::new();
        let mut errors = ErrorLog::new();

        let types = self.package.ordered_types();
        for (ti, t) in types.iter().enumerate() {
            let Some(t) = t else {
                type_strings.add(EMPTY_TYPE, false);
                continue;
            };
            type_strings.add(&t.name, false);

            let filterable = t.name != "mipmap";
            for (ei, list) in t.ordered().iter().enumerate() {
                let Some(list) = list else {
                    continue;
                };
                for (config, entry) in &list.entries {
                    if filterable && !filter.matches(config) {
                        continue;
                    }
                    let key = key_strings.add(&entry.name, true);
                    key_indices.insert((ti, ei), key as u32);
                    if let Some(value) =
                        self.prepare_entry(entry, &mut value_pool, &t.name, config, &mut errors)
                    {
                        prepared.insert((ti, ei, *config), value);
                    }
                }
            }
        }
        errors.finish("Preparing resource values")?;

        value_pool.sort_by_config();
        let remap = |value: &mut ResValue| {
            if value.data_type == ValueType::String {
                value.data = value_pool.map_original_pos_to_new_pos(value.data as usize) as u32;
            }
        };
        for value in prepared.values_mut() {
            match value {
                Prepared::Item(item) => remap(item),
                Prepared::Bag(items) => {
                    for item in items.values_mut() {
                        remap(item);
                    }
                }
            }
        }

        let mut out = Vec::new();
        let table_start = begin_chunk(&mut out, ChunkType::Table)?;
        out.write_u32::<LE>(u32::from(!self.package.is_empty()))?;
        value_pool.write_string_block(&mut out)?;

        if !self.package.is_empty() {
            self.write_package(
                &mut out,
                filter,
                options,
                &mut type_strings,
                &mut key_strings,
                &key_indices,
                &prepared,
            )?;
        }

        end_chunk(&mut out, table_start)?;
        debug!(
            "Flattened {} types into {} bytes",
            type_strings.size(),
            out.len()
        );
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_package(
        &self,
        out: &mut Vec<u8>,
        filter: &ResourceFilter,
        options: &CompileOptions,
        type_strings: &mut StringPool,
        key_strings: &mut StringPool,
        key_indices: &HashMap<(usize, usize), u32>,
        prepared: &HashMap<EntryKey, Prepared>,
    ) -> Result<()> {
        let package_id = self.package.id as u32;
        let start = begin_chunk(out, ChunkType::TablePackage)?;
        out.write_u32::<LE>(package_id)?;
        write_package_name(out, &self.package.name)?;
        let offsets_at = out.len();
        out.write_u32::<LE>(0)?; // typeStrings
        out.write_u32::<LE>(type_strings.size() as u32)?; // lastPublicType
        out.write_u32::<LE>(0)?; // keyStrings
        out.write_u32::<LE>(key_strings.size() as u32)?; // lastPublicKey
        out.write_u32::<LE>(0)?; // typeIdOffset

        let type_strings_start = (out.len() - start) as u32;
        type_strings.write_string_block(out)?;
        let key_strings_start = (out.len() - start) as u32;
        key_strings.write_string_block(out)?;
        LE::write_u32(&mut out[offsets_at..], type_strings_start);
        LE::write_u32(&mut out[offsets_at + 8..], key_strings_start);

        self.write_library(out)?;

        let mut missing = false;
        for (ti, t) in self.package.ordered_types().iter().enumerate() {
            let Some(t) = t else {
                continue;
            };
            let filterable = t.name != "mipmap";
            let keep = |config: &ConfigDescription| !filterable || filter.matches(config);
            let lists = t.ordered();
            let count = lists.len();

            // typeSpec: one flags word per entry
            let spec_start = begin_chunk(out, ChunkType::TableTypeSpec)?;
            out.write_u8(ti as u8 + 1)?;
            out.write_u8(0)?;
            out.write_u16::<LE>(0)?;
            out.write_u32::<LE>(count as u32)?;
            for list in lists {
                let mut flags = 0;
                if let Some(list) = list {
                    if list.public {
                        flags |= SPEC_PUBLIC;
                    }
                    let configs: Vec<&ConfigDescription> =
                        list.entries.keys().filter(|c| keep(*c)).collect();
                    for (i, a) in configs.iter().enumerate() {
                        for b in &configs[i + 1..] {
                            flags |= a.diff(b);
                        }
                    }
                }
                out.write_u32::<LE>(flags)?;
            }
            end_chunk(out, spec_start)?;

            let mut valid = vec![false; count];
            for config in t.unique_configs().iter().filter(|c| keep(*c)) {
                let type_start = begin_chunk(out, ChunkType::TableType)?;
                out.write_u8(ti as u8 + 1)?;
                out.write_u8(0)?;
                out.write_u16::<LE>(0)?;
                out.write_u32::<LE>(count as u32)?;
                out.write_u32::<LE>(ChunkType::TableType.header_size() + 4 * count as u32)?;
                config.write(out)?;

                let index_start = out.len();
                out.resize(index_start + 4 * count, 0);
                let entries_start = out.len();

                for (ei, list) in lists.iter().enumerate() {
                    let found = list.as_ref().and_then(|list| {
                        let value = prepared.get(&(ti, ei, *config))?;
                        let entry = list.entries.get(config)?;
                        Some((list, entry, value))
                    });
                    let offset = match found {
                        Some((list, entry, value)) => {
                            let offset = (out.len() - entries_start) as u32;
                            let key = key_indices.get(&(ti, ei)).copied().unwrap_or(0);
                            write_entry(out, entry, value, key, list.public)?;
                            valid[ei] = true;
                            offset
                        }
                        None => NO_ENTRY,
                    };
                    LE::write_u32(&mut out[index_start + 4 * ei..], offset);
                }
                end_chunk(out, type_start)?;
            }

            for (ei, list) in lists.iter().enumerate() {
                let Some(list) = list.as_ref().filter(|_| !valid[ei]) else {
                    continue;
                };
                let message = format!(
                    "no entries written for {}/{} (0x{:08x})",
                    t.name,
                    list.name,
                    make_res_id(package_id, ti as u32 + 1, ei as u32)
                );
                if options.error_on_missing_config_entry {
                    // Logged here, reported once the whole package has been checked
                    let _ = list.pos.error(message);
                    missing = true;
                } else {
                    list.pos.warning(message);
                }
            }
        }

        if missing {
            return Err(anyhow!("Missing entries, quit!"));
        }
        end_chunk(out, start)
    }

    // Records the IDs of shared library packages this one links against.
    fn write_library(&self, out: &mut Vec<u8>) -> Result<()> {
        let libraries: Vec<(u8, String)> = self
            .included()
            .packages()
            .into_iter()
            .filter(|(id, name)| *id > 0x01 && *id != 0x7f && name != "android")
            .collect();
        if libraries.is_empty() {
            return Ok(());
        }

        let start = begin_chunk(out, ChunkType::TableLibrary)?;
        out.write_u32::<LE>(libraries.len() as u32)?;
        for (id, name) in libraries {
            out.write_u32::<LE>(id as u32)?;
            write_package_name(out, &name)?;
        }
        end_chunk(out, start)
    }
}

fn write_entry(
    out: &mut Vec<u8>,
    entry: &Entry,
    value: &Prepared,
    key: u32,
    public: bool,
) -> Result<()> {
    let mut flags = if public { FLAG_PUBLIC } else { 0 };
    match value {
        Prepared::Item(value) => {
            out.write_u16::<LE>(8)?;
            out.write_u16::<LE>(flags)?;
            out.write_u32::<LE>(key)?;
            value.write(out)?;
        }
        Prepared::Bag(items) => {
            flags |= FLAG_COMPLEX;
            out.write_u16::<LE>(16)?;
            out.write_u16::<LE>(flags)?;
            out.write_u32::<LE>(key)?;
            out.write_u32::<LE>(entry.parent_id)?;
            out.write_u32::<LE>(items.len() as u32)?;
            for (name, value) in items {
                out.write_u32::<LE>(*name)?;
                value.write(out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{format, NoIncluded, PackageType, SourcePos};
    use byteorder::ReadBytesExt;
    use std::io::Cursor;

    fn add(table: &mut ResourceTable, type_name: &str, name: &str, value: &str, config: &str) {
        table
            .add_entry(
                &SourcePos::new("res/values/strings.xml", 1),
                "com.example",
                type_name,
                name,
                value,
                &[],
                &ConfigDescription::parse(config).unwrap(),
                false,
                format::ANY,
                false,
            )
            .unwrap();
    }

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        LE::read_u32(&data[offset..])
    }

    // Offsets of every chunk of `chunk_type` directly inside the package chunk.
    fn find_chunks(data: &[u8], chunk_type: u16) -> Vec<usize> {
        let mut cursor = Cursor::new(data);
        cursor.set_position(u16::from_le_bytes([data[2], data[3]]) as u64);
        // skip the value pool
        let pool_size = u32_at(data, cursor.position() as usize + 4);
        let package = cursor.position() as usize + pool_size as usize;
        let package_header = u16::from_le_bytes([data[package + 2], data[package + 3]]) as usize;

        let mut found = Vec::new();
        let mut offset = package + package_header;
        let end = package + u32_at(data, package + 4) as usize;
        while offset < end {
            cursor.set_position(offset as u64);
            let kind = cursor.read_u16::<LE>().unwrap();
            if kind == chunk_type {
                found.push(offset);
            }
            offset += u32_at(data, offset + 4) as usize;
        }
        found
    }

    #[test]
    fn writes_one_type_chunk_per_config() {
        let mut table =
            ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded));
        add(&mut table, "string", "hello", "Hello", "");
        add(&mut table, "string", "hello", "Bonjour", "fr");
        add(&mut table, "string", "bye", "Bye", "");
        table.assign_resource_ids().unwrap();

        let data = table
            .flatten(&ResourceFilter::new(), &CompileOptions::new("com.example"))
            .unwrap();
        assert_eq!(u32_at(&data, 0) & 0xFFFF, 0x0002);
        assert_eq!(u32_at(&data, 4) as usize, data.len());
        assert_eq!(u32_at(&data, 8), 1);

        // attr and string each get a typeSpec
        assert_eq!(find_chunks(&data, 0x0202).len(), 2);
        let types = find_chunks(&data, 0x0201);
        assert_eq!(types.len(), 2);

        let fr = types[1];
        assert_eq!(data[fr + 8], 2);
        assert_eq!(u32_at(&data, fr + 12), 2);
        // `bye` has no French value
        let index = fr + 0x54;
        assert_ne!(u32_at(&data, index), NO_ENTRY);
        assert_eq!(u32_at(&data, index + 4), NO_ENTRY);
    }

    #[test]
    fn filtered_out_entries_are_reported() {
        let mut table =
            ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded));
        add(&mut table, "string", "only_fr", "Salut", "fr");
        table.assign_resource_ids().unwrap();

        let filter = ResourceFilter::parse("de").unwrap();
        let mut options = CompileOptions::new("com.example");
        assert!(table.flatten(&filter, &options).is_ok());

        options.error_on_missing_config_entry = true;
        assert!(table.flatten(&filter, &options).is_err());
    }

    #[test]
    fn invalid_values_fail_with_context() {
        let mut table =
            ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded));
        table
            .add_entry(
                &SourcePos::new("res/values/dimens.xml", 4),
                "com.example",
                "dimen",
                "gap",
                "wide",
                &[],
                &ConfigDescription::default(),
                false,
                format::DIMENSION,
                false,
            )
            .unwrap();
        table.assign_resource_ids().unwrap();

        let err = table
            .flatten(&ResourceFilter::new(), &CompileOptions::new("com.example"))
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Error: String types not allowed (at 'gap' with value 'wide')."));
    }

    #[test]
    fn mipmaps_ignore_the_filter() {
        let mut table =
            ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded));
        add(&mut table, "mipmap", "icon", "res/mipmap-hdpi/icon.png", "hdpi");
        add(&mut table, "string", "title", "Title", "");
        table.assign_resource_ids().unwrap();

        let mut options = CompileOptions::new("com.example");
        options.error_on_missing_config_entry = true;
        let filter = ResourceFilter::parse("en").unwrap();
        let data = table.flatten(&filter, &options).unwrap();
        // attr has no configs; mipmap and string get one type chunk each
        assert_eq!(find_chunks(&data, 0x0201).len(), 2);
    }
}

//! The deduplicating string table that backs every `ResStringPool` chunk.

use std::collections::HashMap;

use anyhow::{Context, Result};
use byteorder::{WriteBytesExt, LE};

use crate::{begin_chunk, end_chunk, ChunkType, ConfigDescription, UTF8_FLAG};

const SPAN_END: u32 = 0xFFFFFFFF;

/// A styled run of characters, in UTF-16 code units, inclusive at both ends.
/// `name` is the tag, e.g. `b` or `font;color=red`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSpan {
    pub name: String,
    pub first_char: u32,
    pub last_char: u32,
}

#[derive(Debug, Clone)]
struct PoolEntry {
    value: String,
    // "1complex"/"2value" bucket used to group strings, " " once buckets conflict.
    config_type_name: String,
    // Kept sorted by `compare_logical`, without exact duplicates.
    configs: Vec<ConfigDescription>,
    // Every position in the string array that refers to this entry.
    indices: Vec<usize>,
    has_styles: bool,
    offset: usize,
}

impl PoolEntry {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            config_type_name: String::new(),
            configs: Vec::new(),
            indices: Vec::new(),
            has_styles: false,
            offset: 0,
        }
    }

    // Styled strings first, then by bucket, then by the logical order of their configs.
    fn compare(&self, o: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self.has_styles, o.has_styles) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        self.config_type_name
            .cmp(&o.config_type_name)
            .then_with(|| {
                self.configs
                    .iter()
                    .zip(o.configs.iter())
                    .map(|(l, r)| l.compare_logical(r))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
            .then(self.configs.len().cmp(&o.configs.len()))
    }
}

#[derive(Debug, Clone, Default)]
struct EntryStyle {
    spans: Vec<StyleSpan>,
    // Pool positions of each span name, resolved when the block is written.
    name_indices: Vec<usize>,
    offset: usize,
}

/// Builds a `ResStringPool`.
///
/// Strings are appended to a position array. Unstyled duplicates may share a position; styled
/// strings always get their own since spans belong to a position.
pub struct StringPool {
    utf8: bool,

    // Value to the first position it was added at.
    values: HashMap<String, usize>,
    entries: Vec<PoolEntry>,
    // Position to entry index.
    entry_array: Vec<usize>,
    // Position to styles; may be shorter than `entry_array`.
    entry_styles: Vec<EntryStyle>,

    original_to_new_pos: Option<Vec<usize>>,
}

impl StringPool {
    pub fn new(utf8: bool) -> Self {
        Self {
            utf8,
            values: HashMap::new(),
            entries: Vec::new(),
            entry_array: Vec::new(),
            entry_styles: Vec::new(),
            original_to_new_pos: None,
        }
    }

    pub fn is_utf8(&self) -> bool {
        self.utf8
    }

    /// Number of positions in the pool.
    pub fn size(&self) -> usize {
        self.entry_array.len()
    }

    /// Number of unique strings in the pool.
    pub fn count_unique(&self) -> usize {
        self.entries.len()
    }

    pub fn string_at(&self, pos: usize) -> Option<&str> {
        let entry = self.entry_array.get(pos)?;
        Some(&self.entries[*entry].value)
    }

    pub fn add(&mut self, value: &str, merge_duplicates: bool) -> usize {
        self.add_with_config(value, merge_duplicates, None, None)
    }

    /// Adds a string and returns its position.
    ///
    /// With `merge_duplicates`, an unstyled string that is already present shares its first
    /// position and only the config metadata of its entry is extended.
    pub fn add_with_config(
        &mut self,
        value: &str,
        merge_duplicates: bool,
        config_type_name: Option<&str>,
        config: Option<&ConfigDescription>,
    ) -> usize {
        let first_pos = self.values.get(value).copied();
        let entry_idx = match first_pos {
            Some(pos) => self.entry_array[pos],
            None => {
                self.entries.push(PoolEntry::new(value));
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[entry_idx];
        if let Some(type_name) = config_type_name {
            if entry.config_type_name.is_empty() {
                entry.config_type_name = type_name.to_string();
            } else if entry.config_type_name != type_name {
                entry.config_type_name = " ".to_string();
            }
        }

        if let Some(config) = config {
            if let Err(insert_at) = entry
                .configs
                .binary_search_by(|existing| existing.compare_logical(config))
            {
                entry.configs.insert(insert_at, *config);
            }
        }

        let styled = first_pos
            .and_then(|pos| self.entry_styles.get(pos))
            .map(|style| !style.spans.is_empty())
            .unwrap_or(false);

        match first_pos {
            Some(pos) if merge_duplicates && !styled => pos,
            _ => {
                let pos = self.entry_array.len();
                self.entry_array.push(entry_idx);
                self.entries[entry_idx].indices.push(pos);
                if first_pos.is_none() {
                    self.values.insert(value.to_string(), pos);
                }
                pos
            }
        }
    }

    /// Adds a string with style spans. Never merged with existing positions.
    pub fn add_styled(
        &mut self,
        value: &str,
        spans: &[StyleSpan],
        config_type_name: Option<&str>,
        config: Option<&ConfigDescription>,
    ) -> usize {
        let pos = self.add_with_config(value, false, config_type_name, config);
        for span in spans {
            self.add_style_span(pos, span.clone());
        }
        pos
    }

    pub fn add_style_span(&mut self, pos: usize, span: StyleSpan) {
        if self.entry_styles.len() <= pos {
            self.entry_styles.resize_with(pos + 1, EntryStyle::default);
        }
        self.entry_styles[pos].spans.push(span);
        let entry = self.entry_array[pos];
        self.entries[entry].has_styles = true;
    }

    /// Reorders positions for locality: styled strings first, then by config bucket and
    /// logical config order. Positions captured before sorting must be remapped with
    /// `map_original_pos_to_new_pos`.
    ///
    /// # Panics
    /// If the pool has already been sorted.
    pub fn sort_by_config(&mut self) {
        if self.original_to_new_pos.is_some() {
            panic!("Can't sort string pool after already sorted.");
        }

        let count = self.entry_array.len();
        let mut new_to_original: Vec<usize> = (0..count).collect();
        {
            let entries = &self.entries;
            let entry_array = &self.entry_array;
            new_to_original
                .sort_by(|l, r| entries[entry_array[*l]].compare(&entries[entry_array[*r]]));
        }

        let mut original_to_new = vec![0; count];
        for (new_pos, original) in new_to_original.iter().enumerate() {
            original_to_new[*original] = new_pos;
        }

        let mut new_entries: Vec<PoolEntry> = Vec::new();
        let mut new_entry_array = Vec::with_capacity(count);
        let mut new_styles = Vec::new();
        // Old entry index to new entry index, so positions of one string stay on one entry.
        let mut remapped_entries: HashMap<usize, usize> = HashMap::new();
        for (new_pos, old_pos) in new_to_original.iter().enumerate() {
            let old_entry = self.entry_array[*old_pos];
            let new_entry = *remapped_entries.entry(old_entry).or_insert_with(|| {
                let mut entry = self.entries[old_entry].clone();
                entry.indices.clear();
                new_entries.push(entry);
                new_entries.len() - 1
            });
            new_entries[new_entry].indices.push(new_pos);
            new_entry_array.push(new_entry);

            if !self.entry_styles.is_empty() {
                new_styles.push(self.entry_styles.get(*old_pos).cloned().unwrap_or_default());
            }
        }

        while new_styles
            .last()
            .map(|style: &EntryStyle| style.spans.is_empty())
            .unwrap_or(false)
        {
            new_styles.pop();
        }

        self.values = new_entries
            .iter()
            .map(|entry| (entry.value.clone(), entry.indices[0]))
            .collect();
        self.entries = new_entries;
        self.entry_array = new_entry_array;
        self.entry_styles = new_styles;
        self.original_to_new_pos = Some(original_to_new);
    }

    /// Where a position captured before `sort_by_config` lives now.
    pub fn map_original_pos_to_new_pos(&self, pos: usize) -> usize {
        match &self.original_to_new_pos {
            Some(map) => map.get(pos).copied().unwrap_or(pos),
            None => pos,
        }
    }

    /// First position of a string.
    pub fn offset_for_string(&self, value: &str) -> Option<usize> {
        self.values.get(value).copied()
    }

    /// Every position holding a string.
    pub fn offsets_for_string(&self, value: &str) -> Option<&[usize]> {
        let pos = self.values.get(value)?;
        Some(&self.entries[self.entry_array[*pos]].indices)
    }

    pub fn create_string_block(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_string_block(&mut out)?;
        Ok(out)
    }

    /// Appends the `ResStringPool` chunk. Span names are pooled first, so they land after every
    /// string added by the caller.
    pub fn write_string_block(&mut self, out: &mut Vec<u8>) -> Result<()> {
        for style_idx in 0..self.entry_styles.len() {
            let names: Vec<String> = self.entry_styles[style_idx]
                .spans
                .iter()
                .map(|span| span.name.clone())
                .collect();
            let indices = names.iter().map(|name| self.add(name, true)).collect();
            self.entry_styles[style_idx].name_indices = indices;
        }

        let string_count = self.entry_array.len();
        let style_count = self.entry_styles.len();
        let pre_size = 28 + 4 * string_count + 4 * style_count;

        let mut strings: Vec<u8> = Vec::new();
        for entry in self.entries.iter_mut() {
            entry.offset = strings.len();
            let utf16: Vec<u16> = entry.value.encode_utf16().collect();
            if self.utf8 {
                encode_length(&mut strings, utf16.len(), 1)?;
                encode_length(&mut strings, entry.value.len(), 1)?;
                strings.extend_from_slice(entry.value.as_bytes());
                strings.push(0);
            } else {
                encode_length(&mut strings, utf16.len(), 2)?;
                for unit in utf16 {
                    strings.write_u16::<LE>(unit)?;
                }
                strings.write_u16::<LE>(0)?;
            }
        }
        while strings.len() % 4 != 0 {
            strings.push(0);
        }

        let mut styles: Vec<u8> = Vec::new();
        for style in self.entry_styles.iter_mut() {
            style.offset = styles.len();
            for (span, name_idx) in style.spans.iter().zip(style.name_indices.iter()) {
                styles.write_u32::<LE>((*name_idx).try_into().context("String pool too large")?)?;
                styles.write_u32::<LE>(span.first_char)?;
                styles.write_u32::<LE>(span.last_char)?;
            }
            styles.write_u32::<LE>(SPAN_END)?;
        }
        if style_count > 0 {
            // The style region ends with a full span's worth of END markers.
            styles.write_u32::<LE>(SPAN_END)?;
            styles.write_u32::<LE>(SPAN_END)?;
        }

        let start = begin_chunk(out, ChunkType::StringPool)?;
        out.write_u32::<LE>(string_count.try_into().context("String pool too large")?)?;
        out.write_u32::<LE>(style_count.try_into().context("String pool too large")?)?;
        out.write_u32::<LE>(if self.utf8 { UTF8_FLAG } else { 0 })?;
        out.write_u32::<LE>(pre_size.try_into().context("String pool too large")?)?;
        let styles_start = if style_count > 0 {
            pre_size + strings.len()
        } else {
            0
        };
        out.write_u32::<LE>(styles_start.try_into().context("String pool too large")?)?;

        for entry_idx in &self.entry_array {
            let offset = self.entries[*entry_idx].offset;
            out.write_u32::<LE>(offset.try_into().context("String pool too large")?)?;
        }
        for style in &self.entry_styles {
            out.write_u32::<LE>(style.offset.try_into().context("String pool too large")?)?;
        }

        out.extend_from_slice(&strings);
        out.extend_from_slice(&styles);
        end_chunk(out, start)
    }
}

// Lengths that do not fit in one unit (0x7F / 0x7FFF) are split over two, with the high bit of
// the first unit set.
fn encode_length(out: &mut Vec<u8>, len: usize, unit_size: usize) -> Result<()> {
    if unit_size == 1 {
        if len > 0x7F {
            if len > 0x7FFF {
                return Err(anyhow::anyhow!("String of length {len} is too long"));
            }
            out.write_u8(0x80 | ((len >> 8) & 0x7F) as u8)?;
        }
        out.write_u8(len as u8)?;
    } else {
        if len > 0x7FFF {
            if len > 0x7FFF_FFFF {
                return Err(anyhow::anyhow!("String of length {len} is too long"));
            }
            out.write_u16::<LE>(0x8000 | ((len >> 16) & 0x7FFF) as u16)?;
        }
        out.write_u16::<LE>(len as u16)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::load_string_pool;
    use std::io::Cursor;

    fn read_back(pool: &mut StringPool) -> crate::StringPoolContents {
        let block = pool.create_string_block().unwrap();
        let mut cursor = Cursor::new(block);
        cursor.set_position(8);
        load_string_pool(&mut cursor).unwrap()
    }

    #[test]
    fn merges_unstyled_duplicates() {
        let mut pool = StringPool::new(true);
        let a = pool.add("hello", true);
        let b = pool.add("world", true);
        let c = pool.add("hello", true);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.size(), 2);

        let d = pool.add("hello", false);
        assert_eq!(d, 2);
        assert_eq!(pool.offsets_for_string("hello"), Some(&[0usize, 2][..]));
        assert_eq!(pool.count_unique(), 2);
    }

    #[test]
    fn styled_strings_are_never_merged() {
        let mut pool = StringPool::new(false);
        let span = StyleSpan {
            name: "b".into(),
            first_char: 0,
            last_char: 2,
        };
        let styled = pool.add_styled("bold", &[span], None, None);
        let plain = pool.add("bold", true);
        assert_ne!(styled, plain);
    }

    #[test]
    fn round_trips_utf8_and_utf16() {
        for utf8 in [true, false] {
            let mut pool = StringPool::new(utf8);
            pool.add("first", true);
            pool.add("sécond", true);
            pool.add(&"x".repeat(300), true);
            let read = read_back(&mut pool);
            assert_eq!(read.utf8, utf8);
            assert_eq!(read.strings[0], "first");
            assert_eq!(read.strings[1], "sécond");
            assert_eq!(read.strings[2].len(), 300);
        }
    }

    #[test]
    fn writes_style_spans_after_user_strings() {
        let mut pool = StringPool::new(false);
        pool.add("plain", true);
        pool.add_styled(
            "Hello world",
            &[StyleSpan {
                name: "b".into(),
                first_char: 6,
                last_char: 10,
            }],
            None,
            None,
        );
        let read = read_back(&mut pool);
        assert_eq!(read.strings, vec!["plain", "Hello world", "b"]);
        assert_eq!(read.styles.len(), 2);
        assert!(read.styles[0].is_empty());
        assert_eq!(
            read.styles[1],
            vec![StyleSpan {
                name: "b".into(),
                first_char: 6,
                last_char: 10
            }]
        );
    }

    #[test]
    fn sorts_styled_first_then_by_config() {
        let fr = ConfigDescription::parse("fr").unwrap();
        let default = ConfigDescription::default();
        let mut pool = StringPool::new(true);
        let french = pool.add_with_config("Bonjour", true, Some("2value"), Some(&fr));
        let complex = pool.add_with_config("res/a.xml", true, Some("1complex"), Some(&default));
        let plain = pool.add_with_config("Hello", true, Some("2value"), Some(&default));
        let styled = pool.add_styled(
            "Bold",
            &[StyleSpan {
                name: "b".into(),
                first_char: 0,
                last_char: 3,
            }],
            Some("2value"),
            Some(&default),
        );

        pool.sort_by_config();
        assert_eq!(pool.map_original_pos_to_new_pos(styled), 0);
        assert_eq!(pool.map_original_pos_to_new_pos(complex), 1);
        assert_eq!(pool.map_original_pos_to_new_pos(plain), 2);
        assert_eq!(pool.map_original_pos_to_new_pos(french), 3);
        assert_eq!(pool.string_at(3), Some("Bonjour"));
        assert_eq!(pool.offset_for_string("Hello"), Some(2));

        let read = read_back(&mut pool);
        assert_eq!(read.strings[0], "Bold");
        assert_eq!(read.styles.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already sorted")]
    fn sorting_twice_panics() {
        let mut pool = StringPool::new(true);
        pool.add("a", true);
        pool.sort_by_config();
        pool.sort_by_config();
    }

    #[test]
    fn conflicting_buckets_collapse() {
        let mut pool = StringPool::new(true);
        pool.add_with_config("shared", true, Some("2value"), None);
        pool.add_with_config("shared", true, Some("1complex"), None);
        assert_eq!(pool.entries[0].config_type_name, " ");
    }

    #[test]
    fn long_utf8_lengths_use_two_bytes() {
        let mut out = Vec::new();
        encode_length(&mut out, 0x1234, 1).unwrap();
        assert_eq!(out, vec![0x80 | 0x12, 0x34]);
        let mut out = Vec::new();
        encode_length(&mut out, 5, 2).unwrap();
        assert_eq!(out, vec![5, 0]);
    }
}

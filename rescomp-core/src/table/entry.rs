use std::collections::BTreeMap;

use anyhow::Result;

use crate::{format, SourcePos, StyleSpan};

/// One value as written in the sources, before it is coerced to a `ResValue` at flatten time.
#[derive(Debug, Clone)]
pub struct Item {
    pub pos: SourcePos,
    /// Bag keys naming an `id` rather than an `attr` (enum and flag symbols).
    pub is_id: bool,
    pub value: String,
    pub style: Vec<StyleSpan>,
    /// `^type` bits the value must satisfy.
    pub format: u32,
    /// Resolved ID of the bag key, 0 until IDs are assigned.
    pub bag_key_id: u32,
}

impl Item {
    pub fn new(pos: SourcePos, is_id: bool, value: &str, style: &[StyleSpan], format: u32) -> Self {
        Self {
            pos,
            is_id,
            value: value.to_string(),
            style: style.to_vec(),
            format,
            bag_key_id: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EntryValue {
    Unknown,
    Item(Item),
    /// Keyed by the name of the attribute (or `^internal` key) each item sets.
    Bag(BTreeMap<String, Item>),
}

/// The value of one resource in one configuration.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub pos: SourcePos,
    pub parent: String,
    pub parent_id: u32,
    pub item_format: u32,
    pub value: EntryValue,
}

impl Entry {
    pub fn new(name: &str, pos: SourcePos) -> Self {
        Self {
            name: name.to_string(),
            pos,
            parent: String::new(),
            parent_id: 0,
            item_format: format::ANY,
            value: EntryValue::Unknown,
        }
    }

    pub fn is_bag(&self) -> bool {
        matches!(self.value, EntryValue::Bag(_))
    }

    pub fn item(&self) -> Option<&Item> {
        match &self.value {
            EntryValue::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn bag(&self) -> Option<&BTreeMap<String, Item>> {
        match &self.value {
            EntryValue::Bag(bag) => Some(bag),
            _ => None,
        }
    }

    pub(crate) fn bag_mut(&mut self) -> Option<&mut BTreeMap<String, Item>> {
        match &mut self.value {
            EntryValue::Bag(bag) => Some(bag),
            _ => None,
        }
    }

    pub fn make_it_a_bag(&mut self, pos: &SourcePos) -> Result<()> {
        match &self.value {
            EntryValue::Bag(_) => Ok(()),
            EntryValue::Unknown => {
                self.value = EntryValue::Bag(BTreeMap::new());
                Ok(())
            }
            EntryValue::Item(item) => Err(pos.error(format!(
                "Resource entry {} is already defined as a single item.\n{}: Originally defined here.",
                self.name, item.pos
            ))),
        }
    }

    pub fn set_item(
        &mut self,
        pos: &SourcePos,
        value: &str,
        style: &[StyleSpan],
        format: u32,
        overwrite: bool,
    ) -> Result<()> {
        match &self.value {
            EntryValue::Bag(bag) => {
                return Err(match bag.values().next() {
                    Some(first) => pos.error(format!(
                        "Resource entry {} is already defined as a bag.\n{}: Originally defined here.",
                        self.name, first.pos
                    )),
                    None => pos.error(format!(
                        "Resource entry {} is already defined as a bag.",
                        self.name
                    )),
                });
            }
            EntryValue::Item(item) if !overwrite => {
                return Err(pos.error(format!(
                    "Resource entry {} is already defined.\n{}: Originally defined here.",
                    self.name, item.pos
                )));
            }
            _ => {}
        }

        self.value = EntryValue::Item(Item::new(pos.clone(), false, value, style, format::ANY));
        self.item_format = format;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_to_bag(
        &mut self,
        pos: &SourcePos,
        key: &str,
        value: &str,
        style: &[StyleSpan],
        replace: bool,
        is_id: bool,
        format: u32,
    ) -> Result<()> {
        self.make_it_a_bag(pos)?;
        let name = self.name.clone();
        let Some(bag) = self.bag_mut() else {
            unreachable!("entry was just made a bag");
        };

        if let Some(existing) = bag.get(key) {
            if !replace {
                return Err(pos.error(format!(
                    "Resource entry {name} already has bag item {key}.\n{}: Originally defined here.",
                    existing.pos
                )));
            }
        }

        bag.insert(
            key.to_string(),
            Item::new(pos.clone(), is_id, value, style, format),
        );
        Ok(())
    }

    pub fn empty_bag(&mut self, pos: &SourcePos) -> Result<()> {
        self.make_it_a_bag(pos)?;
        if let Some(bag) = self.bag_mut() {
            bag.clear();
        }
        Ok(())
    }

    pub fn remove_from_bag(&mut self, key: &str) -> bool {
        match self.bag_mut() {
            Some(bag) => bag.remove(key).is_some(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32) -> SourcePos {
        SourcePos::new("values.xml", line)
    }

    #[test]
    fn item_cannot_become_a_bag() {
        let mut entry = Entry::new("title", pos(1));
        entry.set_item(&pos(1), "Hello", &[], format::ANY, false).unwrap();
        let err = entry.make_it_a_bag(&pos(5)).unwrap_err();
        assert!(err.to_string().contains("already defined as a single item"));
        assert!(entry.item().is_some());
    }

    #[test]
    fn bag_cannot_become_an_item() {
        let mut entry = Entry::new("Theme", pos(1));
        entry
            .add_to_bag(&pos(2), "android:textColor", "#fff", &[], false, false, format::ANY)
            .unwrap();
        assert!(entry.set_item(&pos(3), "x", &[], format::ANY, true).is_err());
        assert!(entry.is_bag());
    }

    #[test]
    fn redefinition_needs_overwrite() {
        let mut entry = Entry::new("title", pos(1));
        entry.set_item(&pos(1), "a", &[], format::ANY, false).unwrap();
        assert!(entry.set_item(&pos(2), "b", &[], format::ANY, false).is_err());
        assert_eq!(entry.item().unwrap().value, "a");
        entry.set_item(&pos(3), "c", &[], format::ANY, true).unwrap();
        assert_eq!(entry.item().unwrap().value, "c");
    }

    #[test]
    fn duplicate_bag_keys_need_replace() {
        let mut entry = Entry::new("Theme", pos(1));
        entry.add_to_bag(&pos(2), "color", "1", &[], false, false, format::ANY).unwrap();
        assert!(entry
            .add_to_bag(&pos(3), "color", "2", &[], false, false, format::ANY)
            .is_err());
        entry.add_to_bag(&pos(4), "color", "3", &[], true, false, format::ANY).unwrap();
        assert_eq!(entry.bag().unwrap()["color"].value, "3");

        entry.empty_bag(&pos(5)).unwrap();
        assert!(entry.bag().unwrap().is_empty());
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Result;

use super::entry::Entry;
use crate::{res_entry_id, res_type_id, ConfigDescription, SourcePos};

/// Name of the type that private attrs of a framework package move to.
pub const ATTR_PRIVATE_TYPE: &str = "^attr-private";

/// Every configuration of one named resource.
#[derive(Debug, Clone)]
pub struct ConfigList {
    pub name: String,
    pub pos: SourcePos,
    pub public: bool,
    pub public_pos: Option<SourcePos>,
    pub entries: BTreeMap<ConfigDescription, Entry>,
    /// Slot of this resource within its type, the low 16 bits of its ID.
    pub entry_index: Option<usize>,
    pub comment: String,
}

impl ConfigList {
    fn new(name: &str, pos: SourcePos) -> Self {
        Self {
            name: name.to_string(),
            pos,
            public: false,
            public_pos: None,
            entries: BTreeMap::new(),
            entry_index: None,
            comment: String::new(),
        }
    }

    pub fn append_comment(&mut self, comment: &str, only_if_empty: bool) {
        if comment.is_empty() || (only_if_empty && !self.comment.is_empty()) {
            return;
        }
        if !self.comment.is_empty() {
            self.comment.push('\n');
        }
        self.comment.push_str(comment);
    }
}

/// A `<public>` declaration.
#[derive(Debug, Clone)]
pub struct Public {
    pub pos: SourcePos,
    pub ident: u32,
}

/// All resources of one kind (`string`, `attr`, `style`...) in a package.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub pos: SourcePos,
    /// 1-based type ID, 0 until assigned.
    pub index: u32,
    /// Type ID pinned by `<public>` declarations, 0 if none.
    pub public_index: u32,
    pub first_public_pos: Option<SourcePos>,
    pub public: BTreeMap<String, Public>,
    pub can_add: BTreeSet<String>,
    configs: Vec<Option<ConfigList>>,
    by_name: HashMap<String, usize>,
}

impl Type {
    pub fn new(name: &str, pos: SourcePos) -> Self {
        Self {
            name: name.to_string(),
            pos,
            index: 0,
            public_index: 0,
            first_public_pos: None,
            public: BTreeMap::new(),
            can_add: BTreeSet::new(),
            configs: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn add_public(&mut self, pos: &SourcePos, name: &str, ident: u32) -> Result<()> {
        let type_index = res_type_id(ident);
        if type_index > 0 {
            if self.public_index > 0 && self.public_index != type_index {
                return Err(pos.error(format!(
                    "Public resource {}/{name} has conflicting type codes for its public identifiers (0x{:x} vs 0x{:x}).",
                    self.name, self.public_index, type_index
                )));
            }
            self.public_index = type_index;
        }

        if self.first_public_pos.is_none() {
            self.first_public_pos = Some(pos.clone());
        }

        match self.public.get(name) {
            Some(existing) if existing.ident != ident => Err(pos.error(format!(
                "Public resource {}/{name} has conflicting public identifiers (0x{:08x} vs 0x{ident:08x}).\n{}: Originally defined here.",
                self.name, existing.ident, existing.pos
            ))),
            Some(_) => Ok(()),
            None => {
                self.public.insert(
                    name.to_string(),
                    Public {
                        pos: pos.clone(),
                        ident,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn is_public(&self, name: &str) -> bool {
        self.public.contains_key(name)
    }

    pub fn can_add_entry(&mut self, name: &str) {
        self.can_add.insert(name.to_string());
    }

    pub fn config_list(&self, name: &str) -> Option<&ConfigList> {
        self.by_name
            .get(name)
            .and_then(|index| self.configs[*index].as_ref())
    }

    pub fn config_list_mut(&mut self, name: &str) -> Option<&mut ConfigList> {
        match self.by_name.get(name) {
            Some(index) => self.configs[*index].as_mut(),
            None => None,
        }
    }

    /// Config lists in slot order. `None` marks a slot nothing occupies.
    pub fn ordered(&self) -> &[Option<ConfigList>] {
        &self.configs
    }

    pub(crate) fn ordered_mut(&mut self) -> &mut [Option<ConfigList>] {
        &mut self.configs
    }

    /// Finds or creates the entry for `name` under `config`.
    ///
    /// In an overlay, a name the base package never defined may only be added if it was
    /// listed with `<add-resource>` or `auto_add` is set.
    pub fn get_entry(
        &mut self,
        name: &str,
        pos: &SourcePos,
        config: &ConfigDescription,
        do_set_index: bool,
        overlay: bool,
        auto_add: bool,
    ) -> Result<&mut Entry> {
        let index = match self.by_name.get(name) {
            Some(index) => *index,
            None => {
                if overlay && !auto_add && !self.can_add.contains(name) {
                    return Err(pos.error(format!(
                        "Resource at {name} appears in overlay but not in the base package; use <add-resource> to add."
                    )));
                }
                let index = self.configs.len();
                let mut list = ConfigList::new(name, pos.clone());
                if do_set_index {
                    list.entry_index = Some(index);
                }
                self.configs.push(Some(list));
                self.by_name.insert(name.to_string(), index);
                index
            }
        };

        let Some(list) = self.configs[index].as_mut() else {
            unreachable!("indexed config list is always present");
        };
        Ok(list
            .entries
            .entry(*config)
            .or_insert_with(|| Entry::new(name, pos.clone())))
    }

    pub fn remove_entry(&mut self, name: &str) -> Option<ConfigList> {
        let index = self.by_name.remove(name)?;
        let removed = self.configs.remove(index);
        self.reindex();
        self.public.remove(name);
        removed
    }

    /// Every configuration any resource of this type is defined for, in table order.
    pub fn unique_configs(&self) -> BTreeSet<ConfigDescription> {
        self.configs
            .iter()
            .flatten()
            .flat_map(|list| list.entries.keys().copied())
            .collect()
    }

    fn reindex(&mut self) {
        self.by_name = self
            .configs
            .iter()
            .enumerate()
            .filter_map(|(index, list)| list.as_ref().map(|list| (list.name.clone(), index)))
            .collect();
    }

    /// Places every public resource at the slot its ID names, then fills the remaining slots
    /// with the other resources in the order they were defined.
    pub fn apply_public_entry_order(&mut self) -> Result<()> {
        let mut remaining: Vec<ConfigList> = self.configs.drain(..).flatten().collect();
        let mut ordered: Vec<Option<ConfigList>> = Vec::with_capacity(remaining.len());
        let mut failed = false;

        for (name, public) in &self.public {
            let slot = res_entry_id(public.ident) as usize;
            let Some(found) = remaining.iter().position(|list| &list.name == name) else {
                public.pos.error(format!(
                    "Public symbol {}/{name} declared here is not defined.",
                    self.name
                ));
                failed = true;
                continue;
            };

            if slot >= ordered.len() {
                ordered.resize_with(slot + 1, || None);
            }
            if let Some(other) = &ordered[slot] {
                let original = other.public_pos.clone().unwrap_or_default();
                public.pos.error(format!(
                    "Multiple entry names declared for public entry identifier 0x{:x} in type {} ({} vs {name}).\n{original}: Originally defined here.",
                    slot + 1,
                    self.name,
                    other.name
                ));
                failed = true;
                continue;
            }

            let mut list = remaining.remove(found);
            list.public = true;
            list.public_pos = Some(public.pos.clone());
            ordered[slot] = Some(list);
        }

        let mut slot = 0;
        for list in remaining {
            while slot < ordered.len() && ordered[slot].is_some() {
                slot += 1;
            }
            if slot == ordered.len() {
                ordered.push(Some(list));
            } else {
                ordered[slot] = Some(list);
            }
            slot += 1;
        }

        self.configs = ordered;
        self.reindex();
        if failed {
            return Err(anyhow::anyhow!(
                "Public entries of type {} could not be placed",
                self.name
            ));
        }
        Ok(())
    }
}

/// All types of one package, in type ID order once IDs are assigned.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub id: u8,
    types: Vec<Option<Type>>,
    by_name: HashMap<String, usize>,
}

impl Package {
    pub fn new(name: &str, id: u8) -> Self {
        Self {
            name: name.to_string(),
            id,
            types: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn get_type(&mut self, name: &str, pos: &SourcePos, do_set_index: bool) -> &mut Type {
        let index = match self.by_name.get(name) {
            Some(index) => *index,
            None => {
                let mut new_type = Type::new(name, pos.clone());
                self.types.push(None);
                if do_set_index {
                    new_type.index = self.types.len() as u32;
                }
                let index = self.types.len() - 1;
                self.types[index] = Some(new_type);
                self.by_name.insert(name.to_string(), index);
                index
            }
        };

        match self.types[index].as_mut() {
            Some(found) => found,
            None => unreachable!("indexed type is always present"),
        }
    }

    pub fn find_type(&self, name: &str) -> Option<&Type> {
        self.by_name
            .get(name)
            .and_then(|index| self.types[*index].as_ref())
    }

    pub fn find_type_mut(&mut self, name: &str) -> Option<&mut Type> {
        match self.by_name.get(name) {
            Some(index) => self.types[*index].as_mut(),
            None => None,
        }
    }

    /// Types in ID order. `None` marks a type ID nothing occupies.
    pub fn ordered_types(&self) -> &[Option<Type>] {
        &self.types
    }

    pub(crate) fn ordered_types_mut(&mut self) -> &mut [Option<Type>] {
        &mut self.types
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn reindex(&mut self) {
        self.by_name = self
            .types
            .iter()
            .enumerate()
            .filter_map(|(index, t)| t.as_ref().map(|t| (t.name.clone(), index)))
            .collect();
    }

    /// Moves every type with a public type ID to that position.
    pub fn apply_public_type_order(&mut self) -> Result<()> {
        let mut remaining: Vec<Type> = Vec::new();
        let mut ordered: Vec<Option<Type>> = Vec::with_capacity(self.types.len());
        let mut result = Ok(());

        for t in self.types.drain(..).flatten() {
            if t.public_index == 0 {
                remaining.push(t);
                continue;
            }

            let slot = t.public_index as usize - 1;
            if slot >= ordered.len() {
                ordered.resize_with(slot + 1, || None);
            }
            if let Some(other) = &ordered[slot] {
                let pos = t.first_public_pos.clone().unwrap_or_default();
                let original = other.first_public_pos.clone().unwrap_or_default();
                result = Err(pos.error(format!(
                    "Multiple type names declared for public type identifier 0x{slot:x} ({} vs {}).\n{original}: Originally defined here.",
                    other.name, t.name
                )));
                remaining.push(t);
                continue;
            }
            ordered[slot] = Some(t);
        }

        let mut slot = 0;
        for t in remaining {
            while slot < ordered.len() && ordered[slot].is_some() {
                slot += 1;
            }
            if slot == ordered.len() {
                ordered.push(Some(t));
            } else {
                ordered[slot] = Some(t);
            }
        }

        self.types = ordered;
        self.reindex();
        result
    }

    /// When a framework package has public attrs, its other attrs move to their own type so
    /// they do not take up public attr IDs.
    pub fn move_private_attrs(&mut self) {
        let Some(attr) = self.find_type("attr") else {
            return;
        };

        let mut has_public = false;
        let mut private: Vec<String> = Vec::new();
        for list in attr.ordered().iter().flatten() {
            if attr.is_public(&list.name) {
                has_public = true;
            } else {
                private.push(list.name.clone());
            }
        }
        if !has_public {
            return;
        }

        let mut moved: Vec<ConfigList> = Vec::new();
        if let Some(attr) = self.find_type_mut("attr") {
            for name in &private {
                if let Some(list) = attr.remove_entry(name) {
                    moved.push(list);
                }
            }
        }

        let private_type = self.get_type(ATTR_PRIVATE_TYPE, &SourcePos::default(), false);
        for list in moved {
            for (config, entry) in list.entries {
                // The entry starts out empty so this cannot fail
                if let Ok(slot) =
                    private_type.get_entry(&list.name, &entry.pos, &config, false, false, false)
                {
                    *slot = entry;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32) -> SourcePos {
        SourcePos::new("public.xml", line)
    }

    fn define(t: &mut Type, name: &str) {
        t.get_entry(name, &pos(1), &ConfigDescription::default(), false, false, false)
            .unwrap()
            .set_item(&pos(1), "x", &[], crate::format::ANY, false)
            .unwrap();
    }

    fn names(t: &Type) -> Vec<Option<String>> {
        t.ordered()
            .iter()
            .map(|list| list.as_ref().map(|list| list.name.clone()))
            .collect()
    }

    #[test]
    fn public_entries_take_their_slots() {
        let mut t = Type::new("string", pos(0));
        define(&mut t, "a");
        define(&mut t, "b");
        define(&mut t, "c");
        t.add_public(&pos(2), "c", 0x7f040000).unwrap();
        t.add_public(&pos(3), "a", 0x7f040002).unwrap();

        t.apply_public_entry_order().unwrap();
        assert_eq!(
            names(&t),
            vec![Some("c".into()), Some("b".into()), Some("a".into())]
        );
        assert!(t.config_list("c").unwrap().public);
        assert!(!t.config_list("b").unwrap().public);
        assert_eq!(t.public_index, 4);
    }

    #[test]
    fn public_slot_past_the_end_leaves_holes() {
        let mut t = Type::new("string", pos(0));
        define(&mut t, "a");
        t.add_public(&pos(2), "a", 0x7f040003).unwrap();
        t.apply_public_entry_order().unwrap();
        assert_eq!(names(&t), vec![None, None, None, Some("a".into())]);
    }

    #[test]
    fn undefined_public_symbol_fails() {
        let mut t = Type::new("string", pos(0));
        define(&mut t, "a");
        t.add_public(&pos(2), "missing", 0x7f040000).unwrap();
        assert!(t.apply_public_entry_order().is_err());
        assert!(t.config_list("a").is_some());
    }

    #[test]
    fn conflicting_public_ids_fail() {
        let mut t = Type::new("string", pos(0));
        t.add_public(&pos(2), "a", 0x7f040000).unwrap();
        assert!(t.add_public(&pos(3), "a", 0x7f040000).is_ok());
        let err = t.add_public(&pos(4), "a", 0x7f040001).unwrap_err();
        assert!(err.to_string().contains("conflicting public identifiers"));
        let err = t.add_public(&pos(5), "b", 0x7f050001).unwrap_err();
        assert!(err.to_string().contains("conflicting type codes"));
    }

    #[test]
    fn overlay_needs_add_resource() {
        let mut t = Type::new("string", pos(0));
        let config = ConfigDescription::default();
        assert!(t.get_entry("new", &pos(1), &config, false, true, false).is_err());
        t.can_add_entry("new");
        assert!(t.get_entry("new", &pos(1), &config, false, true, false).is_ok());
        assert!(t.get_entry("other", &pos(1), &config, false, true, true).is_ok());
    }

    #[test]
    fn public_type_order_and_private_attrs() {
        let mut package = Package::new("android", 0x01);
        package.get_type("attr", &pos(0), false);
        let drawable = package.get_type("drawable", &pos(0), false);
        drawable.add_public(&pos(1), "icon", 0x01010000).unwrap();
        package.apply_public_type_order().unwrap();
        let order: Vec<_> = package
            .ordered_types()
            .iter()
            .map(|t| t.as_ref().map(|t| t.name.clone()))
            .collect();
        assert_eq!(order, vec![Some("drawable".into()), Some("attr".into())]);

        let mut package = Package::new("android", 0x01);
        let attr = package.get_type("attr", &pos(0), false);
        define(attr, "shown");
        define(attr, "hidden");
        attr.add_public(&pos(1), "shown", 0x01010000).unwrap();
        package.move_private_attrs();
        assert!(package.find_type("attr").unwrap().config_list("hidden").is_none());
        assert!(package
            .find_type(ATTR_PRIVATE_TYPE)
            .unwrap()
            .config_list("hidden")
            .is_some());
    }
}

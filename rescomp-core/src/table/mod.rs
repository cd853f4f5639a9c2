//! The resource table: every resource of the package being built, from ingestion through ID
//! assignment to the flattened `resources.arsc`.

mod coerce;
mod entry;
mod flatten;
mod package;
mod public;
mod reference;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use log::{debug, warn};

use crate::values::internal_id;
use crate::{
    format, make_res_id, res_entry_id, res_package_id, res_type_id, ConfigDescription, ErrorLog,
    IncludedResources, PackageType, SourcePos, StyleSpan,
};

pub use coerce::{CoerceParams, Coerced};
pub use entry::{Entry, EntryValue, Item};
pub use package::{ConfigList, Package, Public, Type, ATTR_PRIVATE_TYPE};
pub use reference::{expand_resource_ref, is_valid_resource_name, ResourceRef};

/// Pseudo-locales that are generated rather than translated.
const PSEUDO_LOCALES: &[&str] = &["en_XA", "ar_XB"];

pub struct ResourceTable {
    assets_package: String,
    package_type: PackageType,
    package: Package,
    included: Box<dyn IncludedResources>,
    auto_add_overlay: bool,
    num_local: usize,
    /// String name to the locales (in filter form, `fr_CA`) it was translated into.
    localizations: BTreeMap<String, BTreeMap<String, SourcePos>>,
    has_default_localization: BTreeSet<String>,
    /// (bag resource ID, key ID) pairs whose value is being resolved.
    resolving: RefCell<Vec<(u32, u32)>>,
}

impl ResourceTable {
    pub fn new(
        assets_package: impl Into<String>,
        package_type: PackageType,
        included: Box<dyn IncludedResources>,
    ) -> Self {
        let assets_package = assets_package.into();
        let mut package = Package::new(&assets_package, package_type.package_id());

        // `attr` is always the first type of the package
        package.get_type("attr", &SourcePos::new("????", 0), true);

        Self {
            assets_package,
            package_type,
            package,
            included,
            auto_add_overlay: false,
            num_local: 0,
            localizations: BTreeMap::new(),
            has_default_localization: BTreeSet::new(),
            resolving: RefCell::new(Vec::new()),
        }
    }

    pub fn set_auto_add_overlay(&mut self, auto_add: bool) {
        self.auto_add_overlay = auto_add;
    }

    pub fn assets_package(&self) -> &str {
        &self.assets_package
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn included(&self) -> &dyn IncludedResources {
        self.included.as_ref()
    }

    pub fn num_local_resources(&self) -> usize {
        self.num_local
    }

    pub fn has_resources(&self) -> bool {
        self.num_local > 0
    }

    fn check_package(&self, pos: &SourcePos, package: &str) -> Result<()> {
        if package != self.assets_package {
            return Err(pos.error(format!(
                "Resources can only be added to package {}, not {package}",
                self.assets_package
            )));
        }
        Ok(())
    }

    fn check_not_included(
        &self,
        pos: &SourcePos,
        package: &str,
        type_name: &str,
        name: &str,
    ) -> Result<()> {
        if self
            .included
            .identifier_for_name(package, type_name, name, false)
            .is_some()
        {
            return Err(pos.error(format!(
                "Resource entry {type_name}/{name} is already defined in package {package}."
            )));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn get_entry(
        &mut self,
        pos: &SourcePos,
        package: &str,
        type_name: &str,
        name: &str,
        config: &ConfigDescription,
        overlay: bool,
        do_set_index: bool,
    ) -> Result<&mut Entry> {
        self.check_package(pos, package)?;
        let auto_add = self.auto_add_overlay;
        self.package
            .get_type(type_name, pos, do_set_index)
            .get_entry(name, pos, config, do_set_index, overlay, auto_add)
    }

    /// Pins `type/name` to the resource ID `ident`.
    pub fn add_public(
        &mut self,
        pos: &SourcePos,
        package: &str,
        type_name: &str,
        name: &str,
        ident: u32,
    ) -> Result<()> {
        if self
            .included
            .identifier_for_name(package, type_name, name, false)
            .is_some()
        {
            return Err(pos.error(format!(
                "Error declaring public resource {type_name}/{name} for included package {package}"
            )));
        }

        self.check_package(pos, package)?;
        self.package
            .get_type(type_name, pos, false)
            .add_public(pos, name, ident)
    }

    /// Defines a single-item resource.
    #[allow(clippy::too_many_arguments)]
    pub fn add_entry(
        &mut self,
        pos: &SourcePos,
        package: &str,
        type_name: &str,
        name: &str,
        value: &str,
        style: &[StyleSpan],
        config: &ConfigDescription,
        do_set_index: bool,
        format: u32,
        overwrite: bool,
    ) -> Result<()> {
        self.check_not_included(pos, package, type_name, name)?;
        self.get_entry(pos, package, type_name, name, config, overwrite, do_set_index)?
            .set_item(pos, value, style, format, overwrite)?;
        self.num_local += 1;
        Ok(())
    }

    /// Starts a bag resource, before its items are added with `add_bag`.
    ///
    /// In an overlay, `replace` clears whatever the base package put in the bag.
    #[allow(clippy::too_many_arguments)]
    pub fn start_bag(
        &mut self,
        pos: &SourcePos,
        package: &str,
        type_name: &str,
        name: &str,
        parent: &str,
        config: &ConfigDescription,
        overlay: bool,
        replace: bool,
    ) -> Result<()> {
        self.check_not_included(pos, package, type_name, name)?;

        if overlay && !self.auto_add_overlay && !self.has_bag_or_entry(package, type_name, name)
        {
            let can_add = self
                .package
                .find_type(type_name)
                .is_some_and(|t| t.can_add.contains(name));
            if !can_add {
                return Err(pos.error(format!(
                    "Resource does not already exist in overlay at '{name}'; use <add-resource> to add."
                )));
            }
        }

        let entry = self.get_entry(pos, package, type_name, name, config, overlay, false)?;
        if !parent.is_empty() {
            entry.parent = parent.to_string();
        }
        entry.make_it_a_bag(pos)?;
        if overlay && replace {
            entry.empty_bag(pos)?;
        }
        Ok(())
    }

    /// Adds one item to a bag resource.
    #[allow(clippy::too_many_arguments)]
    pub fn add_bag(
        &mut self,
        pos: &SourcePos,
        package: &str,
        type_name: &str,
        name: &str,
        parent: &str,
        key: &str,
        value: &str,
        style: &[StyleSpan],
        config: &ConfigDescription,
        replace: bool,
        is_id: bool,
        format: u32,
    ) -> Result<()> {
        if self
            .included
            .identifier_for_name(package, type_name, name, false)
            .is_some()
        {
            return Ok(());
        }

        let entry = self.get_entry(pos, package, type_name, name, config, replace, false)?;
        if !parent.is_empty() {
            entry.parent = parent.to_string();
        }
        let first = entry.bag().map_or(true, |bag| !bag.contains_key(key));
        entry.add_to_bag(pos, key, value, style, replace, is_id, format)?;
        if first {
            self.num_local += 1;
        }
        Ok(())
    }

    /// Defines the attr `name` with the `^type` bits `format`. Defining it again is allowed as
    /// long as the format is the same and has no enum or flag symbols.
    pub fn make_attribute(
        &mut self,
        pos: &SourcePos,
        package: &str,
        name: &str,
        format: u32,
        comment: &str,
        append_comment: bool,
    ) -> Result<()> {
        if self
            .included
            .identifier_for_name(package, "attr", name, false)
            .is_some()
        {
            return Err(pos.error(format!("Attribute \"{name}\" has already been defined")));
        }

        let entry = self.get_entry(
            pos,
            package,
            "attr",
            name,
            &ConfigDescription::default(),
            false,
            false,
        )?;
        entry.make_it_a_bag(pos)?;

        let format_value = (format as i32).to_string();
        match entry.bag().and_then(|bag| bag.get("^type")) {
            Some(existing) => {
                if format & (format::ENUM | format::FLAGS) != 0 || existing.value != format_value
                {
                    return Err(pos.error(format!(
                        "Attribute \"{name}\" already defined with incompatible format.\n{}: Original attribute defined here.",
                        existing.pos
                    )));
                }
            }
            None => {
                entry.add_to_bag(pos, "^type", &format_value, &[], false, false, format::ANY)?;
                self.num_local += 1;
            }
        }

        self.append_comment(package, "attr", name, comment, append_comment);
        Ok(())
    }

    pub fn append_comment(
        &mut self,
        package: &str,
        type_name: &str,
        name: &str,
        comment: &str,
        only_if_empty: bool,
    ) {
        if package != self.assets_package {
            return;
        }
        if let Some(list) = self
            .package
            .find_type_mut(type_name)
            .and_then(|t| t.config_list_mut(name))
        {
            list.append_comment(comment, only_if_empty);
        }
    }

    /// Lets an overlay add `type/name` even though the base package does not define it.
    pub fn can_add_entry(&mut self, pos: &SourcePos, package: &str, type_name: &str, name: &str) {
        if package == self.assets_package {
            self.package.get_type(type_name, pos, false).can_add_entry(name);
        }
    }

    pub fn has_bag_or_entry(&self, package: &str, type_name: &str, name: &str) -> bool {
        if self
            .included
            .identifier_for_name(package, type_name, name, false)
            .is_some()
        {
            return true;
        }
        package == self.assets_package
            && self
                .package
                .find_type(type_name)
                .is_some_and(|t| t.config_list(name).is_some())
    }

    /// Whether `type/name` has a value for exactly `config`.
    pub fn has_bag_or_entry_for_config(
        &self,
        package: &str,
        type_name: &str,
        name: &str,
        config: &ConfigDescription,
    ) -> bool {
        if self
            .included
            .identifier_for_name(package, type_name, name, false)
            .is_some()
        {
            return true;
        }
        package == self.assets_package
            && self
                .package
                .find_type(type_name)
                .and_then(|t| t.config_list(name))
                .is_some_and(|list| list.entries.contains_key(config))
    }

    fn has_bag_or_entry_ref(&self, reference: &str, def_type: &str, def_package: &str) -> bool {
        match expand_resource_ref(reference, Some(def_type), Some(def_package)) {
            Ok(r) => self.has_bag_or_entry(&r.package, &r.type_name, &r.name),
            Err(_) => false,
        }
    }

    /// Resolves `package:type/name` to its resource ID, looking in the included resources
    /// first.
    pub fn get_res_id(
        &self,
        package: &str,
        type_name: &str,
        name: &str,
        only_public: bool,
    ) -> Option<u32> {
        if type_name == "attr" && name.starts_with('^') {
            return internal_id(name);
        }

        if let Some(id) = self
            .included
            .identifier_for_name(package, type_name, name, only_public)
        {
            return Some(id);
        }
        self.get_custom_resource(package, type_name, name)
    }

    /// Resolves a reference such as `@string/title` or `android:textColor`.
    pub fn get_res_id_for_ref(
        &self,
        reference: &str,
        def_type: Option<&str>,
        def_package: Option<&str>,
    ) -> Result<u32, &'static str> {
        let def_package = def_package.unwrap_or(&self.assets_package);
        let r = expand_resource_ref(reference, def_type, Some(def_package))?;
        self.get_res_id(&r.package, &r.type_name, &r.name, r.only_public)
            .ok_or("No resource found that matches the given name")
    }

    /// ID of a resource of the package being built, if it has been assigned one.
    pub(crate) fn get_custom_resource(
        &self,
        package: &str,
        type_name: &str,
        name: &str,
    ) -> Option<u32> {
        if package != self.assets_package {
            return None;
        }

        let found = self
            .package
            .find_type(type_name)
            .and_then(|t| t.config_list(name).map(|list| (t, list)));
        let (t, list) = match found {
            Some(found) => found,
            None if type_name == "attr" => {
                let t = self.package.find_type(ATTR_PRIVATE_TYPE)?;
                (t, t.config_list(name)?)
            }
            None => return None,
        };

        let entry_index = list.entry_index?;
        Some(make_res_id(
            self.package.id as u32,
            t.index,
            entry_index as u32,
        ))
    }

    /// Finds `type/name`, creating it as an `id`-like resource with the value `false` if it
    /// does not exist yet. This is how `@+id/name` works.
    pub fn get_custom_resource_with_creation(
        &mut self,
        pos: &SourcePos,
        package: &str,
        type_name: &str,
        name: &str,
    ) -> Result<u32> {
        if let Some(id) = self.get_custom_resource(package, type_name, name) {
            return Ok(id);
        }

        if package != self.assets_package {
            let mut message =
                format!("creating resource for external package {package}: {type_name}/{name}.");
            if package == "android" {
                message.push_str("\ndid you mean to use @+id instead of @+android:id?");
            }
            return Err(pos.error(message));
        }

        self.add_entry(
            pos,
            package,
            type_name,
            name,
            "false",
            &[],
            &ConfigDescription::default(),
            true,
            format::ANY,
            false,
        )?;
        self.get_res_id(package, type_name, name, true)
            .ok_or_else(|| pos.error(format!("Could not create {type_name}/{name}")))
    }

    /// The entry with resource ID `res_id` in the default configuration.
    pub(crate) fn find_entry(&self, res_id: u32) -> Option<&Entry> {
        if res_package_id(res_id) != self.package.id as u32 {
            return None;
        }
        let type_index = (res_type_id(res_id) as usize).checked_sub(1)?;
        let t = self.package.ordered_types().get(type_index)?.as_ref()?;
        let list = t.ordered().get(res_entry_id(res_id) as usize)?.as_ref()?;
        list.entries.get(&ConfigDescription::default())
    }

    /// Assigns every resource its ID and resolves the parents and keys of every bag.
    ///
    /// Keeps going after an error so that all of them are logged.
    pub fn assign_resource_ids(&mut self) -> Result<()> {
        let mut errors = ErrorLog::new();

        if self.package_type == PackageType::System {
            self.package.move_private_attrs();
        }
        errors.record(self.package.apply_public_type_order());

        self.generate_attributes(&mut errors);

        self.package.get_type("attr", &SourcePos::new("????", 0), false);
        for (ti, slot) in self.package.ordered_types_mut().iter_mut().enumerate() {
            let Some(t) = slot else {
                continue;
            };
            errors.record(t.apply_public_entry_order());
            t.index = ti as u32 + 1;
            if ti == 0 && t.name != "attr" {
                panic!("First type is not attr!");
            }
            for (ei, list) in t.ordered_mut().iter_mut().enumerate() {
                if let Some(list) = list {
                    list.entry_index = Some(ei);
                }
            }
        }

        self.resolve_bags(&mut errors);
        errors.finish("Assigning resource IDs")
    }

    // Declares the `id` and `attr` resources bags refer to without defining them.
    fn generate_attributes(&mut self, errors: &mut ErrorLog) {
        let own = self.assets_package.clone();
        let mut keys: Vec<(bool, String)> = Vec::new();
        for t in self.package.ordered_types().iter().flatten() {
            for list in t.ordered().iter().flatten() {
                for entry in list.entries.values() {
                    if let Some(bag) = entry.bag() {
                        keys.extend(bag.iter().map(|(key, item)| (item.is_id, key.clone())));
                    }
                }
            }
        }

        let generated = SourcePos::generated();
        for (is_id, key) in keys {
            if key.starts_with('^') {
                continue;
            }

            if is_id {
                if !self.has_bag_or_entry_ref(&key, "id", &own) {
                    debug!("Generating {own}:id/{key}");
                    errors.record(self.add_entry(
                        &generated,
                        &own,
                        "id",
                        &key,
                        "false",
                        &[],
                        &ConfigDescription::default(),
                        false,
                        format::ANY,
                        false,
                    ));
                }
                continue;
            }

            let Ok(r) = expand_resource_ref(&key, Some("attr"), Some(&own)) else {
                continue;
            };
            if r.package == own && !self.has_bag_or_entry(&own, "attr", &r.name) {
                debug!("Generating {own}:attr/{}", r.name);
                errors.record(self.add_bag(
                    &generated,
                    &own,
                    "attr",
                    &r.name,
                    "",
                    "^type",
                    &format::ANY.to_string(),
                    &[],
                    &ConfigDescription::default(),
                    false,
                    false,
                    format::ANY,
                ));
            }
        }
    }

    // Works out the parent and key IDs of every bag, then stores them.
    fn resolve_bags(&mut self, errors: &mut ErrorLog) {
        let mut resolved: Vec<(usize, usize, ConfigDescription, u32, Vec<(String, u32)>)> =
            Vec::new();

        for (ti, t) in self.package.ordered_types().iter().enumerate() {
            let Some(t) = t else {
                continue;
            };
            for (ei, list) in t.ordered().iter().enumerate() {
                let Some(list) = list else {
                    continue;
                };
                for (config, entry) in &list.entries {
                    let Some(bag) = entry.bag() else {
                        continue;
                    };

                    let mut parent_id = 0;
                    if !entry.parent.is_empty() {
                        match self.get_res_id_for_ref(&entry.parent, Some("style"), None) {
                            Ok(id) => parent_id = id,
                            Err(msg) => errors.push(entry.pos.error(format!(
                                "Error retrieving parent for item: {msg} '{}'.",
                                entry.parent
                            ))),
                        }
                    }

                    let mut key_ids = Vec::with_capacity(bag.len());
                    for (key, item) in bag {
                        let def_type = if item.is_id { "id" } else { "attr" };
                        match self.get_res_id_for_ref(key, Some(def_type), None) {
                            Ok(id) => key_ids.push((key.clone(), id)),
                            Err(msg) => {
                                errors.push(
                                    item.pos
                                        .error(format!("Error: {msg}: {def_type} '{key}'.")),
                                );
                                key_ids.push((key.clone(), 0));
                            }
                        }
                    }
                    resolved.push((ti, ei, *config, parent_id, key_ids));
                }
            }
        }

        for (ti, ei, config, parent_id, key_ids) in resolved {
            let entry = self.package.ordered_types_mut()[ti]
                .as_mut()
                .and_then(|t| t.ordered_mut()[ei].as_mut())
                .and_then(|list| list.entries.get_mut(&config));
            let Some(entry) = entry else {
                continue;
            };
            entry.parent_id = parent_id;
            if let Some(bag) = entry.bag_mut() {
                for (key, id) in key_ids {
                    if let Some(item) = bag.get_mut(&key) {
                        item.bag_key_id = id;
                    }
                }
            }
        }
    }

    /// Remembers that string `name` has a translation for `locale` (`fr`, `fr_CA`, or empty
    /// for the default).
    pub fn add_localization(&mut self, name: &str, locale: &str, pos: &SourcePos) {
        self.localizations
            .entry(name.to_string())
            .or_default()
            .insert(locale.to_string(), pos.clone());
    }

    pub fn add_default_localization(&mut self, name: &str) {
        self.has_default_localization.insert(name.to_string());
    }

    pub fn has_default_localization(&self, name: &str) -> bool {
        self.has_default_localization.contains(name)
    }

    /// Warns about strings with no default translation, and strings missing from any of the
    /// `required` locales. Never fails.
    pub fn validate_localizations(&self, required: &[String]) -> Result<()> {
        for (name, locales) in &self.localizations {
            if !locales.contains_key("") {
                warn!("string '{name}' has no default translation.");
                for (locale, pos) in locales {
                    debug!("{pos}: locale {locale} found");
                }
            }

            let missing: BTreeSet<&str> = required
                .iter()
                .map(String::as_str)
                .filter(|locale| !PSEUDO_LOCALES.contains(locale))
                .filter(|locale| {
                    // A translation into the bare language counts for any of its regions
                    let language = locale.get(..2).unwrap_or(locale);
                    !locales.contains_key(*locale) && !locales.contains_key(language)
                })
                .collect();
            if !missing.is_empty() {
                let list: Vec<&str> = missing.into_iter().collect();
                warn!(
                    "string '{name}' is missing {} required localizations: {}",
                    list.len(),
                    list.join(" ")
                );
            }
        }
        Ok(())
    }

    /// Locale key used for localization tracking: `fr`, `fr_CA`, or empty for the default.
    pub fn localization_key(config: &ConfigDescription) -> String {
        let language = config.language();
        if language.is_empty() {
            return language;
        }
        let region = config.region();
        if region.is_empty() {
            language
        } else {
            format!("{language}_{region}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoIncluded, ResourceIds};

    fn pos(line: u32) -> SourcePos {
        SourcePos::new("res/values/values.xml", line)
    }

    fn table() -> ResourceTable {
        ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded))
    }

    fn add_string(table: &mut ResourceTable, name: &str, value: &str, config: &str) {
        table
            .add_entry(
                &pos(1),
                "com.example",
                "string",
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

    #[test]
    fn ids_follow_type_and_definition_order() {
        let mut table = table();
        add_string(&mut table, "first", "1", "");
        add_string(&mut table, "second", "2", "");
        table.assign_resource_ids().unwrap();

        // attr is type 1, string type 2
        assert_eq!(
            table.get_res_id("com.example", "string", "first", true),
            Some(0x7f020000)
        );
        assert_eq!(
            table.get_res_id("com.example", "string", "second", true),
            Some(0x7f020001)
        );
        assert_eq!(
            table.get_res_id_for_ref("@string/second", None, None),
            Ok(0x7f020001)
        );
        assert_eq!(
            table.get_res_id_for_ref("@string/missing", None, None),
            Err("No resource found that matches the given name")
        );
    }

    #[test]
    fn public_declaration_pins_the_slot() {
        let mut table = table();
        add_string(&mut table, "other", "x", "");
        add_string(&mut table, "app_name", "My App", "");
        table
            .add_public(&pos(3), "com.example", "string", "app_name", 0x7f040000)
            .unwrap();
        assert!(table
            .add_public(&pos(4), "com.example", "string", "app_name", 0x7f040001)
            .is_err());
        table.assign_resource_ids().unwrap();

        assert_eq!(
            table.get_res_id("com.example", "string", "app_name", true),
            Some(0x7f040000)
        );
        assert_eq!(
            table.get_res_id("com.example", "string", "other", true),
            Some(0x7f040001)
        );
    }

    #[test]
    fn undefined_public_symbol_is_reported() {
        let mut table = table();
        add_string(&mut table, "defined", "x", "");
        table
            .add_public(&pos(3), "com.example", "string", "missing", 0x7f020000)
            .unwrap();
        assert!(table.assign_resource_ids().is_err());
    }

    #[test]
    fn bag_keys_resolve_or_fail() {
        let mut table = table();
        let default = ConfigDescription::default();
        table
            .make_attribute(&pos(1), "com.example", "color", format::COLOR, "", false)
            .unwrap();
        table
            .start_bag(&pos(2), "com.example", "style", "Base", "", &default, false, false)
            .unwrap();
        table
            .add_bag(
                &pos(3),
                "com.example",
                "style",
                "Base",
                "",
                "color",
                "#fff",
                &[],
                &default,
                false,
                false,
                format::ANY,
            )
            .unwrap();
        table
            .add_bag(
                &pos(4),
                "com.example",
                "style",
                "Broken",
                "Missing",
                "android:textSize",
                "12sp",
                &[],
                &default,
                false,
                false,
                format::ANY,
            )
            .unwrap();

        let err = table.assign_resource_ids().unwrap_err();
        assert!(err.to_string().contains("2 error(s)"));

        let base = table
            .package()
            .find_type("style")
            .and_then(|t| t.config_list("Base"))
            .and_then(|list| list.entries.get(&default))
            .unwrap();
        let color = &base.bag().unwrap()["color"];
        assert_eq!(
            color.bag_key_id,
            table.get_res_id("com.example", "attr", "color", true).unwrap()
        );
    }

    #[test]
    fn own_package_attrs_and_ids_are_generated() {
        let mut table = table();
        let default = ConfigDescription::default();
        table
            .add_bag(
                &pos(1),
                "com.example",
                "style",
                "Theme",
                "",
                "accent",
                "#f00",
                &[],
                &default,
                false,
                false,
                format::ANY,
            )
            .unwrap();
        table
            .add_bag(
                &pos(2),
                "com.example",
                "attr",
                "mode",
                "",
                "fast",
                "1",
                &[],
                &default,
                false,
                true,
                format::ANY,
            )
            .unwrap();
        table.assign_resource_ids().unwrap();
        assert!(table.get_res_id("com.example", "attr", "accent", true).is_some());
        assert!(table.get_res_id("com.example", "id", "fast", true).is_some());
    }

    #[test]
    fn included_resources_cannot_be_redefined() {
        let mut ids = ResourceIds::new("android");
        ids.insert("string", "ok", 0x01040000);
        let mut table = ResourceTable::new("android", PackageType::System, Box::new(ids));
        let err = table
            .add_entry(
                &pos(1),
                "android",
                "string",
                "ok",
                "OK",
                &[],
                &ConfigDescription::default(),
                false,
                format::ANY,
                false,
            )
            .unwrap_err();
        assert!(err.to_string().contains("already defined in package android"));
    }

    #[test]
    fn overlay_start_bag_needs_add_resource() {
        let mut table = table();
        let default = ConfigDescription::default();
        assert!(table
            .start_bag(&pos(1), "com.example", "style", "New", "", &default, true, false)
            .is_err());
        table.can_add_entry(&pos(2), "com.example", "style", "New");
        table
            .start_bag(&pos(3), "com.example", "style", "New", "", &default, true, false)
            .unwrap();
    }

    #[test]
    fn attributes_may_be_redeclared_identically() {
        let mut table = table();
        table
            .make_attribute(&pos(1), "com.example", "size", format::DIMENSION, "", false)
            .unwrap();
        table
            .make_attribute(&pos(2), "com.example", "size", format::DIMENSION, "", false)
            .unwrap();
        let err = table
            .make_attribute(&pos(3), "com.example", "size", format::INTEGER, "", false)
            .unwrap_err();
        assert!(err.to_string().contains("incompatible format"));
    }

    #[test]
    fn id_creation_only_in_own_package() {
        let mut table = table();
        table.assign_resource_ids().unwrap();
        let id = table
            .get_custom_resource_with_creation(&pos(1), "com.example", "id", "button")
            .unwrap();
        assert_eq!(id, 0x7f020000);
        assert_eq!(
            table
                .get_custom_resource_with_creation(&pos(2), "com.example", "id", "button")
                .unwrap(),
            id
        );

        let err = table
            .get_custom_resource_with_creation(&pos(3), "android", "id", "button")
            .unwrap_err();
        assert!(err.to_string().contains("@+id instead of @+android:id"));
    }

    #[test]
    fn localization_keys() {
        let fr_ca = ConfigDescription::parse("fr-rCA").unwrap();
        assert_eq!(ResourceTable::localization_key(&fr_ca), "fr_CA");
        assert_eq!(
            ResourceTable::localization_key(&ConfigDescription::default()),
            ""
        );
    }
}

//! Compiles a `res/values*/` file into the resource table.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use log::debug;

use super::string::parse_styled_string;
use crate::values::{parse_flags, parse_format, string_to_int};
use crate::xml::{NodeData, XmlNode};
use crate::{
    format, CompileOptions, ConfigDescription, ErrorLog, PseudoMethod, ResourceTable, SourcePos,
};

// Tag, resource type and `^type` bits of the single-value tags
const ITEM_TAGS: &[(&str, u32)] = &[
    ("drawable", format::REFERENCE | format::COLOR),
    ("color", format::REFERENCE | format::COLOR),
    ("bool", format::REFERENCE | format::BOOLEAN),
    ("integer", format::REFERENCE | format::INTEGER),
    ("dimen", format::REFERENCE | format::DIMENSION),
    ("fraction", format::REFERENCE | format::FRACTION),
];

const QUANTITIES: &[(&str, &str)] = &[
    ("other", "^other"),
    ("zero", "^zero"),
    ("one", "^one"),
    ("two", "^two"),
    ("few", "^few"),
    ("many", "^many"),
];

/// How the value of one resource tag is read and stored.
struct ValueKind {
    type_name: String,
    format: u32,
    is_bag: bool,
    // Overlays replace the whole bag rather than merging into it
    replace: bool,
    styled: bool,
    pseudolocalizable: bool,
    formatted: bool,
}

impl ValueKind {
    fn new(type_name: &str, format: u32, formatted: bool) -> Self {
        Self {
            type_name: type_name.to_string(),
            format,
            is_bag: false,
            replace: false,
            styled: false,
            pseudolocalizable: false,
            formatted,
        }
    }

    fn bag(type_name: &str, formatted: bool) -> Self {
        Self {
            is_bag: true,
            ..Self::new(type_name, format::ANY, formatted)
        }
    }
}

/// An `<attr>` being defined. It is only created in the table once something about it is known.
struct PendingAttribute {
    pos: SourcePos,
    ident: String,
    comment: String,
    format: u32,
    in_styleable: bool,
    added: bool,
    has_errors: bool,
}

struct ValuesCompiler<'t> {
    table: &'t mut ResourceTable,
    package: String,
    file: String,
    config: ConfigDescription,
    overwrite: bool,
    products: Vec<String>,
    pseudo_methods: Vec<PseudoMethod>,
    file_translatable: bool,
    next_public_id: HashMap<String, u32>,
    // Resources dropped because their product did not match
    skipped: BTreeSet<(String, String)>,
    errors: ErrorLog,
}

/// Adds every resource declared in a parsed `<resources>` document to `table`, under `config`.
///
/// Errors in single resources are collected and the rest of the file is still compiled.
/// Structural problems stop at the first one.
pub fn compile_resource_file(
    table: &mut ResourceTable,
    root: &XmlNode,
    config: &ConfigDescription,
    overwrite: bool,
    options: &CompileOptions,
) -> Result<()> {
    let file = root.pos.file.clone();
    let Some(resources) = root.root_element() else {
        return Err(root.pos.error("No start tag found"));
    };
    if resources.element_name() != Some("resources") {
        return Err(resources.pos.error(format!(
            "Invalid start tag {}",
            resources.element_name().unwrap_or_default()
        )));
    }

    let pseudo_methods = options.pseudo_methods()?;
    for (method, locale) in [(PseudoMethod::Accented, "en_XA"), (PseudoMethod::Bidi, "ar_XB")] {
        if pseudo_methods.contains(&method) && ResourceTable::localization_key(config) == locale
        {
            SourcePos::new(&file, 0).warning(format!(
                "Resource file {file} is skipped as pseudolocalization was done automatically."
            ));
            return Ok(());
        }
    }

    let mut compiler = ValuesCompiler {
        package: table.assets_package().to_string(),
        table,
        file_translatable: !file.contains("donottranslate"),
        file,
        config: *config,
        overwrite,
        products: options.products().into_iter().map(str::to_string).collect(),
        pseudo_methods,
        next_public_id: HashMap::new(),
        skipped: BTreeSet::new(),
        errors: ErrorLog::new(),
    };

    for child in &resources.children {
        match &child.data {
            NodeData::Element { name, .. } => compiler.compile_tag(child, name)?,
            NodeData::CData(text) if !text.trim().is_empty() => {
                return Err(child.pos.error(format!(
                    "Found text \"{}\" where item tag is expected",
                    text.trim()
                )));
            }
            _ => {}
        }
    }

    compiler.check_skipped_products()?;
    let ValuesCompiler { errors, file, .. } = compiler;
    errors.finish(&format!("Compiling {file}"))
}

impl ValuesCompiler<'_> {
    fn required<'n>(&mut self, node: &'n XmlNode, attr: &str, tag: &str) -> Option<&'n str> {
        let value = node.attribute_str(attr);
        if value.is_none() {
            self.errors.push(
                node.pos
                    .error(format!("A '{attr}' attribute is required for <{tag}>")),
            );
        }
        value
    }

    fn compile_tag(&mut self, node: &XmlNode, tag: &str) -> Result<()> {
        match tag {
            "skip" | "eat-comment" | "java-symbol" => Ok(()),
            "public" => {
                self.compile_public(node);
                Ok(())
            }
            "public-padding" => {
                self.compile_public_padding(node);
                Ok(())
            }
            "private-symbols" => {
                if self.required(node, "package", tag).is_some() {
                    node.pos.warning(
                        "<private-symbols> is deprecated. Use the command line flag --private-symbols instead.",
                    );
                }
                Ok(())
            }
            "add-resource" => {
                let type_name = self.required(node, "type", tag);
                let name = self.required(node, "name", tag);
                if let (Some(type_name), Some(name)) = (type_name, name) {
                    self.table
                        .can_add_entry(&node.pos, &self.package, type_name, name);
                }
                Ok(())
            }
            "declare-styleable" => self.compile_styleable(node),
            "attr" => self.compile_attribute(node, false).map(|_| ()),
            _ => self.compile_value(node, tag),
        }
    }

    fn compile_public(&mut self, node: &XmlNode) {
        let type_name = self.required(node, "type", "public");
        let name = self.required(node, "name", "public");
        let (Some(type_name), Some(name)) = (type_name, name) else {
            return;
        };

        let ident = match node.attribute_str("id") {
            Some(id) => match string_to_int(id) {
                Some(value) => value.data,
                None => {
                    self.errors.push(
                        node.pos
                            .error(format!("Given 'id' attribute is not an integer: {id}")),
                    );
                    return;
                }
            },
            None => match self.next_public_id.get(type_name) {
                Some(next) => *next,
                None => {
                    self.errors.push(node.pos.error(
                        "No 'id' attribute supplied <public>, and no previous id defined in this file.",
                    ));
                    return;
                }
            },
        };
        self.next_public_id
            .insert(type_name.to_string(), ident.wrapping_add(1));

        let result = self
            .table
            .add_public(&node.pos, &self.package, type_name, name, ident);
        self.errors.record(result);
    }

    fn compile_public_padding(&mut self, node: &XmlNode) {
        let type_name = self.required(node, "type", "public-padding");
        let name = self.required(node, "name", "public-padding");
        let (Some(type_name), Some(name)) = (type_name, name) else {
            return;
        };

        let parse = |attr: &str| node.attribute_str(attr).map(|s| (s, string_to_int(s)));
        let start = match parse("start") {
            Some((_, Some(value))) => value.data,
            Some((s, None)) => {
                self.errors.push(
                    node.pos
                        .error(format!("Given 'start' attribute is not an integer: {s}")),
                );
                return;
            }
            None => match self.next_public_id.get(type_name) {
                Some(next) => *next,
                None => {
                    self.errors.push(node.pos.error(
                        "No 'start' attribute supplied <public-padding>, and no previous id defined in this file.",
                    ));
                    return;
                }
            },
        };
        let end = match parse("end") {
            Some((_, Some(value))) => value.data,
            Some((s, None)) => {
                self.errors.push(
                    node.pos
                        .error(format!("Given 'end' attribute is not an integer: {s}")),
                );
                return;
            }
            None => {
                self.errors
                    .push(node.pos.error("No 'end' attribute supplied <public-padding>"));
                return;
            }
        };
        if end < start {
            self.errors.push(
                node.pos
                    .error(format!("Padding start '{start}' is after end '{end}'")),
            );
            return;
        }
        self.next_public_id
            .insert(type_name.to_string(), end.wrapping_add(1));

        for ident in start..=end {
            let padding_name = format!("{name}{}", end - ident + 1);
            let added = self.table.add_entry(
                &node.pos,
                &self.package,
                type_name,
                &padding_name,
                "padding",
                &[],
                &self.config,
                false,
                format::STRING,
                self.overwrite,
            );
            let result = added.and_then(|_| {
                self.table
                    .add_public(&node.pos, &self.package, type_name, &padding_name, ident)
            });
            if self.errors.record(result).is_none() {
                break;
            }
        }
    }

    fn compile_styleable(&mut self, node: &XmlNode) -> Result<()> {
        let name = self.required(node, "name", "declare-styleable");
        let mut styleable_ok = false;
        if let Some(name) = name {
            // Overlays may always declare new styleables
            if self.overwrite {
                self.table.can_add_entry(&node.pos, &self.package, "styleable", name);
            }
            let result = self.table.start_bag(
                &node.pos,
                &self.package,
                "styleable",
                name,
                "",
                &self.config,
                self.overwrite,
                false,
            );
            styleable_ok = self.errors.record(result).is_some();
        }

        for child in node.child_elements() {
            match child.element_name().unwrap_or_default() {
                "skip" | "eat-comment" => continue,
                "attr" => {}
                other => {
                    return Err(child.pos.error(format!(
                        "Tag <{other}> can not appear inside <declare-styleable>, only <attr>"
                    )))
                }
            }

            let attr = self.compile_attribute(child, true)?;
            if let (Some(attr), Some(name), true) = (attr, name, styleable_ok) {
                let result = self.table.add_bag(
                    &child.pos,
                    &self.package,
                    "styleable",
                    name,
                    "",
                    &attr,
                    "@null",
                    &[],
                    &self.config,
                    self.overwrite,
                    false,
                    format::ANY,
                );
                self.errors.record(result);
            }
        }
        Ok(())
    }

    fn create_attribute(&mut self, attr: &mut PendingAttribute) {
        if attr.added || attr.has_errors {
            return;
        }
        attr.added = true;
        let result = self.table.make_attribute(
            &attr.pos,
            &self.package,
            &attr.ident,
            attr.format,
            &attr.comment,
            attr.in_styleable,
        );
        if self.errors.record(result).is_none() {
            attr.has_errors = true;
        }
    }

    // Adds an internal `^key` item to the attr being defined.
    fn add_attribute_item(
        &mut self,
        attr: &mut PendingAttribute,
        pos: &SourcePos,
        key: &str,
        value: &str,
        replace: bool,
        is_id: bool,
    ) {
        let result = self.table.add_bag(
            pos,
            &self.package,
            "attr",
            &attr.ident,
            "",
            key,
            value,
            &[],
            &ConfigDescription::default(),
            replace,
            is_id,
            format::ANY,
        );
        if self.errors.record(result).is_none() {
            attr.has_errors = true;
        }
    }

    fn attribute_error(&mut self, attr: &mut PendingAttribute, pos: &SourcePos, msg: String) {
        self.errors.push(pos.error(msg));
        attr.has_errors = true;
    }

    /// Compiles an `<attr>` and returns its name. Inside a `<declare-styleable>`, an attr with
    /// nothing but a name refers to an attr defined elsewhere.
    fn compile_attribute(&mut self, node: &XmlNode, in_styleable: bool) -> Result<Option<String>> {
        let mut attr = PendingAttribute {
            pos: node.pos.clone(),
            ident: String::new(),
            comment: node.comment.clone(),
            format: format::ANY,
            in_styleable,
            added: false,
            has_errors: false,
        };
        match node.attribute_str("name") {
            Some(name) => attr.ident = name.to_string(),
            None => self.attribute_error(
                &mut attr,
                &node.pos,
                "A 'name' attribute is required for <attr>".into(),
            ),
        }

        if let Some(value) = node.attribute_str("format") {
            match parse_format(value).filter(|bits| *bits != 0) {
                Some(bits) => attr.format = bits,
                None => self.attribute_error(
                    &mut attr,
                    &node.pos,
                    format!("Tag <attr> 'format' attribute value \"{value}\" not valid"),
                ),
            }
            self.create_attribute(&mut attr);
        } else if !in_styleable {
            // Outside a styleable an attr without a format accepts any value
            self.create_attribute(&mut attr);
        }

        let mut has_range = false;
        for (bound, key) in [("min", "^min"), ("max", "^max")] {
            let Some(value) = node.attribute_str(bound) else {
                continue;
            };
            has_range = true;
            if string_to_int(value).is_none() {
                self.attribute_error(
                    &mut attr,
                    &node.pos,
                    format!("Tag <attr> '{bound}' attribute must be a number, not \"{value}\""),
                );
            }
            self.create_attribute(&mut attr);
            if !attr.has_errors {
                self.add_attribute_item(&mut attr, &node.pos, key, value, false, false);
            }
        }
        if has_range && attr.format & format::INTEGER == 0 {
            self.attribute_error(
                &mut attr,
                &node.pos,
                "Tag <attr> must have format=integer attribute if using max or min".into(),
            );
        }

        if let Some(value) = node.attribute_str("localization") {
            let l10n = parse_flags(value, format::L10N_NAMES);
            if l10n.is_none() {
                self.attribute_error(
                    &mut attr,
                    &node.pos,
                    format!("Tag <attr> 'localization' attribute value \"{value}\" not valid"),
                );
            }
            self.create_attribute(&mut attr);
            if let (Some(l10n), false) = (l10n, attr.has_errors) {
                self.add_attribute_item(
                    &mut attr,
                    &node.pos,
                    "^l10n",
                    &l10n.to_string(),
                    false,
                    false,
                );
            }
        }

        for child in node.child_elements() {
            let local = match child.element_name().unwrap_or_default() {
                "enum" => format::ENUM,
                "flag" => format::FLAGS,
                other => {
                    return Err(child.pos.error(format!(
                        "Tag <{other}> can not appear inside <attr>, only <enum> or <flag>"
                    )))
                }
            };

            self.create_attribute(&mut attr);
            if attr.format == format::ANY {
                // Symbols without a format make the attr an enum or flags
                attr.format = 0;
            }

            let kind = attr.format & (format::ENUM | format::FLAGS);
            if kind == 0 {
                attr.format |= local;
                if !attr.has_errors {
                    let value = (attr.format as i32).to_string();
                    self.add_attribute_item(&mut attr, &child.pos, "^type", &value, true, false);
                }
            } else if kind != local {
                let msg = if local == format::ENUM {
                    "<enum> attribute can not be used inside a flags format"
                } else {
                    "<flag> attribute can not be used inside a enum format"
                };
                self.attribute_error(&mut attr, &child.pos, msg.into());
            }

            let symbol = child.attribute_str("name");
            if symbol.is_none() {
                self.attribute_error(
                    &mut attr,
                    &child.pos,
                    "A 'name' attribute is required for <enum> or <flag>".into(),
                );
            }
            let value = child.attribute_str("value");
            if value.is_none() {
                self.attribute_error(
                    &mut attr,
                    &child.pos,
                    "A 'value' attribute is required for <enum> or <flag>".into(),
                );
            }
            let (Some(symbol), Some(value)) = (symbol, value) else {
                continue;
            };
            if !attr.has_errors && string_to_int(value).is_none() {
                self.attribute_error(
                    &mut attr,
                    &child.pos,
                    format!(
                        "Tag <enum> or <flag> 'value' attribute must be a number, not \"{value}\""
                    ),
                );
            }
            if !attr.has_errors {
                self.add_attribute_item(&mut attr, &child.pos, symbol, value, false, true);
            }
        }

        Ok((!attr.ident.is_empty()).then_some(attr.ident))
    }

    fn value_kind(&mut self, node: &XmlNode, tag: &str) -> Result<Option<ValueKind>> {
        let formatted = self.file_translatable;
        let kind = match tag {
            "item" => {
                let Some(type_name) = self.required(node, "type", tag) else {
                    return Ok(None);
                };
                let mut kind = ValueKind::new(type_name, format::ANY, formatted);
                kind.styled = true;
                if let Some(value) = node.attribute_str("format") {
                    match parse_format(value).filter(|bits| *bits != 0) {
                        Some(bits) => kind.format = bits,
                        None => {
                            self.errors.push(node.pos.error(format!(
                                "Tag <item> 'format' attribute value \"{value}\" not valid"
                            )));
                            return Ok(None);
                        }
                    }
                }
                kind
            }
            "string" => self.string_kind(node),
            "bag" => {
                let Some(type_name) = self.required(node, "type", tag) else {
                    return Ok(None);
                };
                ValueKind::bag(type_name, formatted)
            }
            "style" => ValueKind::bag("style", formatted),
            "plurals" => ValueKind {
                pseudolocalizable: self.file_translatable,
                ..ValueKind::bag("plurals", formatted)
            },
            "array" => {
                let mut kind = ValueKind {
                    replace: true,
                    ..ValueKind::bag("array", formatted)
                };
                if let Some(value) = node.attribute_str("format") {
                    match parse_format(value).filter(|bits| *bits != 0) {
                        Some(bits) => kind.format = bits,
                        None => {
                            self.errors.push(node.pos.error(format!(
                                "Tag <array> 'format' attribute value \"{value}\" not valid"
                            )));
                            return Ok(None);
                        }
                    }
                }
                kind
            }
            "string-array" => {
                let translatable = node.attribute_str("translatable") != Some("false");
                ValueKind {
                    format: format::REFERENCE | format::STRING,
                    replace: true,
                    pseudolocalizable: translatable && self.file_translatable,
                    formatted: formatted && node.attribute_str("formatted") != Some("false"),
                    ..ValueKind::bag("array", formatted)
                }
            }
            "integer-array" => ValueKind {
                format: format::REFERENCE | format::INTEGER,
                replace: true,
                ..ValueKind::bag("array", formatted)
            },
            _ => match ITEM_TAGS.iter().find(|(name, _)| *name == tag) {
                Some((type_name, bits)) => ValueKind::new(type_name, *bits, formatted),
                None => {
                    return Err(node
                        .pos
                        .error(format!("Found tag {tag} where item is expected")))
                }
            },
        };
        Ok(Some(kind))
    }

    // Reads the attributes of a <string>, tracking which locales it is translated into.
    fn string_kind(&mut self, node: &XmlNode) -> ValueKind {
        let locale = ResourceTable::localization_key(&self.config);
        let translatable = node.attribute_str("translatable") != Some("false");
        let mut formatted = self.file_translatable;

        if let Some(name) = node.attribute_str("name").filter(|name| !name.is_empty()) {
            if locale.is_empty() {
                self.table.add_default_localization(name);
            }
            if !translatable {
                formatted = false;
                if !locale.is_empty() {
                    node.pos.warning(format!(
                        "string '{name}' marked untranslatable but exists in locale '{locale}'"
                    ));
                }
            } else {
                self.table.add_localization(name, &locale, &node.pos);
            }
            if node.attribute_str("formatted") == Some("false") {
                formatted = false;
            }
        }

        ValueKind {
            styled: true,
            pseudolocalizable: self.file_translatable && translatable,
            ..ValueKind::new("string", format::REFERENCE | format::STRING, formatted)
        }
    }

    fn compile_value(&mut self, node: &XmlNode, tag: &str) -> Result<()> {
        let kind = self.value_kind(node, tag)?;
        let name = self.required(node, "name", tag);
        let (Some(kind), Some(name)) = (kind, name) else {
            return Ok(());
        };
        let product = node.attribute_str("product").unwrap_or_default();

        let ok = if kind.is_bag {
            self.compile_bag(node, tag, &kind, name)?
        } else {
            self.compile_item(node, &kind, name, product)
        };

        if ok {
            self.table.append_comment(
                &self.package,
                &kind.type_name,
                name,
                &node.comment,
                false,
            );
        }
        Ok(())
    }

    // Pseudolocalized configurations to add alongside a default-locale value.
    fn pseudo_variants(&self, kind: &ValueKind) -> Vec<(PseudoMethod, ConfigDescription)> {
        let has_locale = self.config.language[0] != 0 || self.config.country[0] != 0;
        if !kind.pseudolocalizable || has_locale {
            return Vec::new();
        }

        self.pseudo_methods
            .iter()
            .map(|method| {
                let mut config = self.config;
                if *method == PseudoMethod::Bidi {
                    config.set_language("ar");
                    config.set_region("XB");
                } else {
                    config.set_language("en");
                    config.set_region("XA");
                }
                (*method, config)
            })
            .collect()
    }

    fn compile_item(&mut self, node: &XmlNode, kind: &ValueKind, name: &str, product: &str) -> bool {
        let config = self.config;
        match self.add_item(node, kind, name, product, &config, PseudoMethod::None) {
            Ok(true) => {}
            Ok(false) => return true,
            Err(err) => {
                self.errors.push(err);
                return false;
            }
        }

        let mut ok = true;
        for (method, config) in self.pseudo_variants(kind) {
            if let Err(err) = self.add_item(node, kind, name, product, &config, method) {
                self.errors.push(err);
                ok = false;
            }
        }
        ok
    }

    // Adds a single value. Returns false if its product rules it out.
    fn add_item(
        &mut self,
        node: &XmlNode,
        kind: &ValueKind,
        name: &str,
        product: &str,
        config: &ConfigDescription,
        pseudo: PseudoMethod,
    ) -> Result<bool> {
        let value = parse_styled_string(node, kind.styled, kind.formatted, pseudo)?;

        if !product.is_empty() {
            if self.products.is_empty() {
                // Without a requested product only the default variant is used
                if product != "default" {
                    self.skipped
                        .insert((kind.type_name.clone(), name.to_string()));
                    return Ok(false);
                }
            } else if !self.products.iter().any(|p| p == product) {
                let is_fallback = product == "default"
                    && !self.table.has_bag_or_entry_for_config(
                        &self.package,
                        &kind.type_name,
                        name,
                        config,
                    );
                if !is_fallback {
                    return Ok(false);
                }
            }
        }

        debug!(
            "Adding {}/{name} for config '{config}': {}",
            kind.type_name, value.text
        );
        self.table.add_entry(
            &node.pos,
            &self.package,
            &kind.type_name,
            name,
            &value.text,
            &value.spans,
            config,
            false,
            kind.format,
            self.overwrite,
        )?;
        Ok(true)
    }

    fn compile_bag(&mut self, node: &XmlNode, tag: &str, kind: &ValueKind, name: &str) -> Result<bool> {
        let parent = match node.attribute_str("parent") {
            Some(parent) => parent,
            None => name.rsplit_once('.').map_or("", |(parent, _)| parent),
        };

        let started = self.table.start_bag(
            &node.pos,
            &self.package,
            &kind.type_name,
            name,
            parent,
            &self.config,
            self.overwrite,
            kind.replace,
        );
        let mut ok = self.errors.record(started).is_some();

        let mut index = 0;
        for child in node.child_elements() {
            if child.element_name() != Some("item") {
                return Err(child.pos.error(format!(
                    "Tag <{}> can not appear inside <{tag}>, only <item>",
                    child.element_name().unwrap_or_default()
                )));
            }

            let key = match kind.type_name.as_str() {
                "array" => {
                    let key = format!("^index_{index}");
                    index += 1;
                    Some(key)
                }
                "plurals" => self.plural_key(child),
                _ => self.required(child, "name", "item").map(str::to_string),
            };
            let Some(key) = key else {
                ok = false;
                continue;
            };

            let config = self.config;
            let mut variants = vec![(PseudoMethod::None, config)];
            variants.extend(self.pseudo_variants(kind));
            for (method, config) in variants {
                let added = parse_styled_string(child, true, kind.formatted, method).and_then(
                    |value| {
                        self.table.add_bag(
                            &child.pos,
                            &self.package,
                            &kind.type_name,
                            name,
                            parent,
                            &key,
                            &value.text,
                            &value.spans,
                            &config,
                            self.overwrite,
                            false,
                            kind.format,
                        )
                    },
                );
                if self.errors.record(added).is_none() {
                    ok = false;
                    break;
                }
            }
        }
        Ok(ok)
    }

    fn plural_key(&mut self, item: &XmlNode) -> Option<String> {
        let Some(quantity) = item.attribute_str("quantity") else {
            self.errors.push(item.pos.error(
                "A 'quantity' attribute is required for <item> inside <plurals>",
            ));
            return None;
        };
        match QUANTITIES.iter().find(|(name, _)| *name == quantity) {
            Some((_, key)) => Some(key.to_string()),
            None => {
                self.errors.push(
                    item.pos
                        .error("Illegal 'quantity' attribute is <item> inside <plurals>"),
                );
                None
            }
        }
    }

    // Every resource dropped for its product needs a variant that was kept.
    fn check_skipped_products(&self) -> Result<()> {
        for (type_name, name) in &self.skipped {
            if !self.table.has_bag_or_entry(&self.package, type_name, name) {
                let product = if self.products.is_empty() {
                    "default".to_string()
                } else {
                    self.products.join(",")
                };
                return Err(SourcePos::new(&self.file, 0).error(format!(
                    "{type_name} '{name}' does not match product {product}.\n\tYou may have forgotten to include a 'default' product variant of the resource."
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoIncluded, PackageType, Pseudolocalize, ResValue, ValueType};

    fn table() -> ResourceTable {
        ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded))
    }

    fn compile_with(
        table: &mut ResourceTable,
        file: &str,
        config: &str,
        xml: &str,
        options: &CompileOptions,
    ) -> Result<()> {
        let root = XmlNode::parse(file, xml.as_bytes()).unwrap();
        let config = ConfigDescription::parse(config).unwrap();
        compile_resource_file(table, &root, &config, false, options)
    }

    fn compile(table: &mut ResourceTable, config: &str, xml: &str) -> Result<()> {
        compile_with(
            table,
            "res/values/values.xml",
            config,
            xml,
            &CompileOptions::new("com.example"),
        )
    }

    fn item_value(table: &ResourceTable, type_name: &str, name: &str, config: &str) -> String {
        let config = ConfigDescription::parse(config).unwrap();
        let entry = &table
            .package()
            .find_type(type_name)
            .unwrap()
            .config_list(name)
            .unwrap()
            .entries[&config];
        entry.item().unwrap().value.clone()
    }

    #[test]
    fn simple_values() {
        let mut table = table();
        compile(
            &mut table,
            "",
            r#"<resources>
                <string name="app_name">My App</string>
                <color name="accent">#ff0000</color>
                <dimen name="margin">16dp</dimen>
                <item type="id" name="button" />
            </resources>"#,
        )
        .unwrap();

        assert_eq!(item_value(&table, "string", "app_name", ""), "My App");
        assert_eq!(item_value(&table, "color", "accent", ""), "#ff0000");
        assert!(table.has_bag_or_entry("com.example", "id", "button"));
        assert!(table.has_default_localization("app_name"));
    }

    #[test]
    fn styleable_attrs_are_created_and_referenced() {
        let mut table = table();
        compile(
            &mut table,
            "",
            r#"<resources>
                <declare-styleable name="MyView">
                    <attr name="color" format="color" />
                </declare-styleable>
            </resources>"#,
        )
        .unwrap();
        table.assign_resource_ids().unwrap();

        let attr_id = table.get_res_id("com.example", "attr", "color", false).unwrap();
        assert_eq!(table.attribute_type(attr_id), Some(format::COLOR));

        let styleable = table
            .package()
            .find_type("styleable")
            .unwrap()
            .config_list("MyView")
            .unwrap();
        let bag = styleable.entries.values().next().unwrap().bag().unwrap();
        assert_eq!(bag.len(), 1);
        assert_eq!(bag["color"].bag_key_id, attr_id);

        // References are always accepted alongside the declared format
        let params = crate::table::CoerceParams {
            attr_id,
            ..Default::default()
        };
        assert_eq!(
            table.coerce("@null", &params).unwrap().value,
            ResValue::new(ValueType::Reference, 0)
        );
        assert!(table.coerce("#fff", &params).is_ok());
        assert!(table.coerce("12", &params).is_err());
    }

    #[test]
    fn attribute_symbols_and_ranges() {
        let mut table = table();
        compile(
            &mut table,
            "",
            r#"<resources>
                <attr name="mode">
                    <enum name="fast" value="1" />
                    <enum name="slow" value="2" />
                </attr>
                <attr name="count" format="integer" min="0" max="10" />
                <attr name="bad" format="string" min="0" />
            </resources>"#,
        )
        .unwrap_err();
        table.assign_resource_ids().unwrap();

        let mode = table.get_res_id("com.example", "attr", "mode", false).unwrap();
        assert_eq!(table.attribute_type(mode), Some(format::ENUM));
        assert_eq!(table.attribute_enum(mode, "slow"), Some(2));

        let count = table.get_res_id("com.example", "attr", "count", false).unwrap();
        let params = crate::table::CoerceParams {
            attr_id: count,
            ..Default::default()
        };
        assert!(table.coerce("10", &params).is_ok());
        assert!(table.coerce("11", &params).is_err());
    }

    #[test]
    fn plurals_and_arrays_use_internal_keys() {
        let mut table = table();
        compile(
            &mut table,
            "",
            r#"<resources>
                <plurals name="songs">
                    <item quantity="one">%d song</item>
                    <item quantity="other">%d songs</item>
                </plurals>
                <string-array name="planets">
                    <item>Mercury</item>
                    <item>Venus</item>
                </string-array>
                <style name="Theme.Dark" />
            </resources>"#,
        )
        .unwrap();

        let bag_keys = |type_name: &str, name: &str| -> Vec<String> {
            let list = table
                .package()
                .find_type(type_name)
                .unwrap()
                .config_list(name)
                .unwrap();
            list.entries.values().next().unwrap().bag().unwrap().keys().cloned().collect()
        };
        assert_eq!(bag_keys("plurals", "songs"), vec!["^one", "^other"]);
        assert_eq!(bag_keys("array", "planets"), vec!["^index_0", "^index_1"]);

        let style = table
            .package()
            .find_type("style")
            .unwrap()
            .config_list("Theme.Dark")
            .unwrap();
        assert_eq!(style.entries.values().next().unwrap().parent, "Theme");
    }

    #[test]
    fn public_ids_continue_from_the_previous_one() {
        let mut table = table();
        compile(
            &mut table,
            "",
            r#"<resources>
                <public type="string" name="first" id="0x7f020000" />
                <public type="string" name="second" />
                <string name="first">1</string>
                <string name="second">2</string>
            </resources>"#,
        )
        .unwrap();
        table.assign_resource_ids().unwrap();
        assert_eq!(
            table.get_res_id("com.example", "string", "second", true),
            Some(0x7f020001)
        );
    }

    #[test]
    fn products_pick_one_variant() {
        let xml = r#"<resources>
            <string name="label" product="tablet">Tablet</string>
            <string name="label" product="default">Phone</string>
            <string name="only_tv" product="tv">TV</string>
        </resources>"#;

        let mut default_table = table();
        let err = compile(&mut default_table, "", xml).unwrap_err();
        assert!(err.to_string().contains("string 'only_tv' does not match product default"));
        assert_eq!(item_value(&default_table, "string", "label", ""), "Phone");

        let mut tablet_table = table();
        let mut options = CompileOptions::new("com.example");
        options.product = Some("tablet,tv".into());
        compile_with(&mut tablet_table, "res/values/values.xml", "", xml, &options).unwrap();
        assert_eq!(item_value(&tablet_table, "string", "label", ""), "Tablet");
    }

    #[test]
    fn pseudolocalized_copies_are_added() {
        let mut table = table();
        let mut options = CompileOptions::new("com.example");
        options.pseudolocalize = Pseudolocalize::All;
        compile_with(
            &mut table,
            "res/values/strings.xml",
            "",
            r#"<resources>
                <string name="hello">Hello</string>
                <string name="fixed" translatable="false">Fixed</string>
            </resources>"#,
            &options,
        )
        .unwrap();

        assert!(item_value(&table, "string", "hello", "en-rXA").starts_with("[Ĥéļļö"));
        assert!(item_value(&table, "string", "hello", "ar-rXB").contains('\u{202e}'));
        let fixed = table
            .package()
            .find_type("string")
            .unwrap()
            .config_list("fixed")
            .unwrap();
        assert_eq!(fixed.entries.len(), 1);
    }

    #[test]
    fn malformed_files_stop_early() {
        let mut table = table();
        let err = compile(&mut table, "", "<values />").unwrap_err();
        assert!(err.to_string().contains("Invalid start tag values"));

        let err = compile(&mut table, "", "<resources><widget name=\"a\" /></resources>")
            .unwrap_err();
        assert!(err.to_string().contains("Found tag widget where item is expected"));

        let err = compile(&mut table, "", "<resources>stray</resources>").unwrap_err();
        assert!(err.to_string().contains("Found text \"stray\""));
    }

    #[test]
    fn overlays_need_add_resource() {
        let mut table = table();
        let root = XmlNode::parse(
            "overlay/values/values.xml",
            br#"<resources><style name="New" /></resources>"#.as_slice(),
        )
        .unwrap();
        let config = ConfigDescription::default();
        let options = CompileOptions::new("com.example");
        assert!(compile_resource_file(&mut table, &root, &config, true, &options).is_err());

        let root = XmlNode::parse(
            "overlay/values/values.xml",
            br#"<resources><add-resource type="style" name="New" /><style name="New" /></resources>"#
                .as_slice(),
        )
        .unwrap();
        compile_resource_file(&mut table, &root, &config, true, &options).unwrap();
    }

    #[test]
    fn overlays_may_declare_new_styleables() {
        let mut table = table();
        let root = XmlNode::parse(
            "overlay/values/attrs.xml",
            br#"<resources>
                <declare-styleable name="NewView"><attr name="tint" format="color" /></declare-styleable>
            </resources>"#
                .as_slice(),
        )
        .unwrap();
        let config = ConfigDescription::default();
        let options = CompileOptions::new("com.example");
        compile_resource_file(&mut table, &root, &config, true, &options).unwrap();

        assert!(table.has_bag_or_entry("com.example", "styleable", "NewView"));
        assert!(table.has_bag_or_entry("com.example", "attr", "tint"));
    }
}

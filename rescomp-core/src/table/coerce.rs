//! Turns the literal text of a value into a typed `ResValue`, checked against the format of
//! the attribute it is assigned to.

use log::warn;

use super::{expand_resource_ref, ResourceTable};
use crate::values::{
    collect_string, is_space, parse_color, string_to_float, string_to_int, ATTR_MAX, ATTR_MIN,
    ATTR_TYPE,
};
use crate::{format, is_internal_id, res_package_id, ResValue, SourcePos, ValueType};

/// How a literal should be interpreted.
#[derive(Debug, Clone, Copy)]
pub struct CoerceParams {
    /// The attribute the value is assigned to, 0 for none.
    pub attr_id: u32,
    /// Allowed formats when `attr_id` does not say.
    pub attr_type: u32,
    pub preserve_spaces: bool,
    /// Let values that parse as another type fall back to a string if the attribute
    /// accepts strings.
    pub coerce_type: bool,
    /// Refuse references to private resources of other packages.
    pub enforce_private: bool,
}

impl Default for CoerceParams {
    fn default() -> Self {
        Self {
            attr_id: 0,
            attr_type: format::ANY,
            preserve_spaces: false,
            coerce_type: true,
            enforce_private: true,
        }
    }
}

/// A coerced value. String values have data 0 and carry their processed text in `string`
/// until it is given a place in a string pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub value: ResValue,
    pub string: Option<String>,
}

impl Coerced {
    fn value(value: ResValue) -> Self {
        Self {
            value,
            string: None,
        }
    }

    fn string(text: String) -> Self {
        Self {
            value: ResValue::new(ValueType::String, 0),
            string: Some(text),
        }
    }
}

const REFERENCE_NOT_FOUND: &str = "No resource found that matches the given name";

// Trims surrounding whitespace, keeping a space that an escaping backslash applies to.
fn trim_value(s: &str, preserve_spaces: bool) -> &str {
    if preserve_spaces {
        return s;
    }
    let s = s.trim_start_matches(is_space);
    let trimmed = s.trim_end_matches(is_space);
    let mut end = trimmed.len();
    if trimmed.ends_with('\\') {
        if let Some(c) = s[end..].chars().next() {
            end += c.len_utf8();
        }
    }
    &s[..end]
}

// The app package and the framework are referenced directly. Anything else is a shared
// library whose ID is only known at runtime.
fn reference_type(id: u32, direct: ValueType, dynamic: ValueType) -> ValueType {
    match res_package_id(id) {
        0x7f | 0x01 => direct,
        _ => dynamic,
    }
}

impl ResourceTable {
    /// Creates the resource named by an `@+type/name` literal, then coerces it.
    pub fn string_to_value(
        &mut self,
        pos: &SourcePos,
        s: &str,
        params: &CoerceParams,
    ) -> Result<Coerced, String> {
        let trimmed = trim_value(s, params.preserve_spaces);
        if let Some(rest) = trimmed.strip_prefix("@+").filter(|rest| !rest.is_empty()) {
            let r = expand_resource_ref(rest, None, Some(self.assets_package()))?;
            if self
                .included()
                .identifier_for_name(&r.package, &r.type_name, &r.name, false)
                .is_none()
            {
                self.get_custom_resource_with_creation(pos, &r.package, &r.type_name, &r.name)
                    .map_err(|err| err.to_string())?;
            }
        }
        self.coerce(s, params)
    }

    /// Interprets `s`. Never creates resources, so `@+type/name` only finds existing ones.
    pub fn coerce(&self, s: &str, params: &CoerceParams) -> Result<Coerced, String> {
        let s = trim_value(s, params.preserve_spaces);

        let mut attr_type = params.attr_type;
        let mut attr_min = 0x80000000u32;
        let mut attr_max = 0x7fffffffu32;
        let has_attr = params.attr_id != 0 && !is_internal_id(params.attr_id);
        if has_attr {
            if let Some(found) = self.attribute_type(params.attr_id) {
                attr_type = found;
                if found == format::ENUM || found == format::FLAGS || found == format::INTEGER {
                    if let Some(min) = self.get_item_value(params.attr_id, ATTR_MIN) {
                        attr_min = min.data;
                    }
                    if let Some(max) = self.get_item_value(params.attr_id, ATTR_MAX) {
                        attr_max = max.data;
                    }
                }
            }
        }
        let can_string_coerce = params.coerce_type && attr_type & format::STRING != 0;

        if s.starts_with('@') {
            return self.coerce_reference(s, params.enforce_private);
        }

        if s.starts_with('#') {
            match parse_color(s) {
                Some(color) if attr_type & format::COLOR != 0 => return Ok(Coerced::value(color)),
                Some(_) if !can_string_coerce => return Err("Color types not allowed".into()),
                Some(_) => {}
                None if attr_type & format::COLOR != 0 => {
                    return Err(
                        "Color value not valid -- must be #rgb, #argb, #rrggbb, or #aarrggbb"
                            .into(),
                    )
                }
                None => {}
            }
        }

        if let Some(rest) = s.strip_prefix('?') {
            return self.coerce_attribute_ref(rest, params.enforce_private);
        }

        if let Some(value) = string_to_int(s) {
            if attr_type & format::INTEGER == 0 {
                if !can_string_coerce && attr_type & format::FLOAT == 0 {
                    return Err("Integer types not allowed".into());
                }
            } else {
                let data = value.data as i32;
                if data < attr_min as i32 || data > attr_max as i32 {
                    return Err("Integer value out of range".into());
                }
                return Ok(Coerced::value(value));
            }
        }

        if let Some(value) = string_to_float(s) {
            let (allowed, name) = match value.data_type {
                ValueType::Dimension => (format::DIMENSION, "Dimension"),
                ValueType::Fraction => (format::FRACTION, "Fraction"),
                _ => (format::FLOAT, "Float"),
            };
            if attr_type & allowed != 0 {
                return Ok(Coerced::value(value));
            }
            if !can_string_coerce {
                return Err(format!("{name} types not allowed"));
            }
        }

        let boolean = if s.eq_ignore_ascii_case("true") {
            Some(true)
        } else if s.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        };
        if let Some(b) = boolean {
            if attr_type & format::BOOLEAN != 0 {
                let data = if b { 0xFFFFFFFF } else { 0 };
                return Ok(Coerced::value(ResValue::new(ValueType::IntBoolean, data)));
            }
            if !can_string_coerce {
                return Err("Boolean types not allowed".into());
            }
        }

        if has_attr && attr_type & format::ENUM != 0 {
            if let Some(value) = self.attribute_enum(params.attr_id, s) {
                return Ok(Coerced::value(ResValue::new(ValueType::IntDec, value)));
            }
        }

        if has_attr && attr_type & format::FLAGS != 0 {
            if let Some(value) = self.attribute_flags(params.attr_id, s) {
                return Ok(Coerced::value(ResValue::new(ValueType::IntHex, value)));
            }
        }

        if attr_type & format::STRING == 0 {
            return Err("String types not allowed".into());
        }
        collect_string(s, params.preserve_spaces).map(Coerced::string)
    }

    fn coerce_reference(&self, s: &str, enforce_private: bool) -> Result<Coerced, String> {
        match s {
            "@null" => return Ok(Coerced::value(ResValue::new(ValueType::Reference, 0))),
            "@empty" => return Ok(Coerced::value(ResValue::new(ValueType::Null, 1))),
            _ => {}
        }

        let rest = &s[1..];
        let rest = match rest.strip_prefix('+') {
            Some(created) if !created.is_empty() => created,
            _ => rest,
        };
        let r = expand_resource_ref(rest, None, Some(self.assets_package()))?;
        let enforce_private = enforce_private && r.only_public;

        if let Some(id) = self
            .included()
            .identifier_for_name(&r.package, &r.type_name, &r.name, false)
        {
            if enforce_private
                && r.package != self.assets_package()
                && self
                    .included()
                    .identifier_for_name(&r.package, &r.type_name, &r.name, true)
                    .is_none()
            {
                return Err("Resource is not public.".into());
            }
            let data_type = reference_type(id, ValueType::Reference, ValueType::DynamicReference);
            return Ok(Coerced::value(ResValue::new(data_type, id)));
        }

        match self.get_custom_resource(&r.package, &r.type_name, &r.name) {
            Some(id) if res_package_id(id) == 0 => Ok(Coerced::value(ResValue::new(
                ValueType::DynamicReference,
                id,
            ))),
            Some(id) => Ok(Coerced::value(ResValue::new(ValueType::Reference, id))),
            None => Err(REFERENCE_NOT_FOUND.into()),
        }
    }

    fn coerce_attribute_ref(&self, rest: &str, enforce_private: bool) -> Result<Coerced, String> {
        let r = expand_resource_ref(rest, Some("attr"), Some(self.assets_package()))?;
        let enforce_private = enforce_private && r.only_public;

        if let Some(id) = self
            .included()
            .identifier_for_name(&r.package, &r.type_name, &r.name, false)
        {
            if enforce_private
                && self
                    .included()
                    .identifier_for_name(&r.package, &r.type_name, &r.name, true)
                    .is_none()
            {
                return Err("Attribute is not public.".into());
            }
            let data_type = reference_type(id, ValueType::Attribute, ValueType::DynamicAttribute);
            return Ok(Coerced::value(ResValue::new(data_type, id)));
        }

        match self.get_custom_resource(&r.package, &r.type_name, &r.name) {
            Some(id) if res_package_id(id) == 0 => Ok(Coerced::value(ResValue::new(
                ValueType::DynamicAttribute,
                id,
            ))),
            Some(id) => Ok(Coerced::value(ResValue::new(ValueType::Attribute, id))),
            None => Err(REFERENCE_NOT_FOUND.into()),
        }
    }

    /// The value of the bag item with key `attr_id` in the bag resource `res_id`.
    pub(crate) fn get_item_value(&self, res_id: u32, attr_id: u32) -> Option<ResValue> {
        let entry = self.find_entry(res_id)?;
        let (key, item) = entry
            .bag()?
            .iter()
            .find(|(_, item)| item.bag_key_id == attr_id)?;

        if self.resolving.borrow().contains(&(res_id, attr_id)) {
            warn!(
                "Circular reference detected in key '{key}' of bag '{}'",
                entry.name
            );
            return None;
        }

        self.resolving.borrow_mut().push((res_id, attr_id));
        let params = CoerceParams {
            attr_id: item.bag_key_id,
            coerce_type: false,
            ..Default::default()
        };
        let result = self.coerce(&item.value, &params);
        self.resolving.borrow_mut().pop();

        result.ok().map(|coerced| coerced.value)
    }

    /// The `^type` format bits of an attribute, from the included resources or this table.
    pub fn attribute_type(&self, attr_id: u32) -> Option<u32> {
        if let Some(found) = self.included().attribute_type(attr_id) {
            return Some(found);
        }
        self.get_item_value(attr_id, ATTR_TYPE)
            .map(|value| value.data)
    }

    /// Value of the enum symbol `name` of an attribute.
    pub fn attribute_enum(&self, attr_id: u32, name: &str) -> Option<u32> {
        if let Some(symbols) = self.included().attribute_bag(attr_id) {
            if let Some((_, value)) = symbols.iter().find(|(symbol, _)| symbol == name) {
                return Some(*value);
            }
        }

        self.attribute_enum_local(attr_id, name)
    }

    /// Bitwise or of the `|` separated flag symbols in `value`, if every one is known.
    pub fn attribute_flags(&self, attr_id: u32, value: &str) -> Option<u32> {
        let included = self.included().attribute_bag(attr_id);
        let mut result = 0;
        for part in value.split('|') {
            let part = part.trim_matches(is_space);
            let from_included = included
                .as_ref()
                .and_then(|symbols| symbols.iter().find(|(symbol, _)| symbol == part))
                .map(|(_, bits)| *bits);
            let bits = match from_included {
                Some(bits) => bits,
                None => self.attribute_enum_local(attr_id, part)?,
            };
            result |= bits;
        }
        Some(result)
    }

    fn attribute_enum_local(&self, attr_id: u32, name: &str) -> Option<u32> {
        if name.starts_with('^') {
            return None;
        }
        let item = self.find_entry(attr_id)?.bag()?.get(name)?;
        self.get_item_value(attr_id, item.bag_key_id)
            .map(|value| value.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigDescription, NoIncluded, PackageType, ResourceIds};

    fn pos() -> SourcePos {
        SourcePos::new("res/values/attrs.xml", 1)
    }

    fn add_symbol(table: &mut ResourceTable, attr: &str, key: &str, value: &str) {
        table
            .add_bag(
                &pos(),
                "com.example",
                "attr",
                attr,
                "",
                key,
                value,
                &[],
                &ConfigDescription::default(),
                false,
                true,
                format::ANY,
            )
            .unwrap();
    }

    fn framework() -> ResourceIds {
        let mut ids = ResourceIds::new("android");
        ids.insert("string", "ok", 0x01040000);
        ids.insert_private("string", "hidden", 0x01040001);
        ids.insert_attr(
            "gravity",
            0x01010001,
            format::FLAGS,
            &[("top", 0x30), ("left", 0x03)],
        );
        ids
    }

    fn table() -> ResourceTable {
        let mut table =
            ResourceTable::new("com.example", PackageType::App, Box::new(framework()));
        table
            .make_attribute(&pos(), "com.example", "orientation", format::ENUM, "", false)
            .unwrap();
        add_symbol(&mut table, "orientation", "horizontal", "0");
        add_symbol(&mut table, "orientation", "vertical", "1");
        table
            .make_attribute(&pos(), "com.example", "size", format::DIMENSION, "", false)
            .unwrap();
        table
            .add_entry(
                &pos(),
                "com.example",
                "string",
                "title",
                "Title",
                &[],
                &ConfigDescription::default(),
                false,
                format::ANY,
                false,
            )
            .unwrap();
        table.assign_resource_ids().unwrap();
        table
    }

    fn attr(table: &ResourceTable, name: &str) -> CoerceParams {
        CoerceParams {
            attr_id: table.get_res_id("com.example", "attr", name, false).unwrap(),
            ..Default::default()
        }
    }

    fn value(table: &ResourceTable, s: &str, params: &CoerceParams) -> ResValue {
        table.coerce(s, params).unwrap().value
    }

    #[test]
    fn literals_without_an_attribute() {
        let table = table();
        let any = CoerceParams::default();
        assert_eq!(value(&table, "12", &any), ResValue::new(ValueType::IntDec, 12));
        assert_eq!(value(&table, " 0x1F ", &any), ResValue::new(ValueType::IntHex, 0x1f));
        assert_eq!(
            value(&table, "#f00", &any),
            ResValue::new(ValueType::IntColorRgb4, 0xffff0000)
        );
        assert_eq!(
            value(&table, "TRUE", &any),
            ResValue::new(ValueType::IntBoolean, 0xFFFFFFFF)
        );
        assert_eq!(value(&table, "@null", &any), ResValue::new(ValueType::Reference, 0));
        assert_eq!(value(&table, "@empty", &any), ResValue::new(ValueType::Null, 1));

        let text = table.coerce("  hello   world ", &any).unwrap();
        assert_eq!(text.value.data_type, ValueType::String);
        assert_eq!(text.string.as_deref(), Some("hello world"));
    }

    #[test]
    fn references() {
        let table = table();
        let any = CoerceParams::default();
        assert_eq!(
            value(&table, "@string/title", &any),
            ResValue::new(
                ValueType::Reference,
                table.get_res_id("com.example", "string", "title", true).unwrap()
            )
        );
        assert_eq!(
            value(&table, "@android:string/ok", &any),
            ResValue::new(ValueType::Reference, 0x01040000)
        );
        assert_eq!(
            table.coerce("@android:string/hidden", &any),
            Err("Resource is not public.".to_string())
        );
        assert_eq!(
            value(&table, "@*android:string/hidden", &any),
            ResValue::new(ValueType::Reference, 0x01040001)
        );
        assert_eq!(
            value(&table, "?android:attr/gravity", &any),
            ResValue::new(ValueType::Attribute, 0x01010001)
        );
        assert_eq!(
            table.coerce("@string/missing", &any),
            Err("No resource found that matches the given name".to_string())
        );
    }

    #[test]
    fn attribute_formats_are_enforced() {
        let table = table();
        let size = attr(&table, "size");
        assert_eq!(value(&table, "16dp", &size).data_type, ValueType::Dimension);
        assert_eq!(
            table.coerce("hello", &size),
            Err("String types not allowed".to_string())
        );
        assert_eq!(
            table.coerce("true", &size),
            Err("Boolean types not allowed".to_string())
        );

        let color_only = CoerceParams {
            attr_type: format::COLOR,
            ..Default::default()
        };
        assert!(table
            .coerce("#12", &color_only)
            .unwrap_err()
            .starts_with("Color value not valid"));
    }

    #[test]
    fn enum_and_flag_symbols() {
        let table = table();
        let orientation = attr(&table, "orientation");
        assert_eq!(
            value(&table, "vertical", &orientation),
            ResValue::new(ValueType::IntDec, 1)
        );
        assert_eq!(
            table.coerce("diagonal", &orientation),
            Err("String types not allowed".to_string())
        );

        let gravity = CoerceParams {
            attr_id: 0x01010001,
            ..Default::default()
        };
        assert_eq!(
            value(&table, "top|left", &gravity),
            ResValue::new(ValueType::IntHex, 0x33)
        );
    }

    #[test]
    fn created_ids_resolve() {
        let mut table = table();
        let created = table
            .string_to_value(&pos(), "@+id/button", &CoerceParams::default())
            .unwrap();
        assert_eq!(created.value.data_type, ValueType::Reference);
        assert_eq!(
            Some(created.value.data),
            table.get_res_id("com.example", "id", "button", true)
        );
    }

    #[test]
    fn circular_symbols_are_cut() {
        let mut table = ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded));
        table
            .make_attribute(&pos(), "com.example", "mode", format::ENUM, "", false)
            .unwrap();
        table
            .add_bag(
                &pos(),
                "com.example",
                "attr",
                "mode",
                "",
                "mode",
                "mode",
                &[],
                &ConfigDescription::default(),
                false,
                false,
                format::ANY,
            )
            .unwrap();
        table.assign_resource_ids().unwrap();

        let mode = attr(&table, "mode");
        assert_eq!(
            table.coerce("mode", &mode),
            Err("String types not allowed".to_string())
        );
    }

    #[test]
    fn escaped_trailing_space_is_kept() {
        assert_eq!(trim_value("  a\\ ", false), "a\\ ");
        assert_eq!(trim_value(" a ", true), " a ");
    }
}

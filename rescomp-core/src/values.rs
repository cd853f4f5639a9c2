//! `Res_value` encoding and the literal parsers shared by values files and XML attributes.

use std::io::{Read, Write};

use anyhow::{anyhow, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueType {
    Null,
    Reference,
    Attribute,
    String,
    Float,
    Dimension,
    Fraction,
    DynamicReference,
    DynamicAttribute,
    IntDec,
    IntHex,
    IntBoolean,
    IntColorArgb8,
    IntColorRgb8,
    IntColorArgb4,
    IntColorRgb4,
}

impl ValueType {
    pub fn parse(from: u8) -> Option<ValueType> {
        match from {
            0x00 => Some(Self::Null),
            0x01 => Some(Self::Reference),
            0x02 => Some(Self::Attribute),
            0x03 => Some(Self::String),
            0x04 => Some(Self::Float),
            0x05 => Some(Self::Dimension),
            0x06 => Some(Self::Fraction),
            0x07 => Some(Self::DynamicReference),
            0x08 => Some(Self::DynamicAttribute),
            0x10 => Some(Self::IntDec),
            0x11 => Some(Self::IntHex),
            0x12 => Some(Self::IntBoolean),
            0x1c => Some(Self::IntColorArgb8),
            0x1d => Some(Self::IntColorRgb8),
            0x1e => Some(Self::IntColorArgb4),
            0x1f => Some(Self::IntColorRgb4),
            _ => None,
        }
    }

    pub fn save(&self) -> u8 {
        match self {
            Self::Null => 0x00,
            Self::Reference => 0x01,
            Self::Attribute => 0x02,
            Self::String => 0x03,
            Self::Float => 0x04,
            Self::Dimension => 0x05,
            Self::Fraction => 0x06,
            Self::DynamicReference => 0x07,
            Self::DynamicAttribute => 0x08,
            Self::IntDec => 0x10,
            Self::IntHex => 0x11,
            Self::IntBoolean => 0x12,
            Self::IntColorArgb8 => 0x1c,
            Self::IntColorRgb8 => 0x1d,
            Self::IntColorArgb4 => 0x1e,
            Self::IntColorRgb4 => 0x1f,
        }
    }
}

/// A typed value as stored in the resource table and in binary XML attributes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ResValue {
    pub data_type: ValueType,
    pub data: u32,
}

impl ResValue {
    pub const fn new(data_type: ValueType, data: u32) -> Self {
        Self { data_type, data }
    }

    pub const fn null() -> Self {
        Self::new(ValueType::Null, 0)
    }

    pub fn write(&self, to: &mut impl Write) -> Result<()> {
        to.write_u16::<LE>(8)?;
        to.write_u8(0)?;
        to.write_u8(self.data_type.save())?;
        to.write_u32::<LE>(self.data)?;
        Ok(())
    }

    pub fn read(from: &mut impl Read) -> Result<Self> {
        let _size = from.read_u16::<LE>()?;
        let _res0 = from.read_u8()?;
        let raw_type = from.read_u8()?;
        let data = from.read_u32::<LE>()?;
        let data_type = ValueType::parse(raw_type)
            .ok_or_else(|| anyhow!("Value type {raw_type:#x} was not recognised"))?;
        Ok(Self { data_type, data })
    }
}

/// `^type` format bits of an attribute resource.
pub mod format {
    pub const ANY: u32 = 0x0000FFFF;
    pub const REFERENCE: u32 = 1 << 0;
    pub const STRING: u32 = 1 << 1;
    pub const INTEGER: u32 = 1 << 2;
    pub const BOOLEAN: u32 = 1 << 3;
    pub const COLOR: u32 = 1 << 4;
    pub const FLOAT: u32 = 1 << 5;
    pub const DIMENSION: u32 = 1 << 6;
    pub const FRACTION: u32 = 1 << 7;
    pub const ENUM: u32 = 1 << 16;
    pub const FLAGS: u32 = 1 << 17;

    pub const L10N_NOT_REQUIRED: u32 = 0;
    pub const L10N_SUGGESTED: u32 = 1;

    pub(crate) const FORMAT_NAMES: &[(&str, u32)] = &[
        ("reference", REFERENCE),
        ("string", STRING),
        ("integer", INTEGER),
        ("boolean", BOOLEAN),
        ("color", COLOR),
        ("float", FLOAT),
        ("dimension", DIMENSION),
        ("fraction", FRACTION),
        ("enum", ENUM),
        ("flags", FLAGS),
    ];

    pub(crate) const L10N_NAMES: &[(&str, u32)] = &[
        ("suggested", L10N_SUGGESTED),
        ("unsuggested", L10N_NOT_REQUIRED),
    ];
}

// Bag keys with compiler-reserved IDs.
pub const ATTR_TYPE: u32 = 0x01000000;
pub const ATTR_MIN: u32 = 0x01000001;
pub const ATTR_MAX: u32 = 0x01000002;
pub const ATTR_L10N: u32 = 0x01000003;
pub const ATTR_OTHER: u32 = 0x01000004;
pub const ATTR_ZERO: u32 = 0x01000005;
pub const ATTR_ONE: u32 = 0x01000006;
pub const ATTR_TWO: u32 = 0x01000007;
pub const ATTR_FEW: u32 = 0x01000008;
pub const ATTR_MANY: u32 = 0x01000009;
pub const ATTR_INDEX_BASE: u32 = 0x02000000;

const INTERNAL_NAMES: &[(&str, u32)] = &[
    ("^type", ATTR_TYPE),
    ("^min", ATTR_MIN),
    ("^max", ATTR_MAX),
    ("^l10n", ATTR_L10N),
    ("^other", ATTR_OTHER),
    ("^zero", ATTR_ZERO),
    ("^one", ATTR_ONE),
    ("^two", ATTR_TWO),
    ("^few", ATTR_FEW),
    ("^many", ATTR_MANY),
];

/// Resolves a `^name` bag key to its reserved ID.
pub fn internal_id(name: &str) -> Option<u32> {
    if let Some((_, id)) = INTERNAL_NAMES.iter().find(|(n, _)| *n == name) {
        return Some(*id);
    }
    let index: u32 = name.strip_prefix("^index_")?.parse().ok()?;
    if index > 0xFFFF {
        return None;
    }
    Some(ATTR_INDEX_BASE | index)
}

/// Parses a `|` separated list of names from `table` into a bitmask.
pub fn parse_flags(value: &str, table: &[(&str, u32)]) -> Option<u32> {
    let mut result = 0;
    for name in value.trim().split('|') {
        let name = name.trim();
        let (_, bits) = table.iter().find(|(n, _)| *n == name)?;
        result |= bits;
    }
    Some(result)
}

pub fn parse_format(value: &str) -> Option<u32> {
    parse_flags(value, format::FORMAT_NAMES)
}

pub const COMPLEX_UNIT_SHIFT: u32 = 0;
pub const COMPLEX_UNIT_MASK: u32 = 0xf;
pub const COMPLEX_RADIX_SHIFT: u32 = 4;
pub const COMPLEX_RADIX_MASK: u32 = 0x3;
pub const COMPLEX_MANTISSA_SHIFT: u32 = 8;
pub const COMPLEX_MANTISSA_MASK: u32 = 0xffffff;

const COMPLEX_RADIX_23P0: u32 = 0;
const COMPLEX_RADIX_16P7: u32 = 1;
const COMPLEX_RADIX_8P15: u32 = 2;
const COMPLEX_RADIX_0P23: u32 = 3;

pub const COMPLEX_UNIT_PX: u32 = 0;
pub const COMPLEX_UNIT_DIP: u32 = 1;
pub const COMPLEX_UNIT_SP: u32 = 2;
pub const COMPLEX_UNIT_PT: u32 = 3;
pub const COMPLEX_UNIT_IN: u32 = 4;
pub const COMPLEX_UNIT_MM: u32 = 5;
pub const COMPLEX_UNIT_FRACTION: u32 = 0;
pub const COMPLEX_UNIT_FRACTION_PARENT: u32 = 1;

struct Unit {
    name: &'static str,
    data_type: ValueType,
    unit: u32,
    scale: f32,
}

const UNITS: &[Unit] = &[
    Unit { name: "px", data_type: ValueType::Dimension, unit: COMPLEX_UNIT_PX, scale: 1.0 },
    Unit { name: "dip", data_type: ValueType::Dimension, unit: COMPLEX_UNIT_DIP, scale: 1.0 },
    Unit { name: "dp", data_type: ValueType::Dimension, unit: COMPLEX_UNIT_DIP, scale: 1.0 },
    Unit { name: "sp", data_type: ValueType::Dimension, unit: COMPLEX_UNIT_SP, scale: 1.0 },
    Unit { name: "pt", data_type: ValueType::Dimension, unit: COMPLEX_UNIT_PT, scale: 1.0 },
    Unit { name: "in", data_type: ValueType::Dimension, unit: COMPLEX_UNIT_IN, scale: 1.0 },
    Unit { name: "mm", data_type: ValueType::Dimension, unit: COMPLEX_UNIT_MM, scale: 1.0 },
    Unit { name: "%", data_type: ValueType::Fraction, unit: COMPLEX_UNIT_FRACTION, scale: 1.0 / 100.0 },
    Unit { name: "%p", data_type: ValueType::Fraction, unit: COMPLEX_UNIT_FRACTION_PARENT, scale: 1.0 / 100.0 },
];

/// Packs a float into the mantissa/radix part of a complex value, choosing the radix that keeps
/// the most precision.
pub fn float_to_complex(value: f32) -> u32 {
    let neg = value < 0.0;
    let magnitude = if neg { -value } else { value };
    let bits = (magnitude * (1u32 << 23) as f32 + 0.5) as u64;

    let (radix, shift) = if bits & 0x7fffff == 0 {
        (COMPLEX_RADIX_23P0, 23)
    } else if bits & 0xffff_ffff_ff80_0000 == 0 {
        (COMPLEX_RADIX_0P23, 0)
    } else if bits & 0xffff_ffff_8000_0000 == 0 {
        (COMPLEX_RADIX_8P15, 8)
    } else if bits & 0xffff_ff80_0000_0000 == 0 {
        (COMPLEX_RADIX_16P7, 16)
    } else {
        (COMPLEX_RADIX_23P0, 23)
    };

    let mut mantissa = ((bits >> shift) as u32) & COMPLEX_MANTISSA_MASK;
    if neg {
        mantissa = mantissa.wrapping_neg() & COMPLEX_MANTISSA_MASK;
    }
    (radix << COMPLEX_RADIX_SHIFT) | (mantissa << COMPLEX_MANTISSA_SHIFT)
}

/// Inverse of `float_to_complex`, ignoring the unit bits.
pub fn complex_to_float(complex: u32) -> f32 {
    const RADIX_MULTS: [f32; 4] = [
        1.0 / (1u32 << 0) as f32,
        1.0 / (1u32 << 7) as f32,
        1.0 / (1u32 << 15) as f32,
        1.0 / (1u32 << 23) as f32,
    ];
    let mantissa = (complex & (COMPLEX_MANTISSA_MASK << COMPLEX_MANTISSA_SHIFT)) as i32;
    let radix = (complex >> COMPLEX_RADIX_SHIFT) & COMPLEX_RADIX_MASK;
    (mantissa >> COMPLEX_MANTISSA_SHIFT) as f32 * RADIX_MULTS[radix as usize]
}

/// Formats a dimension or fraction for display, e.g. `16.0dp` or `50.0%`.
pub fn format_complex(value: ResValue) -> String {
    let unit = value.data & COMPLEX_UNIT_MASK;
    let number = complex_to_float(value.data);
    if value.data_type == ValueType::Fraction {
        let suffix = if unit == COMPLEX_UNIT_FRACTION_PARENT { "%p" } else { "%" };
        return format!("{:?}{suffix}", number * 100.0);
    }
    let suffix = match unit {
        COMPLEX_UNIT_PX => "px",
        COMPLEX_UNIT_DIP => "dp",
        COMPLEX_UNIT_SP => "sp",
        COMPLEX_UNIT_PT => "pt",
        COMPLEX_UNIT_IN => "in",
        COMPLEX_UNIT_MM => "mm",
        _ => "",
    };
    format!("{number:?}{suffix}")
}

pub(crate) fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

/// Parses a decimal (`-12`) or hex (`0x1F`) integer.
pub fn string_to_int(s: &str) -> Option<ResValue> {
    let s = s.trim_matches(is_space);
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    if let Some(hex) = digits.strip_prefix("0x") {
        if neg || hex.is_empty() || !hex.bytes().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        return Some(ResValue::new(ValueType::IntHex, value));
    }

    if !digits.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i64 = digits.parse().ok()?;
    let value = if neg { -value } else { value };
    let value: i32 = value.try_into().ok()?;
    Some(ResValue::new(ValueType::IntDec, value as u32))
}

// Splits the longest prefix strtof would accept.
fn split_float_prefix(s: &str) -> (&str, &str) {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mantissa_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i == mantissa_start || &s[mantissa_start..i] == "." {
        return ("", s);
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let digits_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > digits_start {
            i = j;
        }
    }
    (&s[..i], &s[i..])
}

/// Parses a float, or a float with a unit suffix into a dimension or fraction.
pub fn string_to_float(s: &str) -> Option<ResValue> {
    let s = s.trim_start_matches(is_space);
    let first = s.chars().next()?;
    if !(first.is_ascii_digit() || first == '.' || first == '-' || first == '+') {
        return None;
    }

    let (number, rest) = split_float_prefix(s);
    let value: f32 = number.parse().ok()?;
    let rest_trimmed = rest.trim_matches(is_space);
    if rest_trimmed.is_empty() {
        return Some(ResValue::new(ValueType::Float, value.to_bits()));
    }

    // A unit must directly follow the number.
    if rest.starts_with(is_space) {
        return None;
    }
    let unit = UNITS.iter().find(|unit| unit.name == rest_trimmed)?;
    let data = float_to_complex(value * unit.scale) | (unit.unit << COMPLEX_UNIT_SHIFT);
    Some(ResValue::new(unit.data_type, data))
}

fn hex_digit(c: u8) -> Option<u32> {
    (c as char).to_digit(16)
}

/// Parses `#RGB`, `#ARGB`, `#RRGGBB` or `#AARRGGBB`. Returns `None` for anything that is not
/// a well-formed color, including strings that do not start with `#`.
pub fn parse_color(s: &str) -> Option<ResValue> {
    let s = s.trim_matches(is_space);
    let digits = s.strip_prefix('#')?.as_bytes();
    let values: Vec<u32> = digits
        .iter()
        .map(|c| hex_digit(*c))
        .collect::<Option<Vec<u32>>>()?;

    let (data_type, color) = match values.as_slice() {
        [r, g, b] => (
            ValueType::IntColorRgb4,
            0xff000000 | (r << 20) | (r << 16) | (g << 12) | (g << 8) | (b << 4) | b,
        ),
        [a, r, g, b] => (
            ValueType::IntColorArgb4,
            (a << 28) | (a << 24) | (r << 20) | (r << 16) | (g << 12) | (g << 8) | (b << 4) | b,
        ),
        [r1, r2, g1, g2, b1, b2] => (
            ValueType::IntColorRgb8,
            0xff000000 | (r1 << 20) | (r2 << 16) | (g1 << 12) | (g2 << 8) | (b1 << 4) | b2,
        ),
        [a1, a2, r1, r2, g1, g2, b1, b2] => (
            ValueType::IntColorArgb8,
            (a1 << 28)
                | (a2 << 24)
                | (r1 << 20)
                | (r2 << 16)
                | (g1 << 12)
                | (g2 << 8)
                | (b1 << 4)
                | b2,
        ),
        _ => return None,
    };
    Some(ResValue::new(data_type, color))
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim_matches(is_space) {
        "true" | "TRUE" | "True" => Some(true),
        "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn is_space16(c: u16) -> bool {
    c < 128 && is_space(c as u8 as char)
}

/// Processes the escapes and quoting of a string literal.
///
/// Outside quotes, runs of whitespace collapse to one space and a bare apostrophe is an
/// error. `preserve_spaces` turns off quoting and whitespace handling, leaving only escapes.
pub fn collect_string(s: &str, preserve_spaces: bool) -> Result<String, String> {
    let src: Vec<u16> = s.encode_utf16().collect();
    let mut out: Vec<u16> = Vec::with_capacity(src.len());
    let mut quoted: u16 = 0;
    let mut p = 0;
    let at = |i: usize| src.get(i).copied().unwrap_or(0);

    while p < src.len() {
        let c = src[p];
        if c == b'\\' as u16 {
            p += 1;
            if p >= src.len() {
                break;
            }
            match src[p] as u8 {
                b't' => out.push(b'\t' as u16),
                b'n' => out.push(b'\n' as u16),
                b'#' | b'@' | b'?' | b'"' | b'\'' | b'\\' => out.push(src[p]),
                b'u' => {
                    let mut chr: u16 = 0;
                    let mut digits = 0;
                    while digits < 4 && at(p + 1) != 0 {
                        p += 1;
                        digits += 1;
                        let digit = if src[p] < 128 {
                            hex_digit(src[p] as u8)
                        } else {
                            None
                        };
                        match digit {
                            Some(d) => chr = (chr << 4) | d as u16,
                            None => {
                                return Err("Bad character in \\u unicode escape sequence".into())
                            }
                        }
                    }
                    out.push(chr);
                }
                // Unknown escapes are dropped.
                _ => {}
            }
            p += 1;
            continue;
        }

        if !preserve_spaces {
            if c == b'"' as u16 && (quoted == 0 || quoted == c) {
                quoted = if quoted == 0 { c } else { 0 };
                p += 1;
                continue;
            }
            if c == b'\'' as u16 && (quoted == 0 || quoted == c) {
                return Err("Apostrophe not preceded by \\".into());
            }
            if quoted == 0 && is_space16(c) && (c != b' ' as u16 || is_space16(at(p + 1))) {
                out.push(b' ' as u16);
                p += 1;
                while p < src.len() && is_space16(src[p]) {
                    p += 1;
                }
                continue;
            }
        }

        out.push(c);
        p += 1;
    }

    Ok(String::from_utf16_lossy(&out))
}

/// Length of a string in UTF-16 code units, the unit used by style spans.
pub fn utf16_len(s: &str) -> u32 {
    s.encode_utf16().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integers() {
        assert_eq!(string_to_int("42"), Some(ResValue::new(ValueType::IntDec, 42)));
        assert_eq!(
            string_to_int("-1"),
            Some(ResValue::new(ValueType::IntDec, 0xFFFFFFFF))
        );
        assert_eq!(
            string_to_int("0x7f"),
            Some(ResValue::new(ValueType::IntHex, 0x7f))
        );
        assert_eq!(string_to_int("0x"), None);
        assert_eq!(string_to_int("-0x1"), None);
        assert_eq!(string_to_int("2147483648"), None);
        assert_eq!(string_to_int("12a"), None);
    }

    #[test]
    fn parses_dimensions() {
        let value = string_to_float("16dp").unwrap();
        assert_eq!(value.data_type, ValueType::Dimension);
        assert_eq!(value.data & COMPLEX_UNIT_MASK, COMPLEX_UNIT_DIP);
        assert_eq!(complex_to_float(value.data), 16.0);
        assert_eq!(format_complex(value), "16.0dp");

        let half = string_to_float("0.5px").unwrap();
        assert_eq!(complex_to_float(half.data), 0.5);

        let negative = string_to_float("-2.5sp").unwrap();
        assert_eq!(complex_to_float(negative.data), -2.5);

        assert!(string_to_float("16 dp").is_none());
        assert!(string_to_float("16furlongs").is_none());
    }

    #[test]
    fn parses_fractions_and_floats() {
        let fraction = string_to_float("50%").unwrap();
        assert_eq!(fraction.data_type, ValueType::Fraction);
        assert_eq!(complex_to_float(fraction.data), 0.5);

        let parent = string_to_float("25%p").unwrap();
        assert_eq!(parent.data & COMPLEX_UNIT_MASK, COMPLEX_UNIT_FRACTION_PARENT);

        let float = string_to_float("1.5").unwrap();
        assert_eq!(float, ResValue::new(ValueType::Float, 1.5f32.to_bits()));
    }

    #[test]
    fn parses_colors() {
        assert_eq!(
            parse_color("#f00"),
            Some(ResValue::new(ValueType::IntColorRgb4, 0xffff0000))
        );
        assert_eq!(
            parse_color("#80ff0000"),
            Some(ResValue::new(ValueType::IntColorArgb8, 0x80ff0000))
        );
        assert_eq!(
            parse_color("#123456"),
            Some(ResValue::new(ValueType::IntColorRgb8, 0xff123456))
        );
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#ggg"), None);
    }

    #[test]
    fn collects_escapes_and_quotes() {
        assert_eq!(collect_string("a  b\n c", false).unwrap(), "a b c");
        assert_eq!(collect_string("\"a  b\"", false).unwrap(), "a  b");
        assert_eq!(collect_string("don\\'t", false).unwrap(), "don't");
        assert_eq!(collect_string("line\\nbreak", false).unwrap(), "line\nbreak");
        assert_eq!(collect_string("\\u0041BC", false).unwrap(), "ABC");
        assert_eq!(collect_string("\\@home", false).unwrap(), "@home");
        assert_eq!(
            collect_string("don't", false).unwrap_err(),
            "Apostrophe not preceded by \\"
        );
        assert!(collect_string("\\u00zz", false).is_err());
        assert_eq!(collect_string("a  'b'", true).unwrap(), "a  'b'");
    }

    #[test]
    fn resolves_internal_names() {
        assert_eq!(internal_id("^type"), Some(ATTR_TYPE));
        assert_eq!(internal_id("^other"), Some(ATTR_OTHER));
        assert_eq!(internal_id("^index_3"), Some(ATTR_INDEX_BASE | 3));
        assert_eq!(internal_id("type"), None);
        assert!(crate::is_internal_id(ATTR_TYPE));
        assert!(!crate::is_internal_id(0x7f010000));
    }

    #[test]
    fn parses_format_lists() {
        assert_eq!(
            parse_format("reference|color"),
            Some(format::REFERENCE | format::COLOR)
        );
        assert_eq!(parse_format("enum"), Some(format::ENUM));
        assert_eq!(parse_format("colour"), None);
    }
}

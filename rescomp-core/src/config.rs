//! Device configuration qualifiers (`fr-rCA-land-hdpi-v13` and friends) and their binary
//! `ResTable_config` form.

use std::{
    cmp::Ordering,
    fmt,
    io::{Read, Write},
};

use anyhow::{anyhow, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};

/// Size of the serialized configuration, including its leading size field.
pub const CONFIG_SIZE: u32 = 64;

pub const ORIENTATION_PORT: u8 = 1;
pub const ORIENTATION_LAND: u8 = 2;
pub const ORIENTATION_SQUARE: u8 = 3;

pub const TOUCHSCREEN_NOTOUCH: u8 = 1;
pub const TOUCHSCREEN_STYLUS: u8 = 2;
pub const TOUCHSCREEN_FINGER: u8 = 3;

pub const DENSITY_LOW: u16 = 120;
pub const DENSITY_MEDIUM: u16 = 160;
pub const DENSITY_TV: u16 = 213;
pub const DENSITY_HIGH: u16 = 240;
pub const DENSITY_XHIGH: u16 = 320;
pub const DENSITY_XXHIGH: u16 = 480;
pub const DENSITY_XXXHIGH: u16 = 640;
pub const DENSITY_ANY: u16 = 0xfffe;
pub const DENSITY_NONE: u16 = 0xffff;

pub const KEYBOARD_NOKEYS: u8 = 1;
pub const KEYBOARD_QWERTY: u8 = 2;
pub const KEYBOARD_12KEY: u8 = 3;

pub const NAVIGATION_NONAV: u8 = 1;
pub const NAVIGATION_DPAD: u8 = 2;
pub const NAVIGATION_TRACKBALL: u8 = 3;
pub const NAVIGATION_WHEEL: u8 = 4;

pub const MASK_KEYSHIDDEN: u8 = 0x03;
pub const KEYSHIDDEN_NO: u8 = 0x01;
pub const KEYSHIDDEN_YES: u8 = 0x02;
pub const KEYSHIDDEN_SOFT: u8 = 0x03;

pub const MASK_NAVHIDDEN: u8 = 0x0c;
pub const NAVHIDDEN_NO: u8 = 0x04;
pub const NAVHIDDEN_YES: u8 = 0x08;

pub const MASK_SCREENSIZE: u8 = 0x0f;
pub const SCREENSIZE_SMALL: u8 = 0x01;
pub const SCREENSIZE_NORMAL: u8 = 0x02;
pub const SCREENSIZE_LARGE: u8 = 0x03;
pub const SCREENSIZE_XLARGE: u8 = 0x04;

pub const MASK_SCREENLONG: u8 = 0x30;
pub const SCREENLONG_NO: u8 = 0x10;
pub const SCREENLONG_YES: u8 = 0x20;

pub const MASK_LAYOUTDIR: u8 = 0xC0;
pub const LAYOUTDIR_LTR: u8 = 0x40;
pub const LAYOUTDIR_RTL: u8 = 0x80;

pub const MASK_SCREENROUND: u8 = 0x03;
pub const SCREENROUND_NO: u8 = 0x01;
pub const SCREENROUND_YES: u8 = 0x02;

pub const MASK_WIDE_COLOR_GAMUT: u8 = 0x03;
pub const WIDE_COLOR_GAMUT_NO: u8 = 0x01;
pub const WIDE_COLOR_GAMUT_YES: u8 = 0x02;
pub const MASK_HDR: u8 = 0x0c;
pub const HDR_NO: u8 = 0x04;
pub const HDR_YES: u8 = 0x08;

pub const MASK_UI_MODE_TYPE: u8 = 0x0f;
pub const UI_MODE_TYPE_DESK: u8 = 0x02;
pub const UI_MODE_TYPE_CAR: u8 = 0x03;
pub const UI_MODE_TYPE_TELEVISION: u8 = 0x04;
pub const UI_MODE_TYPE_APPLIANCE: u8 = 0x05;
pub const UI_MODE_TYPE_WATCH: u8 = 0x06;
pub const UI_MODE_TYPE_VR_HEADSET: u8 = 0x07;
pub const MASK_UI_MODE_NIGHT: u8 = 0x30;
pub const UI_MODE_NIGHT_NO: u8 = 0x10;
pub const UI_MODE_NIGHT_YES: u8 = 0x20;

pub const MNC_ZERO: u16 = 0xffff;

// Axis bits returned by `diff`, also used as typeSpec flags.
pub const CONFIG_MCC: u32 = 0x0001;
pub const CONFIG_MNC: u32 = 0x0002;
pub const CONFIG_LOCALE: u32 = 0x0004;
pub const CONFIG_TOUCHSCREEN: u32 = 0x0008;
pub const CONFIG_KEYBOARD: u32 = 0x0010;
pub const CONFIG_KEYBOARD_HIDDEN: u32 = 0x0020;
pub const CONFIG_NAVIGATION: u32 = 0x0040;
pub const CONFIG_ORIENTATION: u32 = 0x0080;
pub const CONFIG_DENSITY: u32 = 0x0100;
pub const CONFIG_SCREEN_SIZE: u32 = 0x0200;
pub const CONFIG_VERSION: u32 = 0x0400;
pub const CONFIG_SCREEN_LAYOUT: u32 = 0x0800;
pub const CONFIG_UI_MODE: u32 = 0x1000;
pub const CONFIG_SMALLEST_SCREEN_SIZE: u32 = 0x2000;
pub const CONFIG_LAYOUTDIR: u32 = 0x4000;
pub const CONFIG_SCREEN_ROUND: u32 = 0x8000;
pub const CONFIG_COLOR_MODE: u32 = 0x10000;

const SDK_DONUT: u16 = 4;
const SDK_FROYO: u16 = 8;
const SDK_HONEYCOMB_MR2: u16 = 13;
const SDK_JELLY_BEAN_MR1: u16 = 17;
const SDK_LOLLIPOP: u16 = 21;
const SDK_MNC: u16 = 23;
const SDK_O: u16 = 26;

/// One device-configuration variant a resource value can be specialised for.
///
/// Equality is exact field equality. The derived-by-hand `Ord` is the total order used for map
/// keys, in which the default (all-zero) configuration always sorts first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct ConfigDescription {
    pub mcc: u16,
    pub mnc: u16,
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
    pub keyboard: u8,
    pub navigation: u8,
    pub input_flags: u8,
    pub screen_width: u16,
    pub screen_height: u16,
    pub sdk_version: u16,
    pub minor_version: u16,
    pub screen_layout: u8,
    pub ui_mode: u8,
    pub smallest_screen_width_dp: u16,
    pub screen_width_dp: u16,
    pub screen_height_dp: u16,
    pub locale_script: [u8; 4],
    pub locale_variant: [u8; 8],
    pub screen_layout2: u8,
    pub color_mode: u8,
}

impl ConfigDescription {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Parses a dash-separated qualifier list such as `fr-rCA-land` or `b+sr+Latn-hdpi`.
    /// Returns `None` if a part is not recognised or appears out of order.
    pub fn parse(qualifiers: &str) -> Option<Self> {
        let mut config = Self::default();
        if qualifiers.is_empty() {
            return Some(config);
        }

        let parts: Vec<String> = qualifiers
            .split('-')
            .map(|part| part.to_ascii_lowercase())
            .collect();
        let mut idx = 0;

        for parser in [parse_mcc, parse_mnc] {
            if idx < parts.len() && parser(&parts[idx], &mut config) {
                idx += 1;
            }
        }
        idx = parse_locale(&parts, idx, &mut config)?;

        const REMAINING: &[fn(&str, &mut ConfigDescription) -> bool] = &[
            parse_layout_direction,
            parse_smallest_screen_width_dp,
            parse_screen_width_dp,
            parse_screen_height_dp,
            parse_screen_layout_size,
            parse_screen_layout_long,
            parse_screen_round,
            parse_wide_color_gamut,
            parse_hdr,
            parse_orientation,
            parse_ui_mode_type,
            parse_ui_mode_night,
            parse_density,
            parse_touchscreen,
            parse_keys_hidden,
            parse_keyboard,
            parse_nav_hidden,
            parse_navigation,
            parse_screen_size,
            parse_version,
        ];
        for parser in REMAINING {
            if idx < parts.len() && parser(&parts[idx], &mut config) {
                idx += 1;
            }
        }

        if idx != parts.len() {
            return None;
        }

        config.apply_version_for_compatibility();
        Some(config)
    }

    /// Parses a locale written the legacy filter way (`en_US`) or as a plain qualifier.
    pub fn parse_locale_filter(value: &str) -> Option<Self> {
        if let Some((lang, region)) = value.split_once('_') {
            let mut config = Self::default();
            if !is_alpha(lang) || !(2..=3).contains(&lang.len()) || !(2..=3).contains(&region.len())
            {
                return None;
            }
            config.set_language(lang);
            config.set_region(region);
            return Some(config);
        }
        Self::parse(value)
    }

    // Raises the SDK version to the minimum that understands the qualifiers in use.
    fn apply_version_for_compatibility(&mut self) {
        let min_sdk = if (self.ui_mode & MASK_UI_MODE_TYPE) == UI_MODE_TYPE_VR_HEADSET
            || self.color_mode & MASK_WIDE_COLOR_GAMUT != 0
            || self.color_mode & MASK_HDR != 0
        {
            SDK_O
        } else if self.screen_layout2 & MASK_SCREENROUND != 0 {
            SDK_MNC
        } else if self.density == DENSITY_ANY {
            SDK_LOLLIPOP
        } else if self.screen_layout & MASK_LAYOUTDIR != 0 {
            SDK_JELLY_BEAN_MR1
        } else if self.smallest_screen_width_dp != 0
            || self.screen_width_dp != 0
            || self.screen_height_dp != 0
        {
            SDK_HONEYCOMB_MR2
        } else if self.ui_mode & (MASK_UI_MODE_TYPE | MASK_UI_MODE_NIGHT) != 0 {
            SDK_FROYO
        } else if self.screen_layout & (MASK_SCREENSIZE | MASK_SCREENLONG) != 0 || self.density != 0
        {
            SDK_DONUT
        } else {
            0
        };

        if min_sdk > self.sdk_version {
            self.sdk_version = min_sdk;
        }
    }

    pub fn set_language(&mut self, language: &str) {
        self.language = pack_language_or_region(&language.to_ascii_lowercase(), b'a');
    }

    pub fn set_region(&mut self, region: &str) {
        self.country = pack_language_or_region(&region.to_ascii_uppercase(), b'0');
    }

    fn set_script(&mut self, script: &str) {
        let mut bytes = [0u8; 4];
        for (i, c) in script.bytes().take(4).enumerate() {
            bytes[i] = if i == 0 {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
        }
        self.locale_script = bytes;
    }

    fn set_variant(&mut self, variant: &str) {
        let mut bytes = [0u8; 8];
        for (i, c) in variant.bytes().take(8).enumerate() {
            bytes[i] = c.to_ascii_lowercase();
        }
        self.locale_variant = bytes;
    }

    pub fn language(&self) -> String {
        unpack_language_or_region(self.language, b'a')
    }

    pub fn region(&self) -> String {
        unpack_language_or_region(self.country, b'0')
    }

    fn script(&self) -> String {
        trim_nul(&self.locale_script)
    }

    fn variant(&self) -> String {
        trim_nul(&self.locale_variant)
    }

    /// BCP-47 style locale (`fr-CA`, `sr-Latn`), empty for the default locale.
    pub fn locale(&self) -> String {
        let mut out = self.language();
        if out.is_empty() {
            return out;
        }
        for part in [self.script(), self.region(), self.variant()] {
            if !part.is_empty() {
                out.push('-');
                out.push_str(&part);
            }
        }
        out
    }

    /// A copy of this configuration with only the locale axes kept.
    pub fn locale_only(&self) -> Self {
        Self {
            language: self.language,
            country: self.country,
            locale_script: self.locale_script,
            locale_variant: self.locale_variant,
            ..Self::default()
        }
    }

    fn compare_locales(&self, other: &Self) -> Ordering {
        self.language
            .cmp(&other.language)
            .then(self.country.cmp(&other.country))
            .then(self.locale_script.cmp(&other.locale_script))
            .then(self.locale_variant.cmp(&other.locale_variant))
    }

    fn input(&self) -> u32 {
        self.keyboard as u32 | (self.navigation as u32) << 8 | (self.input_flags as u32) << 16
    }

    /// Orders configurations the way a reader of qualifier directory names would expect.
    /// Only used for string pool locality.
    pub fn compare_logical(&self, o: &Self) -> Ordering {
        self.mcc
            .cmp(&o.mcc)
            .then(self.mnc.cmp(&o.mnc))
            .then_with(|| self.compare_locales(o))
            .then((self.screen_layout & MASK_LAYOUTDIR).cmp(&(o.screen_layout & MASK_LAYOUTDIR)))
            .then(self.smallest_screen_width_dp.cmp(&o.smallest_screen_width_dp))
            .then(self.screen_width_dp.cmp(&o.screen_width_dp))
            .then(self.screen_height_dp.cmp(&o.screen_height_dp))
            .then(self.screen_width.cmp(&o.screen_width))
            .then(self.screen_height.cmp(&o.screen_height))
            .then(self.density.cmp(&o.density))
            .then(self.orientation.cmp(&o.orientation))
            .then(self.touchscreen.cmp(&o.touchscreen))
            .then(self.input().cmp(&o.input()))
            .then(self.screen_layout.cmp(&o.screen_layout))
            .then(self.screen_layout2.cmp(&o.screen_layout2))
            .then(self.color_mode.cmp(&o.color_mode))
            .then(self.ui_mode.cmp(&o.ui_mode))
            .then(self.sdk_version.cmp(&o.sdk_version))
            .then(self.minor_version.cmp(&o.minor_version))
    }

    /// Bitmask of the `CONFIG_*` axes on which the two configurations differ.
    pub fn diff(&self, o: &Self) -> u32 {
        let mut diffs = 0;
        if self.mcc != o.mcc {
            diffs |= CONFIG_MCC;
        }
        if self.mnc != o.mnc {
            diffs |= CONFIG_MNC;
        }
        if self.orientation != o.orientation {
            diffs |= CONFIG_ORIENTATION;
        }
        if self.density != o.density {
            diffs |= CONFIG_DENSITY;
        }
        if self.touchscreen != o.touchscreen {
            diffs |= CONFIG_TOUCHSCREEN;
        }
        if (self.input_flags ^ o.input_flags) & (MASK_KEYSHIDDEN | MASK_NAVHIDDEN) != 0 {
            diffs |= CONFIG_KEYBOARD_HIDDEN;
        }
        if self.keyboard != o.keyboard {
            diffs |= CONFIG_KEYBOARD;
        }
        if self.navigation != o.navigation {
            diffs |= CONFIG_NAVIGATION;
        }
        if self.screen_width != o.screen_width || self.screen_height != o.screen_height {
            diffs |= CONFIG_SCREEN_SIZE;
        }
        if self.sdk_version != o.sdk_version || self.minor_version != o.minor_version {
            diffs |= CONFIG_VERSION;
        }
        if (self.screen_layout & MASK_LAYOUTDIR) != (o.screen_layout & MASK_LAYOUTDIR) {
            diffs |= CONFIG_LAYOUTDIR;
        }
        if (self.screen_layout & !MASK_LAYOUTDIR) != (o.screen_layout & !MASK_LAYOUTDIR) {
            diffs |= CONFIG_SCREEN_LAYOUT;
        }
        if (self.screen_layout2 & MASK_SCREENROUND) != (o.screen_layout2 & MASK_SCREENROUND) {
            diffs |= CONFIG_SCREEN_ROUND;
        }
        if (self.color_mode & (MASK_WIDE_COLOR_GAMUT | MASK_HDR))
            != (o.color_mode & (MASK_WIDE_COLOR_GAMUT | MASK_HDR))
        {
            diffs |= CONFIG_COLOR_MODE;
        }
        if self.ui_mode != o.ui_mode {
            diffs |= CONFIG_UI_MODE;
        }
        if self.smallest_screen_width_dp != o.smallest_screen_width_dp {
            diffs |= CONFIG_SMALLEST_SCREEN_SIZE;
        }
        if self.screen_width_dp != o.screen_width_dp || self.screen_height_dp != o.screen_height_dp
        {
            diffs |= CONFIG_SCREEN_SIZE;
        }
        if self.compare_locales(o) != Ordering::Equal {
            diffs |= CONFIG_LOCALE;
        }
        diffs
    }

    /// Writes the 64 byte `ResTable_config` structure.
    pub fn write(&self, to: &mut impl Write) -> Result<()> {
        to.write_u32::<LE>(CONFIG_SIZE)?;
        to.write_u16::<LE>(self.mcc)?;
        to.write_u16::<LE>(self.mnc)?;
        to.write_all(&self.language)?;
        to.write_all(&self.country)?;
        to.write_u8(self.orientation)?;
        to.write_u8(self.touchscreen)?;
        to.write_u16::<LE>(self.density)?;
        to.write_u8(self.keyboard)?;
        to.write_u8(self.navigation)?;
        to.write_u8(self.input_flags)?;
        to.write_u8(0)?;
        to.write_u16::<LE>(self.screen_width)?;
        to.write_u16::<LE>(self.screen_height)?;
        to.write_u16::<LE>(self.sdk_version)?;
        to.write_u16::<LE>(self.minor_version)?;
        to.write_u8(self.screen_layout)?;
        to.write_u8(self.ui_mode)?;
        to.write_u16::<LE>(self.smallest_screen_width_dp)?;
        to.write_u16::<LE>(self.screen_width_dp)?;
        to.write_u16::<LE>(self.screen_height_dp)?;
        to.write_all(&self.locale_script)?;
        to.write_all(&self.locale_variant)?;
        to.write_u8(self.screen_layout2)?;
        to.write_u8(self.color_mode)?;
        to.write_u16::<LE>(0)?;
        // Fields added by later platform versions are left zeroed.
        to.write_all(&[0u8; 12])?;
        Ok(())
    }

    /// Reads a `ResTable_config`, skipping any fields beyond the ones known here.
    pub fn read(from: &mut impl Read) -> Result<Self> {
        let size = from.read_u32::<LE>()?;
        if size < 52 {
            return Err(anyhow!("Configuration of {size} bytes is too small"));
        }

        let mut config = Self {
            mcc: from.read_u16::<LE>()?,
            mnc: from.read_u16::<LE>()?,
            ..Self::default()
        };
        from.read_exact(&mut config.language)?;
        from.read_exact(&mut config.country)?;
        config.orientation = from.read_u8()?;
        config.touchscreen = from.read_u8()?;
        config.density = from.read_u16::<LE>()?;
        config.keyboard = from.read_u8()?;
        config.navigation = from.read_u8()?;
        config.input_flags = from.read_u8()?;
        let _pad = from.read_u8()?;
        config.screen_width = from.read_u16::<LE>()?;
        config.screen_height = from.read_u16::<LE>()?;
        config.sdk_version = from.read_u16::<LE>()?;
        config.minor_version = from.read_u16::<LE>()?;
        config.screen_layout = from.read_u8()?;
        config.ui_mode = from.read_u8()?;
        config.smallest_screen_width_dp = from.read_u16::<LE>()?;
        config.screen_width_dp = from.read_u16::<LE>()?;
        config.screen_height_dp = from.read_u16::<LE>()?;
        from.read_exact(&mut config.locale_script)?;
        from.read_exact(&mut config.locale_variant)?;
        config.screen_layout2 = from.read_u8()?;
        config.color_mode = from.read_u8()?;
        let _pad = from.read_u16::<LE>()?;

        let mut rest = vec![0u8; size as usize - 52];
        from.read_exact(&mut rest)?;
        Ok(config)
    }
}

impl Ord for ConfigDescription {
    fn cmp(&self, o: &Self) -> Ordering {
        (self.mnc, self.mcc)
            .cmp(&(o.mnc, o.mcc))
            .then_with(|| self.compare_locales(o))
            .then((self.density, self.touchscreen, self.orientation).cmp(&(
                o.density,
                o.touchscreen,
                o.orientation,
            )))
            .then((self.input_flags, self.navigation, self.keyboard).cmp(&(
                o.input_flags,
                o.navigation,
                o.keyboard,
            )))
            .then((self.screen_height, self.screen_width).cmp(&(o.screen_height, o.screen_width)))
            .then((self.minor_version, self.sdk_version).cmp(&(o.minor_version, o.sdk_version)))
            .then(self.screen_layout.cmp(&o.screen_layout))
            .then(self.screen_layout2.cmp(&o.screen_layout2))
            .then(self.color_mode.cmp(&o.color_mode))
            .then(self.ui_mode.cmp(&o.ui_mode))
            .then(self.smallest_screen_width_dp.cmp(&o.smallest_screen_width_dp))
            .then(
                (self.screen_height_dp, self.screen_width_dp)
                    .cmp(&(o.screen_height_dp, o.screen_width_dp)),
            )
    }
}

impl PartialOrd for ConfigDescription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ConfigDescription {
    /// Formats the configuration as the qualifier suffix of a resource directory.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.mcc != 0 {
            parts.push(format!("mcc{}", self.mcc));
        }
        if self.mnc != 0 {
            if self.mnc == MNC_ZERO {
                parts.push("mnc00".to_string());
            } else {
                parts.push(format!("mnc{}", self.mnc));
            }
        }
        if self.language[0] != 0 {
            let (script, variant) = (self.script(), self.variant());
            if script.is_empty() && variant.is_empty() {
                let mut locale = self.language();
                if self.country[0] != 0 {
                    locale.push_str("-r");
                    locale.push_str(&self.region());
                }
                parts.push(locale);
            } else {
                let mut locale = format!("b+{}", self.language());
                for part in [script, self.region(), variant] {
                    if !part.is_empty() {
                        locale.push('+');
                        locale.push_str(&part);
                    }
                }
                parts.push(locale);
            }
        }
        match self.screen_layout & MASK_LAYOUTDIR {
            LAYOUTDIR_LTR => parts.push("ldltr".into()),
            LAYOUTDIR_RTL => parts.push("ldrtl".into()),
            _ => {}
        }
        if self.smallest_screen_width_dp != 0 {
            parts.push(format!("sw{}dp", self.smallest_screen_width_dp));
        }
        if self.screen_width_dp != 0 {
            parts.push(format!("w{}dp", self.screen_width_dp));
        }
        if self.screen_height_dp != 0 {
            parts.push(format!("h{}dp", self.screen_height_dp));
        }
        match self.screen_layout & MASK_SCREENSIZE {
            SCREENSIZE_SMALL => parts.push("small".into()),
            SCREENSIZE_NORMAL => parts.push("normal".into()),
            SCREENSIZE_LARGE => parts.push("large".into()),
            SCREENSIZE_XLARGE => parts.push("xlarge".into()),
            _ => {}
        }
        match self.screen_layout & MASK_SCREENLONG {
            SCREENLONG_NO => parts.push("notlong".into()),
            SCREENLONG_YES => parts.push("long".into()),
            _ => {}
        }
        match self.screen_layout2 & MASK_SCREENROUND {
            SCREENROUND_NO => parts.push("notround".into()),
            SCREENROUND_YES => parts.push("round".into()),
            _ => {}
        }
        match self.color_mode & MASK_WIDE_COLOR_GAMUT {
            WIDE_COLOR_GAMUT_NO => parts.push("nowidecg".into()),
            WIDE_COLOR_GAMUT_YES => parts.push("widecg".into()),
            _ => {}
        }
        match self.color_mode & MASK_HDR {
            HDR_NO => parts.push("lowdr".into()),
            HDR_YES => parts.push("highdr".into()),
            _ => {}
        }
        match self.orientation {
            ORIENTATION_PORT => parts.push("port".into()),
            ORIENTATION_LAND => parts.push("land".into()),
            ORIENTATION_SQUARE => parts.push("square".into()),
            _ => {}
        }
        match self.ui_mode & MASK_UI_MODE_TYPE {
            UI_MODE_TYPE_DESK => parts.push("desk".into()),
            UI_MODE_TYPE_CAR => parts.push("car".into()),
            UI_MODE_TYPE_TELEVISION => parts.push("television".into()),
            UI_MODE_TYPE_APPLIANCE => parts.push("appliance".into()),
            UI_MODE_TYPE_WATCH => parts.push("watch".into()),
            UI_MODE_TYPE_VR_HEADSET => parts.push("vrheadset".into()),
            _ => {}
        }
        match self.ui_mode & MASK_UI_MODE_NIGHT {
            UI_MODE_NIGHT_NO => parts.push("notnight".into()),
            UI_MODE_NIGHT_YES => parts.push("night".into()),
            _ => {}
        }
        match self.density {
            0 => {}
            DENSITY_LOW => parts.push("ldpi".into()),
            DENSITY_MEDIUM => parts.push("mdpi".into()),
            DENSITY_TV => parts.push("tvdpi".into()),
            DENSITY_HIGH => parts.push("hdpi".into()),
            DENSITY_XHIGH => parts.push("xhdpi".into()),
            DENSITY_XXHIGH => parts.push("xxhdpi".into()),
            DENSITY_XXXHIGH => parts.push("xxxhdpi".into()),
            DENSITY_NONE => parts.push("nodpi".into()),
            DENSITY_ANY => parts.push("anydpi".into()),
            other => parts.push(format!("{other}dpi")),
        }
        match self.touchscreen {
            TOUCHSCREEN_NOTOUCH => parts.push("notouch".into()),
            TOUCHSCREEN_STYLUS => parts.push("stylus".into()),
            TOUCHSCREEN_FINGER => parts.push("finger".into()),
            _ => {}
        }
        match self.input_flags & MASK_KEYSHIDDEN {
            KEYSHIDDEN_NO => parts.push("keysexposed".into()),
            KEYSHIDDEN_YES => parts.push("keyshidden".into()),
            KEYSHIDDEN_SOFT => parts.push("keyssoft".into()),
            _ => {}
        }
        match self.keyboard {
            KEYBOARD_NOKEYS => parts.push("nokeys".into()),
            KEYBOARD_QWERTY => parts.push("qwerty".into()),
            KEYBOARD_12KEY => parts.push("12key".into()),
            _ => {}
        }
        match self.input_flags & MASK_NAVHIDDEN {
            NAVHIDDEN_NO => parts.push("navexposed".into()),
            NAVHIDDEN_YES => parts.push("navhidden".into()),
            _ => {}
        }
        match self.navigation {
            NAVIGATION_NONAV => parts.push("nonav".into()),
            NAVIGATION_DPAD => parts.push("dpad".into()),
            NAVIGATION_TRACKBALL => parts.push("trackball".into()),
            NAVIGATION_WHEEL => parts.push("wheel".into()),
            _ => {}
        }
        if self.screen_width != 0 || self.screen_height != 0 {
            parts.push(format!("{}x{}", self.screen_width, self.screen_height));
        }
        if self.sdk_version != 0 {
            parts.push(format!("v{}", self.sdk_version));
        }

        write!(f, "{}", parts.join("-"))
    }
}

fn is_alpha(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|c| c.is_ascii_alphabetic())
}

fn trim_nul(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as char)
        .collect()
}

// Two-letter codes are stored as-is, three-letter codes are packed into 15 bits.
fn pack_language_or_region(code: &str, base: u8) -> [u8; 2] {
    let bytes = code.as_bytes();
    match bytes.len() {
        0 => [0, 0],
        1 | 2 => [bytes[0], bytes.get(1).copied().unwrap_or(0)],
        _ => {
            let first = bytes[0].wrapping_sub(base) & 0x7f;
            let second = bytes[1].wrapping_sub(base) & 0x7f;
            let third = bytes[2].wrapping_sub(base) & 0x7f;
            [0x80 | (third << 2) | (second >> 3), (second << 5) | first]
        }
    }
}

fn unpack_language_or_region(packed: [u8; 2], base: u8) -> String {
    if packed[0] & 0x80 != 0 {
        let first = packed[1] & 0x1f;
        let second = ((packed[1] & 0xe0) >> 5) + ((packed[0] & 0x03) << 3);
        let third = (packed[0] & 0x7c) >> 2;
        [first + base, second + base, third + base]
            .iter()
            .map(|c| *c as char)
            .collect()
    } else {
        trim_nul(&packed)
    }
}

fn parse_number_between(value: &str, prefix: &str, suffix: &str) -> Option<u16> {
    let digits = value.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_mcc(part: &str, config: &mut ConfigDescription) -> bool {
    match part.strip_prefix("mcc") {
        Some(digits) if digits.len() == 3 && digits.bytes().all(|c| c.is_ascii_digit()) => {
            config.mcc = digits.parse().unwrap_or(0);
            true
        }
        _ => false,
    }
}

fn parse_mnc(part: &str, config: &mut ConfigDescription) -> bool {
    match part.strip_prefix("mnc") {
        Some(digits)
            if (1..=3).contains(&digits.len()) && digits.bytes().all(|c| c.is_ascii_digit()) =>
        {
            let value: u16 = digits.parse().unwrap_or(0);
            config.mnc = if value == 0 { MNC_ZERO } else { value };
            true
        }
        _ => false,
    }
}

// Consumes a locale starting at `idx`, which is either `lang[-rREGION]` or a `b+` tag.
// Returns the index of the first unconsumed part, or None for a malformed `b+` tag.
fn parse_locale(parts: &[String], idx: usize, config: &mut ConfigDescription) -> Option<usize> {
    let Some(part) = parts.get(idx) else {
        return Some(idx);
    };

    if let Some(tag) = part.strip_prefix("b+") {
        let subtags: Vec<&str> = tag.split('+').collect();
        match subtags.as_slice() {
            [lang] => config.set_language(lang),
            [lang, second] => {
                config.set_language(lang);
                match second.len() {
                    2 | 3 => config.set_region(second),
                    4 if is_alpha(second) => config.set_script(second),
                    4..=8 => config.set_variant(second),
                    _ => return None,
                }
            }
            [lang, second, third] => {
                config.set_language(lang);
                match second.len() {
                    4 => config.set_script(second),
                    2 | 3 => config.set_region(second),
                    _ => return None,
                }
                if third.len() >= 4 {
                    config.set_variant(third);
                } else {
                    config.set_region(third);
                }
            }
            [lang, script, region, variant] => {
                config.set_language(lang);
                config.set_script(script);
                config.set_region(region);
                config.set_variant(variant);
            }
            _ => return None,
        }
        return Some(idx + 1);
    }

    // "car" and "hdr" are three letters long but belong to later axes.
    if !(part.len() == 2 || part.len() == 3) || !is_alpha(part) || part == "car" || part == "hdr" {
        return Some(idx);
    }
    config.set_language(part);

    let next = idx + 1;
    match parts.get(next) {
        Some(region)
            if region.len() == 3 && region.starts_with('r') && region[1..]
                .bytes()
                .all(|c| c.is_ascii_alphanumeric()) =>
        {
            config.set_region(&region[1..]);
            Some(next + 1)
        }
        _ => Some(next),
    }
}

fn parse_layout_direction(part: &str, config: &mut ConfigDescription) -> bool {
    let dir = match part {
        "ldltr" => LAYOUTDIR_LTR,
        "ldrtl" => LAYOUTDIR_RTL,
        _ => return false,
    };
    config.screen_layout = (config.screen_layout & !MASK_LAYOUTDIR) | dir;
    true
}

fn parse_smallest_screen_width_dp(part: &str, config: &mut ConfigDescription) -> bool {
    match parse_number_between(part, "sw", "dp") {
        Some(value) => {
            config.smallest_screen_width_dp = value;
            true
        }
        None => false,
    }
}

fn parse_screen_width_dp(part: &str, config: &mut ConfigDescription) -> bool {
    match parse_number_between(part, "w", "dp") {
        Some(value) => {
            config.screen_width_dp = value;
            true
        }
        None => false,
    }
}

fn parse_screen_height_dp(part: &str, config: &mut ConfigDescription) -> bool {
    match parse_number_between(part, "h", "dp") {
        Some(value) => {
            config.screen_height_dp = value;
            true
        }
        None => false,
    }
}

fn parse_screen_layout_size(part: &str, config: &mut ConfigDescription) -> bool {
    let size = match part {
        "small" => SCREENSIZE_SMALL,
        "normal" => SCREENSIZE_NORMAL,
        "large" => SCREENSIZE_LARGE,
        "xlarge" => SCREENSIZE_XLARGE,
        _ => return false,
    };
    config.screen_layout = (config.screen_layout & !MASK_SCREENSIZE) | size;
    true
}

fn parse_screen_layout_long(part: &str, config: &mut ConfigDescription) -> bool {
    let long = match part {
        "long" => SCREENLONG_YES,
        "notlong" => SCREENLONG_NO,
        _ => return false,
    };
    config.screen_layout = (config.screen_layout & !MASK_SCREENLONG) | long;
    true
}

fn parse_screen_round(part: &str, config: &mut ConfigDescription) -> bool {
    let round = match part {
        "round" => SCREENROUND_YES,
        "notround" => SCREENROUND_NO,
        _ => return false,
    };
    config.screen_layout2 = (config.screen_layout2 & !MASK_SCREENROUND) | round;
    true
}

fn parse_wide_color_gamut(part: &str, config: &mut ConfigDescription) -> bool {
    let gamut = match part {
        "widecg" => WIDE_COLOR_GAMUT_YES,
        "nowidecg" => WIDE_COLOR_GAMUT_NO,
        _ => return false,
    };
    config.color_mode = (config.color_mode & !MASK_WIDE_COLOR_GAMUT) | gamut;
    true
}

fn parse_hdr(part: &str, config: &mut ConfigDescription) -> bool {
    let hdr = match part {
        "highdr" => HDR_YES,
        "lowdr" => HDR_NO,
        _ => return false,
    };
    config.color_mode = (config.color_mode & !MASK_HDR) | hdr;
    true
}

fn parse_orientation(part: &str, config: &mut ConfigDescription) -> bool {
    config.orientation = match part {
        "port" => ORIENTATION_PORT,
        "land" => ORIENTATION_LAND,
        "square" => ORIENTATION_SQUARE,
        _ => return false,
    };
    true
}

fn parse_ui_mode_type(part: &str, config: &mut ConfigDescription) -> bool {
    let mode = match part {
        "desk" => UI_MODE_TYPE_DESK,
        "car" => UI_MODE_TYPE_CAR,
        "television" => UI_MODE_TYPE_TELEVISION,
        "appliance" => UI_MODE_TYPE_APPLIANCE,
        "watch" => UI_MODE_TYPE_WATCH,
        "vrheadset" => UI_MODE_TYPE_VR_HEADSET,
        _ => return false,
    };
    config.ui_mode = (config.ui_mode & !MASK_UI_MODE_TYPE) | mode;
    true
}

fn parse_ui_mode_night(part: &str, config: &mut ConfigDescription) -> bool {
    let night = match part {
        "night" => UI_MODE_NIGHT_YES,
        "notnight" => UI_MODE_NIGHT_NO,
        _ => return false,
    };
    config.ui_mode = (config.ui_mode & !MASK_UI_MODE_NIGHT) | night;
    true
}

fn parse_density(part: &str, config: &mut ConfigDescription) -> bool {
    config.density = match part {
        "ldpi" => DENSITY_LOW,
        "mdpi" => DENSITY_MEDIUM,
        "tvdpi" => DENSITY_TV,
        "hdpi" => DENSITY_HIGH,
        "xhdpi" => DENSITY_XHIGH,
        "xxhdpi" => DENSITY_XXHIGH,
        "xxxhdpi" => DENSITY_XXXHIGH,
        "anydpi" => DENSITY_ANY,
        "nodpi" => DENSITY_NONE,
        other => match parse_number_between(other, "", "dpi") {
            Some(value) if value != 0 => value,
            _ => return false,
        },
    };
    true
}

fn parse_touchscreen(part: &str, config: &mut ConfigDescription) -> bool {
    config.touchscreen = match part {
        "notouch" => TOUCHSCREEN_NOTOUCH,
        "stylus" => TOUCHSCREEN_STYLUS,
        "finger" => TOUCHSCREEN_FINGER,
        _ => return false,
    };
    true
}

fn parse_keys_hidden(part: &str, config: &mut ConfigDescription) -> bool {
    let keys = match part {
        "keysexposed" => KEYSHIDDEN_NO,
        "keyshidden" => KEYSHIDDEN_YES,
        "keyssoft" => KEYSHIDDEN_SOFT,
        _ => return false,
    };
    config.input_flags = (config.input_flags & !MASK_KEYSHIDDEN) | keys;
    true
}

fn parse_keyboard(part: &str, config: &mut ConfigDescription) -> bool {
    config.keyboard = match part {
        "nokeys" => KEYBOARD_NOKEYS,
        "qwerty" => KEYBOARD_QWERTY,
        "12key" => KEYBOARD_12KEY,
        _ => return false,
    };
    true
}

fn parse_nav_hidden(part: &str, config: &mut ConfigDescription) -> bool {
    let nav = match part {
        "navexposed" => NAVHIDDEN_NO,
        "navhidden" => NAVHIDDEN_YES,
        _ => return false,
    };
    config.input_flags = (config.input_flags & !MASK_NAVHIDDEN) | nav;
    true
}

fn parse_navigation(part: &str, config: &mut ConfigDescription) -> bool {
    config.navigation = match part {
        "nonav" => NAVIGATION_NONAV,
        "dpad" => NAVIGATION_DPAD,
        "trackball" => NAVIGATION_TRACKBALL,
        "wheel" => NAVIGATION_WHEEL,
        _ => return false,
    };
    true
}

fn parse_screen_size(part: &str, config: &mut ConfigDescription) -> bool {
    let Some((width, height)) = part.split_once('x') else {
        return false;
    };
    match (
        parse_number_between(width, "", ""),
        parse_number_between(height, "", ""),
    ) {
        (Some(width), Some(height)) => {
            config.screen_width = width;
            config.screen_height = height;
            true
        }
        _ => false,
    }
}

fn parse_version(part: &str, config: &mut ConfigDescription) -> bool {
    match parse_number_between(part, "v", "") {
        Some(version) => {
            config.sdk_version = version;
            config.minor_version = 0;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sorts_first() {
        let default = ConfigDescription::default();
        let fr = ConfigDescription::parse("fr").unwrap();
        let land = ConfigDescription::parse("land").unwrap();
        assert!(default < fr);
        assert!(default < land);
        assert!(default.is_default());
    }

    #[test]
    fn parses_locale_and_region() {
        let config = ConfigDescription::parse("fr-rCA").unwrap();
        assert_eq!(config.language, *b"fr");
        assert_eq!(config.country, *b"CA");
        assert_eq!(config.locale(), "fr-CA");
        assert_eq!(config.to_string(), "fr-rCA");
    }

    #[test]
    fn packs_three_letter_languages() {
        let config = ConfigDescription::parse("fil-rPH").unwrap();
        assert_ne!(config.language[0] & 0x80, 0);
        assert_eq!(config.language(), "fil");
        assert_eq!(config.region(), "PH");
    }

    #[test]
    fn parses_bcp47_tag() {
        let config = ConfigDescription::parse("b+sr+Latn").unwrap();
        assert_eq!(config.language(), "sr");
        assert_eq!(config.locale_script, *b"Latn");
        assert_eq!(config.to_string(), "b+sr+Latn");
    }

    #[test]
    fn applies_implied_sdk_version() {
        assert_eq!(ConfigDescription::parse("hdpi").unwrap().sdk_version, 4);
        assert_eq!(ConfigDescription::parse("sw600dp").unwrap().sdk_version, 13);
        assert_eq!(ConfigDescription::parse("ldrtl").unwrap().sdk_version, 17);
        assert_eq!(ConfigDescription::parse("anydpi").unwrap().sdk_version, 21);
        assert_eq!(ConfigDescription::parse("night-v21").unwrap().sdk_version, 21);
        assert_eq!(
            ConfigDescription::parse("land-hdpi").unwrap().to_string(),
            "land-hdpi-v4"
        );
    }

    #[test]
    fn rejects_out_of_order_qualifiers() {
        assert!(ConfigDescription::parse("hdpi-land").is_none());
        assert!(ConfigDescription::parse("notaqualifier").is_none());
        assert!(ConfigDescription::parse("en-port-mdpi-rUS").is_none());
    }

    #[test]
    fn diff_reports_changed_axes() {
        let default = ConfigDescription::default();
        let fr = ConfigDescription::parse("fr").unwrap();
        let land = ConfigDescription::parse("land").unwrap();
        assert_eq!(default.diff(&fr), CONFIG_LOCALE);
        assert_eq!(default.diff(&land), CONFIG_ORIENTATION);
        assert_eq!(fr.diff(&fr), 0);
    }

    #[test]
    fn logical_order_puts_locale_before_density() {
        let hdpi = ConfigDescription::parse("hdpi").unwrap();
        let fr = ConfigDescription::parse("fr").unwrap();
        assert_eq!(hdpi.compare_logical(&fr), Ordering::Less);
        assert_eq!(fr.compare_logical(&fr), Ordering::Equal);
    }

    #[test]
    fn writes_and_reads_back() {
        let config = ConfigDescription::parse("mcc310-mnc004-en-rUS-sw600dp-land-xhdpi").unwrap();
        let mut data = Vec::new();
        config.write(&mut data).unwrap();
        assert_eq!(data.len(), CONFIG_SIZE as usize);
        let read = ConfigDescription::read(&mut std::io::Cursor::new(data)).unwrap();
        assert_eq!(read, config);
    }
}

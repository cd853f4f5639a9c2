//! Selects which configurations of a resource make it into the flattened table.

use anyhow::{anyhow, Result};
use log::warn;

use crate::config::{CONFIG_DENSITY, CONFIG_LOCALE, CONFIG_SMALLEST_SCREEN_SIZE, CONFIG_VERSION};
use crate::ConfigDescription;

/// A weak configuration filter: a config is kept if, on every axis it shares with the filter,
/// some filter entry agrees with it.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    default: ConfigDescription,
    config_mask: u32,
    entries: Vec<(ConfigDescription, u32)>,
    contains_pseudo: bool,
    contains_pseudo_bidi: bool,
}

impl ResourceFilter {
    /// A filter which keeps everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma separated list such as `en,fr-rCA,en_US,sw600dp`.
    pub fn parse(list: &str) -> Result<Self> {
        let mut filter = Self::default();
        for part in list.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            match part {
                "en_XA" => filter.contains_pseudo = true,
                "ar_XB" => filter.contains_pseudo_bidi = true,
                _ => {}
            }

            let config = ConfigDescription::parse_locale_filter(part)
                .ok_or_else(|| anyhow!("Invalid configuration: {part}"))?;

            let mut mask = filter.default.diff(&config) & !CONFIG_VERSION;
            if mask & CONFIG_DENSITY != 0 {
                warn!("Ignoring density filter {part}");
                mask &= !CONFIG_DENSITY;
            }
            if mask == 0 {
                continue;
            }

            filter.config_mask |= mask;
            filter.entries.push((config, mask));
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.config_mask == 0
    }

    /// Whether the `en_XA` pseudo-locale was asked for.
    pub fn contains_pseudo(&self) -> bool {
        self.contains_pseudo
    }

    /// Whether the `ar_XB` pseudo-locale was asked for.
    pub fn contains_pseudo_bidi(&self) -> bool {
        self.contains_pseudo_bidi
    }

    pub fn matches(&self, config: &ConfigDescription) -> bool {
        let diff = self.default.diff(config);
        if self.config_mask & diff == 0 {
            // Nothing the filter cares about is set on this config
            return true;
        }

        let mut matched = 0;
        for (entry, mask) in &self.entries {
            let entry_diff = entry.diff(config);

            if entry_diff & mask == 0 {
                matched |= mask;
            } else if entry_diff & mask == CONFIG_LOCALE
                && entry.language == config.language
                && config.country == [0, 0]
            {
                // A bare language is satisfied by any region of it
                matched |= CONFIG_LOCALE;
            } else if entry_diff & mask == CONFIG_SMALLEST_SCREEN_SIZE
                && config.smallest_screen_width_dp != 0
                && config.smallest_screen_width_dp < entry.smallest_screen_width_dp
            {
                matched |= CONFIG_SMALLEST_SCREEN_SIZE;
            }
        }

        matched == (self.config_mask & diff)
    }
}

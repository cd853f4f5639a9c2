use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{PseudoMethod, ResourceFilter};

/// What kind of package is being built. Decides the package ID and how private attrs are
/// handled.
#[derive(Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    #[default]
    App,
    /// A framework package with the fixed ID 0x01.
    System,
    /// A library loaded at runtime with a dynamically assigned ID.
    SharedLibrary,
}

impl PackageType {
    pub fn package_id(&self) -> u8 {
        match self {
            PackageType::App => 0x7f,
            PackageType::System => 0x01,
            PackageType::SharedLibrary => 0x00,
        }
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Pseudolocalize {
    #[default]
    None,
    Accented,
    Bidi,
    All,
}

impl Pseudolocalize {
    /// The pseudo-locale methods to generate, in order.
    pub fn methods(&self) -> Vec<PseudoMethod> {
        match self {
            Pseudolocalize::None => vec![],
            Pseudolocalize::Accented => vec![PseudoMethod::Accented],
            Pseudolocalize::Bidi => vec![PseudoMethod::Bidi],
            Pseudolocalize::All => vec![PseudoMethod::Accented, PseudoMethod::Bidi],
        }
    }
}

/// Settings for one compile, usually loaded from a JSON file.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)] // skip missing fields
pub struct CompileOptions {
    /// Name of the package being compiled, e.g. `com.example.app`
    pub package: String,
    pub package_type: PackageType,
    /// Comma separated list of products to keep. Empty keeps `default`.
    pub product: Option<String>,
    /// Comma separated configuration filter, e.g. `en,fr-rCA,sw600dp`
    pub configs: Option<String>,
    /// Locales every string must be translated into.
    pub required_locales: Vec<String>,
    /// Lets overlays add resources without an `<add-resource>` declaration.
    pub auto_add_overlay: bool,
    /// Writes the table's string pools as UTF-16 instead of UTF-8.
    pub utf16_strings: bool,
    /// Writes binary XML string pools as UTF-8 instead of UTF-16.
    pub utf8_xml: bool,
    pub strip_comments: bool,
    pub strip_raw_values: bool,
    pub error_on_missing_config_entry: bool,
    pub pseudolocalize: Pseudolocalize,
    /// Where to write the `public.xml` style list of public resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_out: Option<PathBuf>,
}

impl CompileOptions {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Default::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Reading options from {}", path.display()))?;
        serde_json::from_str(&contents).context("Options JSON was invalid")
    }

    pub fn package_id(&self) -> u8 {
        self.package_type.package_id()
    }

    pub fn products(&self) -> Vec<&str> {
        match &self.product {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn resource_filter(&self) -> Result<ResourceFilter> {
        match &self.configs {
            Some(configs) => ResourceFilter::parse(configs).context("Parsing configs"),
            None => Ok(ResourceFilter::new()),
        }
    }

    /// Pseudo-locales to generate, including any asked for through the config filter.
    pub fn pseudo_methods(&self) -> Result<Vec<PseudoMethod>> {
        let filter = self.resource_filter()?;
        let mut methods = self.pseudolocalize.methods();
        if filter.contains_pseudo() && !methods.contains(&PseudoMethod::Accented) {
            methods.push(PseudoMethod::Accented);
        }
        if filter.contains_pseudo_bidi() && !methods.contains(&PseudoMethod::Bidi) {
            methods.push(PseudoMethod::Bidi);
        }
        Ok(methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let options: CompileOptions = serde_json::from_str(
            r#"{"package": "com.example", "package_type": "shared-library", "pseudolocalize": "bidi"}"#,
        )
        .unwrap();
        assert_eq!(options.package, "com.example");
        assert_eq!(options.package_id(), 0x00);
        assert!(!options.utf16_strings);
        assert_eq!(options.pseudo_methods().unwrap(), vec![PseudoMethod::Bidi]);
    }

    #[test]
    fn pseudo_locales_in_filter_enable_pseudolocalization() {
        let mut options = CompileOptions::new("com.example");
        options.configs = Some("en,en_XA".to_string());
        assert_eq!(
            options.pseudo_methods().unwrap(),
            vec![PseudoMethod::Accented]
        );
    }

    #[test]
    fn products_are_split() {
        let mut options = CompileOptions::new("a");
        assert!(options.products().is_empty());
        options.product = Some("tablet, phone".to_string());
        assert_eq!(options.products(), vec!["tablet", "phone"]);
    }
}

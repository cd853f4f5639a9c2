//! Builds a whole package from `res/` directories: values files into the table, other files as
//! file references, and XML files into binary XML.

mod string;
mod values;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{debug, info};

use crate::table::is_valid_resource_name;
use crate::xml::{FlattenFlags, XmlNode};
use crate::{
    format, CompileOptions, ConfigDescription, ErrorLog, IncludedResources, ResourceTable,
    SourcePos,
};

pub use string::{has_substitution_errors, parse_styled_string, StyledString};
pub use values::compile_resource_file;

/// Resource directories whose `.xml` files are compiled to binary XML.
const XML_DIRS: &[&str] = &[
    "layout",
    "xml",
    "menu",
    "anim",
    "animator",
    "interpolator",
    "drawable",
    "color",
];

/// Everything a build produces.
pub struct BuildOutput {
    /// The flattened `resources.arsc`
    pub arsc: Vec<u8>,
    /// Compiled XML files by their path within the package, e.g. `res/layout/main.xml`
    pub xml_files: BTreeMap<String, Vec<u8>>,
}

impl From<&CompileOptions> for FlattenFlags {
    fn from(options: &CompileOptions) -> Self {
        Self {
            utf8: options.utf8_xml,
            strip_comments: options.strip_comments,
            strip_raw_values: options.strip_raw_values,
        }
    }
}

/// Compiles the resources in `res_dirs`, then applies `overlays` on top of them in order.
///
/// Every file is compiled even after a failure so that all errors are reported together.
pub fn build(
    res_dirs: &[PathBuf],
    overlays: &[PathBuf],
    options: &CompileOptions,
    included: Box<dyn IncludedResources>,
) -> Result<BuildOutput> {
    let mut table = ResourceTable::new(&options.package, options.package_type, included);
    table.set_auto_add_overlay(options.auto_add_overlay);

    let mut errors = ErrorLog::new();
    let mut xml_sources = BTreeMap::new();
    for dir in res_dirs {
        ingest_dir(&mut table, dir, false, options, &mut errors, &mut xml_sources)?;
    }
    for dir in overlays {
        info!("Applying overlay {}", dir.display());
        ingest_dir(&mut table, dir, true, options, &mut errors, &mut xml_sources)?;
    }
    errors.finish("Compiling resource tables")?;

    table.assign_resource_ids()?;

    let flags = FlattenFlags::from(options);
    let mut errors = ErrorLog::new();
    let mut xml_files = BTreeMap::new();
    for (res_path, path) in xml_sources {
        debug!("Compiling {res_path}");
        if let Some(data) = errors.record(compile_xml_file(&mut table, &path, &res_path, flags)) {
            xml_files.insert(res_path, data);
        }
    }
    errors.finish("Compiling XML files")?;

    table.validate_localizations(&options.required_locales)?;
    let arsc = table.flatten(&options.resource_filter()?, options)?;

    if let Some(public_out) = &options.public_out {
        let mut writer = BufWriter::new(
            File::create(public_out)
                .with_context(|| format!("Creating {}", public_out.display()))?,
        );
        table.write_public_definitions(&mut writer)?;
    }

    info!(
        "Compiled {} resources and {} XML files",
        table.num_local_resources(),
        xml_files.len()
    );
    Ok(BuildOutput { arsc, xml_files })
}

/// Compiles a single XML document, such as a manifest, against the included resources only.
pub fn compile_standalone_xml(
    path: &Path,
    options: &CompileOptions,
    included: Box<dyn IncludedResources>,
) -> Result<Vec<u8>> {
    let mut table = ResourceTable::new(&options.package, options.package_type, included);
    table.assign_resource_ids()?;
    let name = path.display().to_string();
    compile_xml_file(&mut table, path, &name, FlattenFlags::from(options))
}

/// Compiles one XML file of a package whose resource IDs are already assigned.
pub fn compile_xml_file(
    table: &mut ResourceTable,
    path: &Path,
    name: &str,
    flags: FlattenFlags,
) -> Result<Vec<u8>> {
    let mut root = XmlNode::parse_file(path, name)?;
    root.remove_whitespace(true, &[]);
    root.assign_resource_ids(table)?;
    root.parse_values(table)?;
    root.flatten(flags)
}

// Adds the files of one `res/` directory to the table.
fn ingest_dir(
    table: &mut ResourceTable,
    dir: &Path,
    overlay: bool,
    options: &CompileOptions,
    errors: &mut ErrorLog,
    xml_sources: &mut BTreeMap<String, PathBuf>,
) -> Result<()> {
    for (dir_name, dir_path) in sorted_entries(dir)? {
        if !dir_path.is_dir() {
            continue;
        }
        let (type_name, qualifiers) = dir_name
            .split_once('-')
            .unwrap_or((dir_name.as_str(), ""));
        let Some(config) = ConfigDescription::parse(qualifiers) else {
            errors.push(anyhow!("{}: invalid resource directory name", dir_path.display()));
            continue;
        };

        for (file_name, path) in sorted_entries(&dir_path)? {
            if !path.is_file() {
                continue;
            }
            let display = path.display().to_string();

            if type_name == "values" {
                if !file_name.ends_with(".xml") {
                    continue;
                }
                let result = XmlNode::parse_file(&path, &display).and_then(|root| {
                    compile_resource_file(table, &root, &config, overlay, options)
                });
                errors.record(result);
                continue;
            }

            let res_path = format!("res/{dir_name}/{file_name}");
            let name = file_name.split('.').next().unwrap_or_default();
            let pos = SourcePos::new(&display, 0);
            if !is_valid_resource_name(name) {
                errors.push(pos.error(format!("Invalid file name '{name}' for a resource")));
                continue;
            }
            let result = table.add_entry(
                &pos,
                &options.package,
                type_name,
                name,
                &res_path,
                &[],
                &config,
                false,
                format::ANY,
                overlay,
            );
            errors.record(result);

            if XML_DIRS.contains(&type_name) && file_name.ends_with(".xml") {
                xml_sources.insert(res_path, path);
            }
        }
    }
    Ok(())
}

// Directory entries by name, skipping hidden files.
fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Reading {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if !name.starts_with('.') {
            entries.push((name, path));
        }
    }
    entries.sort();
    Ok(entries)
}

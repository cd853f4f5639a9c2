//! The work behind each `rescomp` subcommand.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use const_format::formatcp;
use log::info;
use rescomp_core::compile::{build, compile_standalone_xml};
use rescomp_core::{
    axml_to_xml, AxmlReader, CompileOptions, IncludedResources, NoIncluded, ResourceIds,
};

pub const DEFAULT_OUT_DIR: &str = "build";
pub const DEFAULT_ARSC_PATH: &str = formatcp!("{DEFAULT_OUT_DIR}/resources.arsc");
pub const FRAMEWORK_PACKAGE: &str = "android";

/// Loads the options file if given, otherwise starts from the defaults. `package` overrides the
/// package name in the file.
pub fn load_options(path: Option<&Path>, package: Option<&str>) -> Result<CompileOptions> {
    let mut options = match path {
        Some(path) => CompileOptions::load(path)?,
        None => CompileOptions::default(),
    };
    if let Some(package) = package {
        options.package = package.to_string();
    }
    if options.package.is_empty() {
        return Err(anyhow::anyhow!(
            "No package name given. Use --package or set \"package\" in the options file"
        ));
    }
    Ok(options)
}

/// Loads the symbol file of the framework package, if one was given.
pub fn load_included(path: Option<&Path>) -> Result<Box<dyn IncludedResources>> {
    let Some(path) = path else {
        return Ok(Box::new(NoIncluded));
    };
    let mut handle = BufReader::new(
        File::open(path).with_context(|| format!("Opening {}", path.display()))?,
    );
    let ids = ResourceIds::load(FRAMEWORK_PACKAGE, &mut handle)
        .with_context(|| format!("Loading included resources from {}", path.display()))?;
    Ok(Box::new(ids))
}

/// Compiles the given resource directories and writes the table to `out`. Compiled XML files
/// go under `xml_out`, keeping their `res/...` paths.
pub fn compile_dirs(
    res_dirs: &[PathBuf],
    overlays: &[PathBuf],
    out: &Path,
    xml_out: Option<&Path>,
    options: &CompileOptions,
    included: Box<dyn IncludedResources>,
) -> Result<()> {
    let output = build(res_dirs, overlays, options, included)?;

    write_file(out, &output.arsc)?;
    info!("Wrote {} ({} bytes)", out.display(), output.arsc.len());

    if let Some(xml_out) = xml_out {
        for (res_path, data) in &output.xml_files {
            write_file(&xml_out.join(res_path), data)?;
        }
        info!("Wrote {} XML files to {}", output.xml_files.len(), xml_out.display());
    }
    Ok(())
}

/// Flattens one XML document, such as a manifest.
pub fn compile_xml(
    input: &Path,
    out: &Path,
    options: &CompileOptions,
    included: Box<dyn IncludedResources>,
) -> Result<()> {
    let data = compile_standalone_xml(input, options, included)?;
    write_file(out, &data)
}

/// Renders a binary XML file as text.
pub fn dump_xml(input: &[u8]) -> Result<String> {
    let mut cursor = Cursor::new(input);
    let mut reader = AxmlReader::new(&mut cursor).context("Input was not binary XML")?;

    let mut xml_output = Vec::new();
    let mut writer = xml::EmitterConfig::new()
        .perform_indent(true)
        .create_writer(&mut xml_output);
    axml_to_xml(&mut writer, &mut reader).context("Converting binary XML to XML")?;

    String::from_utf8(xml_output).context("XML output was not valid UTF-8")
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Creating {}", parent.display()))?;
    }
    std::fs::write(path, data).with_context(|| format!("Writing {}", path.display()))
}

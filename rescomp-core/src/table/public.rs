use std::io::Write;

use anyhow::Result;

use super::ResourceTable;
use crate::make_res_id;

impl ResourceTable {
    /// Writes a `public.xml` style listing of every resource and its assigned ID. Public
    /// resources come first, then the rest with the places they were declared.
    pub fn write_public_definitions(&self, to: &mut impl Write) -> Result<()> {
        writeln!(
            to,
            "<!-- This file contains <public> resource definitions for all\n     resources that were generated from the source data. -->\n\n<resources>"
        )?;
        self.write_public_section(to, true)?;
        self.write_public_section(to, false)?;
        writeln!(to, "\n</resources>")?;
        Ok(())
    }

    fn write_public_section(&self, to: &mut impl Write, public: bool) -> Result<()> {
        let mut did_header = false;
        for t in self.package.ordered_types().iter().flatten() {
            let mut did_type = false;
            for (ei, list) in t.ordered().iter().enumerate() {
                let Some(list) = list.as_ref().filter(|list| list.public == public) else {
                    continue;
                };

                if !did_type {
                    writeln!(to)?;
                    did_type = true;
                }
                if !did_header {
                    if public {
                        writeln!(to, "  <!-- PUBLIC SECTION.  These resources have been declared public.\n       Changes to these definitions will break binary compatibility. -->\n")?;
                    } else {
                        writeln!(to, "  <!-- PRIVATE SECTION.  These resources have not been declared public.\n       You can make them public by moving these lines into a file in res/values. -->\n")?;
                    }
                    did_header = true;
                }

                if !public {
                    for entry in list.entries.values() {
                        if !entry.pos.file.is_empty() {
                            writeln!(to, "  <!-- Declared at {} -->", entry.pos)?;
                        }
                    }
                }

                let id = make_res_id(
                    self.package.id as u32,
                    t.index,
                    list.entry_index.unwrap_or(ei) as u32,
                );
                writeln!(
                    to,
                    "  <public type=\"{}\" name=\"{}\" id=\"0x{id:08x}\" />",
                    t.name, list.name
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{format, ConfigDescription, NoIncluded, PackageType, ResourceTable, SourcePos};

    #[test]
    fn lists_public_then_private() {
        let mut table =
            ResourceTable::new("com.example", PackageType::App, Box::new(NoIncluded));
        for name in ["hidden", "shown"] {
            table
                .add_entry(
                    &SourcePos::new("res/values/strings.xml", 3),
                    "com.example",
                    "string",
                    name,
                    "text",
                    &[],
                    &ConfigDescription::default(),
                    false,
                    format::ANY,
                    false,
                )
                .unwrap();
        }
        table
            .add_public(
                &SourcePos::new("res/values/public.xml", 2),
                "com.example",
                "string",
                "shown",
                0x7f020000,
            )
            .unwrap();
        table.assign_resource_ids().unwrap();

        let mut out = Vec::new();
        table.write_public_definitions(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let public = text.find("PUBLIC SECTION").unwrap();
        let private = text.find("PRIVATE SECTION").unwrap();
        assert!(public < private);
        assert!(text.contains(r#"<public type="string" name="shown" id="0x7f020000" />"#));
        assert!(text.contains(r#"<public type="string" name="hidden" id="0x7f020001" />"#));
        assert!(text.contains("<!-- Declared at res/values/strings.xml:3 -->"));
        assert!(text.ends_with("\n</resources>\n"));
    }
}

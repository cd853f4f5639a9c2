//! Binary XML to text XML converter, used to inspect compiled manifests and layouts.
//!
//! Binary XML carries more than text XML can hold. Typed attribute values lose their type when
//! written out: references are printed as `@0x7f010000` and theme attributes as `?0x01010000`,
//! and dimensions, fractions and colors are printed in their usual resource notation.
//! Resource IDs of attribute names are not printed at all. An attribute in a resource namespace
//! without an ID gets a warning comment, since the runtime will not recognise it.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};

use anyhow::Result;

use crate::values::format_complex;
use crate::{ResValue, ValueType, RESOURCES_AUTO_PACKAGE_NAMESPACE, RESOURCES_ROOT_NAMESPACE};

use super::AxmlReader;
type AxmlAttrValue = super::AttributeValue;
type AxmlEvent = super::Event;
type AxmlNamespace = super::Namespace;
type XmlName<'a> = xml::name::Name<'a>;

/// Converts a binary XML document into readable XML.
pub fn axml_to_xml<W: Write, R: Read + Seek>(
    writer: &mut xml::EventWriter<W>,
    reader: &mut AxmlReader<R>,
) -> Result<()> {
    use xml::writer::XmlEvent;

    // Binary XML uses a series of StartNamespace chunks before an opening tag to indicate that
    // this tag declares namespaces. This Vec contains the content of any StartNamespace chunks
    // since the last opening tag.
    let mut queued_namespaces: Vec<AxmlNamespace> = Vec::new();

    // The currently available namespace prefixes. (Key is URI, value is namespace prefix)
    // Needed to correctly write the namespace prefix with each XML attribute.
    let mut current_ns_prefixes: HashMap<String, String> = HashMap::new();

    while let Some(ev) = reader.read_next_event()? {
        match ev {
            AxmlEvent::StartElement {
                attributes,
                name,
                namespace,
                comment,
                ..
            } => {
                let string_attr_values: Vec<String> = attributes
                    .iter()
                    .map(|attr| stringify_attr_value(&attr.value, attr.raw_value.as_deref()))
                    .collect();

                // Written after the opening tag, as comments cannot come before the root.
                let mut notes: Vec<String> = comment.into_iter().collect();

                let mut builder = XmlEvent::start_element(get_xml_name_from_axml(
                    &name,
                    &namespace,
                    &current_ns_prefixes,
                ));
                for (attr, string_value) in attributes.iter().zip(string_attr_values.iter()) {
                    builder = builder.attr(
                        get_xml_name_from_axml(&attr.name, &attr.namespace, &current_ns_prefixes),
                        string_value,
                    );

                    let in_res_namespace = attr.namespace.as_deref().is_some_and(|ns| {
                        ns.starts_with(RESOURCES_ROOT_NAMESPACE)
                            || ns == RESOURCES_AUTO_PACKAGE_NAMESPACE
                    });
                    if in_res_namespace && attr.resource_id.is_none() {
                        notes.push(format!(
                            "WARNING: Attribute `{}` is in a resource namespace but has no resource ID",
                            attr.name
                        ));
                    }
                }

                // Add any queued namespaces to this element
                for ns in queued_namespaces.drain(..) {
                    if let Some(prefix) = ns.prefix {
                        builder = builder.ns(prefix, ns.uri);
                    } else {
                        builder = builder.default_ns(ns.uri);
                    }
                }

                writer.write(builder)?;
                for note in notes {
                    writer.write(XmlEvent::comment(&note))?;
                }

                Ok(())
            }
            AxmlEvent::EndElement {
                namespace, name, ..
            } => writer.write(XmlEvent::end_element().name(get_xml_name_from_axml(
                &name,
                &namespace,
                &current_ns_prefixes,
            ))),
            AxmlEvent::StartNamespace(namespace) => {
                if let Some(prefix) = namespace.prefix.clone() {
                    current_ns_prefixes.insert(namespace.uri.clone(), prefix);
                }
                queued_namespaces.push(namespace);
                Ok(())
            }
            AxmlEvent::EndNamespace(namespace) => {
                current_ns_prefixes.remove(&namespace.uri);
                Ok(())
            }
            AxmlEvent::CData { text, .. } => writer.write(XmlEvent::characters(&text)),
            AxmlEvent::Unknown { res_type, .. } => writer.write(XmlEvent::comment(&format!(
                "WARNING: UNKNOWN AXML EVENT. RES_TYPE: {res_type}"
            ))),
        }?
    }

    Ok(())
}

// Converts a binary XML name and namespace into an XmlName struct, which wraps the name and namespace slightly differently.
fn get_xml_name_from_axml<'a>(
    name: &'a str,
    namespace: &'a Option<String>,
    // Map of namespace URIs TO namespace prefixes.
    ns_prefixes: &'a HashMap<String, String>,
) -> XmlName<'a> {
    match namespace {
        Some(ns_uri) => XmlName::qualified(
            name,
            ns_uri,
            ns_prefixes.get(ns_uri).map(|name| name.as_str()),
        ),
        None => XmlName::local(name),
    }
}

/// Converts an attribute value into the text it would have been written as.
fn stringify_attr_value(value: &AxmlAttrValue, raw: Option<&str>) -> String {
    match value {
        AxmlAttrValue::Null => raw.unwrap_or_default().to_string(),
        AxmlAttrValue::String(s) => s.clone(),
        AxmlAttrValue::Boolean(b) => b.to_string(),
        AxmlAttrValue::Integer(i) => i.to_string(),
        AxmlAttrValue::Hex(h) => format!("0x{h:x}"),
        AxmlAttrValue::Reference(0) => "@null".to_string(),
        AxmlAttrValue::Reference(id) | AxmlAttrValue::DynamicReference(id) => {
            format!("@0x{id:08x}")
        }
        AxmlAttrValue::Attribute(id) => format!("?0x{id:08x}"),
        AxmlAttrValue::Float(f) => f.to_string(),
        AxmlAttrValue::Dimension(data) => {
            format_complex(ResValue::new(ValueType::Dimension, *data))
        }
        AxmlAttrValue::Fraction(data) => format_complex(ResValue::new(ValueType::Fraction, *data)),
        AxmlAttrValue::Color(argb) => format!("#{argb:08x}"),
    }
}

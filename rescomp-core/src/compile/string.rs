//! Collects the text of a `<string>`-like element, turning nested markup into style spans.

use anyhow::Result;

use crate::values::{collect_string, utf16_len};
use crate::xml::{NodeData, XmlNode};
use crate::{PseudoMethod, Pseudolocalizer, SourcePos, StyleSpan, XLIFF_XMLNS};

const XLIFF_ELEMENTS: &[&str] = &["bpt", "ept", "it", "ph", "g", "bx", "ex", "x"];

/// The text of a value element, with its spans if it had markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyledString {
    pub text: String,
    pub spans: Vec<StyleSpan>,
}

struct Collector {
    styled: bool,
    formatted: bool,
    pseudo: Option<Pseudolocalizer>,
    xliff_depth: usize,
    // Text since the last tag boundary
    current: String,
    // Unprocessed text of everything before `current`
    raw: String,
    // Processed text of everything before `current`
    collected: String,
    spans: Vec<StyleSpan>,
}

/// Reads the contents of `element`.
///
/// Plain text comes back unprocessed, since escapes and quoting are handled when the value is
/// coerced. Text with markup is processed here so that span positions refer to the final string.
pub fn parse_styled_string(
    element: &XmlNode,
    styled: bool,
    formatted: bool,
    pseudo: PseudoMethod,
) -> Result<StyledString> {
    // References are never pseudolocalized
    let is_reference =
        first_text(element).is_some_and(|text| text.trim_start().starts_with('@'));
    let pseudo =
        (pseudo != PseudoMethod::None && !is_reference).then(|| Pseudolocalizer::new(pseudo));

    let mut collector = Collector {
        styled,
        formatted,
        pseudo,
        xliff_depth: 0,
        current: String::new(),
        raw: String::new(),
        collected: String::new(),
        spans: Vec::new(),
    };
    if let Some(pseudo) = &mut collector.pseudo {
        collector.current.push_str(&pseudo.start());
    }
    collector.walk_children(element)?;
    if let Some(pseudo) = &mut collector.pseudo {
        collector.current.push_str(&pseudo.end());
    }

    if collector.spans.is_empty() {
        collector.raw.push_str(&collector.current);
        Ok(StyledString {
            text: collector.raw,
            spans: Vec::new(),
        })
    } else {
        collector.flush(&element.pos)?;
        Ok(StyledString {
            text: collector.collected,
            spans: collector.spans,
        })
    }
}

fn first_text(node: &XmlNode) -> Option<&str> {
    node.children.iter().find_map(|child| match &child.data {
        NodeData::CData(text) => Some(text.as_str()),
        _ => first_text(child),
    })
}

impl Collector {
    fn walk_children(&mut self, node: &XmlNode) -> Result<()> {
        for child in &node.children {
            match &child.data {
                NodeData::CData(text) => self.text(&child.pos, text)?,
                NodeData::Element {
                    namespace,
                    name,
                    attributes,
                } => {
                    if namespace == XLIFF_XMLNS {
                        if !XLIFF_ELEMENTS.contains(&name.as_str()) {
                            return Err(child
                                .pos
                                .error(format!("Found unsupported XLIFF tag <{name}>")));
                        }
                        // Placeholder contents are kept verbatim
                        self.xliff_depth += 1;
                        self.walk_children(child)?;
                        self.xliff_depth -= 1;
                        continue;
                    }

                    if !self.styled {
                        return Err(child.pos.error(format!(
                            "Found style tag <{name}> where styles are not allowed"
                        )));
                    }

                    self.flush(&child.pos)?;
                    let mut span_name = name.clone();
                    for attr in attributes {
                        span_name.push(';');
                        span_name.push_str(&attr.name);
                        span_name.push('=');
                        span_name.push_str(&attr.string);
                    }
                    let first_char = utf16_len(&self.collected);

                    self.walk_children(child)?;
                    self.flush(&child.pos)?;

                    let len = utf16_len(&self.collected);
                    if len > first_char {
                        self.spans.push(StyleSpan {
                            name: span_name,
                            first_char,
                            last_char: len - 1,
                        });
                    }
                }
                NodeData::Namespace { .. } => self.walk_children(child)?,
            }
        }
        Ok(())
    }

    fn text(&mut self, pos: &SourcePos, text: &str) -> Result<()> {
        match &mut self.pseudo {
            Some(pseudo) if self.xliff_depth == 0 => {
                let transformed = pseudo.text(text);
                self.current.push_str(&transformed);
            }
            _ => {
                if self.formatted && has_substitution_errors(text) {
                    return Err(pos.error(
                        "Multiple substitutions specified in non-positional format; \
                         did you mean to add the formatted=\"false\" attribute?",
                    ));
                }
                self.current.push_str(text);
            }
        }
        Ok(())
    }

    // Processes the pending text at a tag boundary.
    fn flush(&mut self, pos: &SourcePos) -> Result<()> {
        let current = std::mem::take(&mut self.current);
        let processed = collect_string(&current, false)
            .map_err(|msg| pos.error(format!("{msg} (in {current})")))?;
        self.collected.push_str(&processed);
        self.raw.push_str(&current);
        Ok(())
    }
}

/// Whether `text` has more than one format substitution with any of them not positional
/// (`%s %d` rather than `%1$s %2$d`). Strings meant for time formatting are never errors.
pub fn has_substitution_errors(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let at = |i: usize| chars.get(i).copied().unwrap_or('\0');
    let mut non_positional = false;
    let mut arg_count = 0;

    let mut p = 0;
    while p < chars.len() {
        if chars[p] == '%' && p + 1 < chars.len() {
            p += 1;
            if chars[p] == '%' {
                p += 1;
                continue;
            }

            arg_count += 1;
            if at(p).is_ascii_digit() {
                while at(p).is_ascii_digit() {
                    p += 1;
                }
                if at(p) != '$' {
                    // A width, not a position
                    non_positional = true;
                }
            } else if at(p) == '<' {
                // Reuses the previous argument
                non_positional = true;
                p += 1;
                if at(p) == '$' {
                    p += 1;
                }
            } else {
                non_positional = true;
            }

            while p < chars.len()
                && matches!(chars[p], '-' | '#' | '+' | ' ' | ',' | '(' | '0'..='9')
            {
                p += 1;
            }

            // Conversions only Time.format() has
            if matches!(at(p), 'D' | 'K' | 'M' | 'W' | 'Z' | 'k' | 'm' | 'w' | 'y' | 'z') {
                return false;
            }
        }
        p += 1;
    }

    arg_count > 1 && non_positional
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(xml: &str) -> XmlNode {
        let root = XmlNode::parse("strings.xml", xml.as_bytes()).unwrap();
        root.root_element().unwrap().clone()
    }

    #[test]
    fn plain_text_is_left_for_coercion() {
        let s = parse_styled_string(
            &element(r#"<string name="a">  Don\'t   "stop"  </string>"#),
            true,
            true,
            PseudoMethod::None,
        )
        .unwrap();
        assert_eq!(s.text, r#"  Don\'t   "stop"  "#);
        assert!(s.spans.is_empty());
    }

    #[test]
    fn markup_becomes_spans() {
        let s = parse_styled_string(
            &element(concat!(
                r#"<string name="a">Hello <b>big <i>wide</i></b>  world "#,
                r#"<font color="red">x</font></string>"#
            )),
            true,
            true,
            PseudoMethod::None,
        )
        .unwrap();
        assert_eq!(s.text, "Hello big wide world x");
        assert_eq!(
            s.spans,
            vec![
                StyleSpan {
                    name: "i".into(),
                    first_char: 10,
                    last_char: 13
                },
                StyleSpan {
                    name: "b".into(),
                    first_char: 6,
                    last_char: 13
                },
                StyleSpan {
                    name: "font;color=red".into(),
                    first_char: 21,
                    last_char: 21
                },
            ]
        );
    }

    #[test]
    fn markup_needs_a_styled_value() {
        let err = parse_styled_string(
            &element(r#"<color name="a"><b>#fff</b></color>"#),
            false,
            true,
            PseudoMethod::None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Found style tag <b> where styles are not allowed"));
    }

    #[test]
    fn xliff_placeholders_are_transparent() {
        let s = parse_styled_string(
            &element(
                r#"<string name="a" xmlns:xliff="urn:oasis:names:tc:xliff:document:1.2">Hi <xliff:g id="n">%1$s</xliff:g></string>"#,
            ),
            true,
            true,
            PseudoMethod::Accented,
        )
        .unwrap();
        assert!(s.text.starts_with("[Ĥî "));
        assert!(s.text.contains("%1$s"));
        assert!(s.text.ends_with(']'));
    }

    #[test]
    fn references_are_not_pseudolocalized() {
        let s = parse_styled_string(
            &element(r#"<string name="a">@string/other</string>"#),
            true,
            true,
            PseudoMethod::Accented,
        )
        .unwrap();
        assert_eq!(s.text, "@string/other");
    }

    #[test]
    fn substitution_checks() {
        assert!(has_substitution_errors("%s and %d"));
        assert!(has_substitution_errors("%1$s and %d"));
        assert!(!has_substitution_errors("%1$s and %2$d"));
        assert!(!has_substitution_errors("only %s"));
        assert!(!has_substitution_errors("100%% of %s"));
        assert!(!has_substitution_errors("%-m %d"));

        let err = parse_styled_string(
            &element(r#"<string name="a">%s of %s</string>"#),
            true,
            true,
            PseudoMethod::None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("formatted=\"false\""));
    }
}

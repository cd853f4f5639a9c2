//! Pseudolocalization: synthesizes `en-rXA` (accented) and `ar-rXB` (bidi) variants of the
//! default strings, so untranslated or badly laid out text is easy to spot on a device.

const RLM: char = '\u{200f}';
const RLO: char = '\u{202e}';
const PDF: char = '\u{202c}';

const EXPANSION: &str = "one two three four five six seven eight nine ten eleven twelve thirteen \
fourteen fiveteen sixteen seventeen nineteen twenty";

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PseudoMethod {
    None,
    Accented,
    Bidi,
}

/// Stateful text transformer. `start`/`end` bracket one string, and `text` may be called any
/// number of times in between, once per run of text between markup tags.
#[derive(Debug)]
pub struct Pseudolocalizer {
    method: PseudoMethod,
    last_depth: usize,
    depth: usize,
    word_count: usize,
    length: usize,
}

impl Pseudolocalizer {
    pub fn new(method: PseudoMethod) -> Self {
        Self {
            method,
            last_depth: 0,
            depth: 0,
            word_count: 0,
            length: 0,
        }
    }

    pub fn start(&mut self) -> String {
        if self.method == PseudoMethod::None {
            return String::new();
        }
        self.last_depth += 1;
        if self.last_depth != 1 || self.method != PseudoMethod::Accented {
            return String::new();
        }

        let result = if self.depth == 0 { "[" } else { "" };
        self.word_count = 0;
        self.length = 0;
        self.depth += 1;
        result.to_string()
    }

    pub fn end(&mut self) -> String {
        if self.method == PseudoMethod::None || self.last_depth == 0 {
            return String::new();
        }
        self.last_depth -= 1;
        if self.last_depth != 0 || self.method != PseudoMethod::Accented {
            return String::new();
        }

        let mut result = String::new();
        if self.length > 0 {
            result.push(' ');
            let target = if self.word_count > 3 {
                self.length
            } else {
                self.length / 2
            };
            result.push_str(&generate_expansion(target));
        }
        self.word_count = 0;
        self.length = 0;
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            result.push(']');
        }
        result
    }

    pub fn text(&mut self, text: &str) -> String {
        match self.method {
            PseudoMethod::None => text.to_string(),
            PseudoMethod::Accented => self.accent_text(text),
            PseudoMethod::Bidi => bidi_text(text),
        }
    }

    fn accent_text(&mut self, source: &str) -> String {
        let chars: Vec<char> = source.chars().collect();
        let mut result = String::with_capacity(source.len() * 2);
        let mut last_space = true;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '%' {
                // Placeholder syntax, no need to pseudolocalize
                let mut chunk = String::from(c);
                let mut last = c;
                let mut end = false;
                while !end && i + 1 < chars.len() {
                    i += 1;
                    last = chars[i];
                    chunk.push(last);
                    if is_possible_normal_placeholder_end(last) {
                        end = true;
                    } else if i + 1 < chars.len() && last == 't' {
                        i += 1;
                        last = chars[i];
                        chunk.push(last);
                        end = true;
                    }
                }
                if last == '%' {
                    result.push_str(&chunk);
                } else {
                    result.push('\u{bb}');
                    result.push_str(&chunk);
                    result.push('\u{ab}');
                }
            } else if c == '<' || c == '&' {
                // Markup and entities are copied as is
                let close = if c == '<' { '>' } else { ';' };
                while i < chars.len() {
                    result.push(chars[i]);
                    if chars[i] == close {
                        break;
                    }
                    i += 1;
                }
            } else if c == '\\' && i + 1 < chars.len() {
                result.push(c);
                i += 1;
                result.push(chars[i]);
            } else {
                result.push(accent_char(c).unwrap_or(c));
                let space = c.is_whitespace();
                if last_space && !space {
                    self.word_count += 1;
                }
                last_space = space;
                self.length += 1;
            }
            i += 1;
        }
        result
    }
}

fn is_possible_normal_placeholder_end(c: char) -> bool {
    matches!(
        c,
        's' | 'S'
            | 'c'
            | 'C'
            | 'd'
            | 'o'
            | 'x'
            | 'X'
            | 'f'
            | 'e'
            | 'E'
            | 'g'
            | 'G'
            | 'a'
            | 'A'
            | 'b'
            | 'B'
            | 'h'
            | 'H'
            | '%'
            | 'n'
            | 'p'
    )
}

// Padding of whole words, at least `length` characters long.
fn generate_expansion(length: usize) -> String {
    let mut result = EXPANSION.to_string();
    if result.len() < length {
        result.push(' ');
        let remaining = length - result.len();
        result.push_str(&generate_expansion(remaining));
        return result;
    }

    let cut = EXPANSION[length..]
        .find(' ')
        .map(|pos| length + pos)
        .unwrap_or(EXPANSION.len());
    result.truncate(cut);
    result
}

fn accent_char(c: char) -> Option<char> {
    Some(match c {
        'a' => '\u{e5}',
        'b' => '\u{253}',
        'c' => '\u{e7}',
        'd' => '\u{f0}',
        'e' => '\u{e9}',
        'f' => '\u{192}',
        'g' => '\u{11d}',
        'h' => '\u{125}',
        'i' => '\u{ee}',
        'j' => '\u{135}',
        'k' => '\u{137}',
        'l' => '\u{13c}',
        'm' => '\u{1e3f}',
        'n' => '\u{f1}',
        'o' => '\u{f6}',
        'p' => '\u{fe}',
        'q' => '\u{51}',
        'r' => '\u{155}',
        's' => '\u{161}',
        't' => '\u{163}',
        'u' => '\u{fb}',
        'v' => '\u{56}',
        'w' => '\u{175}',
        'x' => '\u{445}',
        'y' => '\u{fd}',
        'z' => '\u{17e}',
        'A' => '\u{c5}',
        'B' => '\u{3b2}',
        'C' => '\u{c7}',
        'D' => '\u{d0}',
        'E' => '\u{c9}',
        'G' => '\u{11c}',
        'H' => '\u{124}',
        'I' => '\u{ce}',
        'J' => '\u{134}',
        'K' => '\u{136}',
        'L' => '\u{13b}',
        'M' => '\u{1e3e}',
        'N' => '\u{d1}',
        'O' => '\u{d6}',
        'P' => '\u{de}',
        'Q' => '\u{71}',
        'R' => '\u{154}',
        'S' => '\u{160}',
        'T' => '\u{162}',
        'U' => '\u{db}',
        'V' => '\u{3bd}',
        'W' => '\u{174}',
        'X' => '\u{d7}',
        'Y' => '\u{dd}',
        'Z' => '\u{17d}',
        '!' => '\u{a1}',
        '?' => '\u{bf}',
        '$' => '\u{20ac}',
        _ => return None,
    })
}

fn bidi_text(source: &str) -> String {
    let mut result = String::with_capacity(source.len() * 2);
    let mut last_space = true;
    let mut escape = false;
    for c in source.chars() {
        if !escape && c == '\\' {
            escape = true;
            continue;
        }
        let space = (!escape && c.is_whitespace()) || (escape && (c == 'n' || c == 't'));
        if last_space && !space {
            // Word start
            result.push(RLM);
            result.push(RLO);
        } else if !last_space && space {
            // Word end
            result.push(PDF);
            result.push(RLM);
        }
        last_space = space;
        if escape {
            result.push('\\');
            escape = false;
        }
        result.push(c);
    }
    if !last_space {
        result.push(PDF);
        result.push(RLM);
    }
    result
}

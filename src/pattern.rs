//! Pattern compilation and versioninfo expansion
//!
//! A match rule carries two compiled artifacts: a byte-level regex built
//! from the rule's escape-encoded pattern text, and a versioninfo
//! template whose fields are expanded against the capture groups of a
//! successful match. Both are immutable once built; a pattern that fails
//! to compile never matches and the parser drops its rule.

use regex::bytes::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::escape;

/// Compile options taken from the directive flag string. Recognized
/// letters are `i` (case-insensitive) and `s` (dot matches newline);
/// anything else is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub dot_matches_newline: bool,
}

impl PatternFlags {
    pub fn parse(flags: &str) -> Self {
        let mut parsed = Self::default();
        for letter in flags.chars() {
            match letter {
                'i' => parsed.case_insensitive = true,
                's' => parsed.dot_matches_newline = true,
                _ => {}
            }
        }
        parsed
    }
}

/// A compiled match pattern alongside its probe-file source text.
///
/// The engine is rebuilt from `source` + `flags` whenever the pattern is
/// reconstructed from a serialized catalogue; an engine-less pattern
/// never matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePattern {
    /// Pattern text exactly as it appeared in the probe file
    pub source: String,
    pub flags: PatternFlags,
    #[serde(skip)]
    engine: Option<Regex>,
}

impl ServicePattern {
    /// Compile escape-encoded pattern text into a byte-level engine.
    pub fn compile(source: &str, flags: PatternFlags) -> std::result::Result<Self, regex::Error> {
        let engine = build_engine(source, flags)?;
        Ok(Self {
            source: source.to_string(),
            flags,
            engine: Some(engine),
        })
    }

    /// Rebuild the engine after deserialization.
    pub fn recompile(&mut self) -> std::result::Result<(), regex::Error> {
        self.engine = Some(build_engine(&self.source, self.flags)?);
        Ok(())
    }

    /// Whether the engine finds a match anywhere in the response bytes.
    pub fn is_match(&self, response: &[u8]) -> bool {
        match &self.engine {
            Some(engine) => engine.is_match(response),
            None => false,
        }
    }

    /// Capture groups of the first match in the response, if any.
    pub fn captures<'r>(&self, response: &'r [u8]) -> Option<Captures<'r>> {
        self.engine.as_ref()?.captures(response)
    }

    /// Whether the pattern currently holds a usable engine.
    pub fn is_compiled(&self) -> bool {
        self.engine.is_some()
    }
}

impl PartialEq for ServicePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

fn build_engine(source: &str, flags: PatternFlags) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(&escape::decode_pattern(source))
        .unicode(false)
        .case_insensitive(flags.case_insensitive)
        .dot_matches_new_line(flags.dot_matches_newline)
        .build()
}

/// Expanded versioninfo fields of a successful match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extras {
    pub product: String,
    pub version: String,
    pub info: String,
    pub hostname: String,
    pub os: String,
    pub device_type: String,
    pub cpe: Vec<String>,
}

/// Parsed versioninfo template: one optional field per classification
/// slot plus any number of CPE entries. Field values still contain `$n`
/// placeholders and escape sequences; expansion happens per response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionTemplate {
    pub product: Option<String>,
    pub version: Option<String>,
    pub info: Option<String>,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub device_type: Option<String>,
    pub cpe: Vec<String>,
}

impl VersionTemplate {
    /// Parse the versioninfo segment of a match directive.
    ///
    /// Fields are `p v i h o d` and `cpe:`, each followed by its own
    /// delimiter character; the field body runs to the next occurrence
    /// of that delimiter. Unterminated fields and stray characters are
    /// skipped.
    pub fn parse(template: &str) -> Self {
        let chars: Vec<char> = template.chars().collect();
        let mut parsed = Self::default();
        let mut i = 0;

        while i < chars.len() {
            if chars[i].is_whitespace() {
                i += 1;
                continue;
            }

            let key = chars[i];
            let key_len = if chars[i..].starts_with(&['c', 'p', 'e', ':']) {
                4
            } else if matches!(key, 'p' | 'v' | 'i' | 'h' | 'o' | 'd') {
                1
            } else {
                i += 1;
                continue;
            };

            let Some(&delimiter) = chars.get(i + key_len) else {
                break;
            };
            let body_start = i + key_len + 1;
            let Some(body_len) = chars[body_start..].iter().position(|&c| c == delimiter) else {
                break;
            };
            let value: String = chars[body_start..body_start + body_len].iter().collect();

            if key_len == 4 {
                parsed.cpe.push(value);
            } else {
                match key {
                    'p' => parsed.product = Some(value),
                    'v' => parsed.version = Some(value),
                    'i' => parsed.info = Some(value),
                    'h' => parsed.hostname = Some(value),
                    'o' => parsed.os = Some(value),
                    'd' => parsed.device_type = Some(value),
                    _ => unreachable!(),
                }
            }
            i = body_start + body_len + 1;
        }

        parsed
    }

    /// Expand every field against the capture groups of a match.
    pub fn expand(&self, caps: &Captures<'_>) -> Extras {
        let field = |slot: &Option<String>| {
            slot.as_deref()
                .map(|template| expand_field(template, caps))
                .unwrap_or_default()
        };

        Extras {
            product: field(&self.product),
            version: field(&self.version),
            info: field(&self.info),
            hostname: field(&self.hostname),
            os: field(&self.os),
            device_type: field(&self.device_type),
            cpe: self.cpe.iter().map(|entry| expand_field(entry, caps)).collect(),
        }
    }
}

/// Substitute `$1`, `$2`, ... with capture groups, then decode escape
/// sequences in the result. A reference to a nonexistent or unmatched
/// group expands to nothing.
fn expand_field(template: &str, caps: &Captures<'_>) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut substituted = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
            let mut end = i + 1;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
            let group: usize = chars[i + 1..end]
                .iter()
                .collect::<String>()
                .parse()
                .unwrap_or(usize::MAX);
            if let Some(capture) = caps.get(group) {
                substituted.push_str(&String::from_utf8_lossy(capture.as_bytes()));
            }
            i = end;
        } else {
            substituted.push(chars[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&escape::decode_data(&substituted)).into_owned()
}

//! Mechanical remedies for the Deterministic tier.
//!
//! Each fixer looks at one line and the violations reported on it, and
//! either rewrites the line, deletes it, or leaves it for escalation.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::domain::Violation;
use crate::patch::{Document, PatchOperation};

/// Entities whose same-named attribute Asciidoctor defines out of the box.
const BUILTIN_ATTRIBUTES: &[&str] = &[
    "nbsp", "zwsp", "wj", "lsquo", "rsquo", "ldquo", "rdquo", "deg", "plus", "brvbar",
];

/// Entities rewritten to an attribute that Asciidoctor does not define.
/// The docs must set these, usually in a shared attributes include, or
/// `{name}` renders as an unresolved reference.
const DOCUMENT_ATTRIBUTES: &[&str] = &[
    "mdash", "ndash", "hellip", "copy", "reg", "trade", "times", "rarr", "larr", "harr",
    "laquo", "raquo", "bull", "middot", "sect", "para", "micro", "plusmn", "ne", "le", "ge",
];

/// XML predefined entities; DITA supports these as-is.
const XML_ENTITIES: &[&str] = &["amp", "lt", "gt", "apos", "quot"];

/// What to do with a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineFix {
    Rewrite(String),
    Delete,
}

/// Edits for one document plus the violations they do not address.
#[derive(Debug, Default)]
pub struct FixPlan {
    pub ops: Vec<PatchOperation>,
    pub fixed: usize,
    pub untouched: Vec<Violation>,
}

/// Whether `&name;` is rewritten to the attribute reference `{name}`,
/// either built in or expected from the docs' own attribute definitions.
pub fn has_attribute_form(name: &str) -> bool {
    (BUILTIN_ATTRIBUTES.contains(&name) || DOCUMENT_ATTRIBUTES.contains(&name))
        && !XML_ENTITIES.contains(&name)
}

/// Whether `&name;` is one of the XML predefined entities.
pub fn is_xml_entity(name: &str) -> bool {
    XML_ENTITIES.contains(&name)
}

/// Whether `rule` has a mechanical fixer.
pub fn has_fixer(rule: &str) -> bool {
    matches!(
        rule,
        "EntityReference" | "LineBreak" | "PageBreak" | "ThematicBreak"
    )
}

/// Compute the fix for one line, given the violations reported on it.
///
/// Returns `None` when the line cannot be fixed mechanically.
pub fn remedy_line(rule: &str, line: &str, violations: &[&Violation]) -> Option<LineFix> {
    match rule {
        "EntityReference" => fix_entities(line, violations).map(LineFix::Rewrite),
        "LineBreak" => {
            let trimmed = line.trim_end();
            let kept = trimmed.strip_suffix(" +")?;
            Some(LineFix::Rewrite(kept.trim_end().to_string()))
        }
        "PageBreak" => (line.trim() == "<<<").then_some(LineFix::Delete),
        "ThematicBreak" => {
            matches!(line.trim(), "'''" | "---" | "***").then_some(LineFix::Delete)
        }
        _ => None,
    }
}

/// Build the edits for every violation of `rule` in `doc`.
///
/// Violations on one line are merged into a single replacement.
pub fn plan(rule: &str, doc: &Document, violations: &[Violation]) -> FixPlan {
    let mut by_line: BTreeMap<usize, Vec<&Violation>> = BTreeMap::new();
    for v in violations.iter().filter(|v| v.rule == rule) {
        by_line.entry(v.line).or_default().push(v);
    }

    let mut out = FixPlan::default();
    for (line_no, on_line) in by_line {
        let fix = doc
            .line(line_no)
            .and_then(|text| remedy_line(rule, text, &on_line));
        match fix {
            Some(LineFix::Rewrite(text)) => {
                if doc.line(line_no) == Some(text.as_str()) {
                    out.untouched.extend(on_line.into_iter().cloned());
                    continue;
                }
                out.ops.push(PatchOperation::replace(line_no, text));
                out.fixed += on_line.len();
            }
            Some(LineFix::Delete) => {
                out.ops.push(PatchOperation::delete(line_no));
                out.fixed += on_line.len();
            }
            None => out.untouched.extend(on_line.into_iter().cloned()),
        }
    }
    out
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&([A-Za-z][A-Za-z0-9]*);|\{([A-Za-z][A-Za-z0-9]*)\};")
            .unwrap_or_else(|e| panic!("invalid entity pattern: {e}"))
    })
}

fn convert_entities(text: &str) -> String {
    entity_regex()
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if has_attribute_form(name) {
                format!("{{{name}}}")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Rewrite the reported spans right-to-left, or the whole line when the
/// linter gave no usable spans.
fn fix_entities(line: &str, violations: &[&Violation]) -> Option<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut spans: Vec<(usize, usize)> = violations.iter().filter_map(|v| v.span).collect();
    let usable = !spans.is_empty()
        && spans.len() == violations.len()
        && spans.iter().all(|&(s, e)| s >= 1 && e >= s && e <= chars.len());

    let fixed = if usable {
        spans.sort_unstable();
        spans.dedup();
        if spans.windows(2).any(|w| w[0].1 >= w[1].0) {
            convert_entities(line)
        } else {
            let mut out = chars;
            for &(start, end) in spans.iter().rev() {
                let original: String = out[start - 1..end].iter().collect();
                let converted = convert_entities(&original);
                out.splice(start - 1..end, converted.chars());
            }
            let rewritten: String = out.into_iter().collect();
            if rewritten == line {
                // Spans did not line up with an entity.
                convert_entities(line)
            } else {
                rewritten
            }
        }
    } else {
        convert_entities(line)
    };
    (fixed != line).then_some(fixed)
}

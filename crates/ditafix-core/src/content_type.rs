//! Content-type attribute detection and resolution.
//!
//! A module declares its DITA topic type with
//! `:_mod-docs-content-type: <VALUE>`. Older modules use
//! `:_content-type:` or `:_module-type:`, and some carry the current form
//! commented out. Resolution precedence:
//!
//! 1. a deprecated form anywhere in the file (its value moves to the top)
//! 2. a recognised filename prefix (`con_`, `proc_`, ...)
//! 3. the `TBD` placeholder, flagged for review
//!
//! Only the first attribute found top-down is considered.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::annotator::CommentAnnotator;
use crate::domain::{FixRule, RemedyError};
use crate::patch::{Document, PatchOperation};

pub const CURRENT_ATTRIBUTE: &str = "_mod-docs-content-type";
pub const PLACEHOLDER: &str = "TBD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Assembly,
    Concept,
    Procedure,
    Reference,
    Snippet,
}

impl ContentType {
    /// Parse a value case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ASSEMBLY" => Some(Self::Assembly),
            "CONCEPT" => Some(Self::Concept),
            "PROCEDURE" => Some(Self::Procedure),
            "REFERENCE" => Some(Self::Reference),
            "SNIPPET" => Some(Self::Snippet),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assembly => "ASSEMBLY",
            Self::Concept => "CONCEPT",
            Self::Procedure => "PROCEDURE",
            Self::Reference => "REFERENCE",
            Self::Snippet => "SNIPPET",
        }
    }

    /// Type implied by a module's file name prefix.
    pub fn from_file_name(path: &Path) -> Option<Self> {
        const PREFIXES: &[(&str, ContentType)] = &[
            ("assembly", ContentType::Assembly),
            ("con", ContentType::Concept),
            ("proc", ContentType::Procedure),
            ("ref", ContentType::Reference),
            ("snip", ContentType::Snippet),
        ];
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        PREFIXES.iter().find_map(|(prefix, ty)| {
            let rest = name.strip_prefix(prefix)?;
            (rest.starts_with('_') || rest.starts_with('-')).then_some(*ty)
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTypeForm {
    /// `:_mod-docs-content-type: VALUE`
    Current,
    /// `//:_mod-docs-content-type: VALUE`
    Commented,
    /// `:_content-type: VALUE`
    DeprecatedContent,
    /// `:_module-type: VALUE`
    DeprecatedModule,
}

impl ContentTypeForm {
    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::DeprecatedContent | Self::DeprecatedModule)
    }
}

/// The first content-type attribute found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeAttribute {
    /// Raw value as written.
    pub value: String,
    /// 0-based index of the attribute line.
    pub source_line_index: usize,
    pub form: ContentTypeForm,
}

impl ContentTypeAttribute {
    /// The parsed value, if valid.
    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::parse(&self.value)
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.trim().eq_ignore_ascii_case(PLACEHOLDER)
    }
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(//\s*)?:(_mod-docs-content-type|_content-type|_module-type):\s*(.*?)\s*$")
            .unwrap_or_else(|e| panic!("invalid content type pattern: {e}"))
    })
}

/// Find the first content-type attribute, top-down.
pub fn detect(lines: &[String]) -> Option<ContentTypeAttribute> {
    let re = attribute_regex();
    lines.iter().enumerate().find_map(|(index, line)| {
        let caps = re.captures(line)?;
        let commented = caps.get(1).is_some();
        let form = match (&caps[2], commented) {
            ("_mod-docs-content-type", false) => ContentTypeForm::Current,
            ("_mod-docs-content-type", true) => ContentTypeForm::Commented,
            ("_content-type", false) => ContentTypeForm::DeprecatedContent,
            ("_module-type", false) => ContentTypeForm::DeprecatedModule,
            _ => return None,
        };
        Some(ContentTypeAttribute {
            value: caps[3].to_string(),
            source_line_index: index,
            form,
        })
    })
}

/// Whether the document declares a valid, non-placeholder type in the
/// current form.
pub fn has_resolved_type(lines: &[String]) -> bool {
    detect(lines).is_some_and(|attr| {
        attr.form == ContentTypeForm::Current && attr.content_type().is_some()
    })
}

fn current_line(value: &str) -> String {
    format!(":{CURRENT_ATTRIBUTE}: {value}")
}

/// How the final value was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// A valid current attribute was already present.
    Existing,
    /// A commented-out current attribute was uncommented.
    Uncommented,
    /// The value of a deprecated attribute was moved.
    Deprecated,
    FilenamePrefix,
    Placeholder,
}

/// Result of resolving one document.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Final value, upper case, or `TBD`.
    pub value: String,
    pub source: ResolutionSource,
    /// Edits to apply, against the unmodified document.
    pub ops: Vec<PatchOperation>,
    /// 1-based line of the attribute that still needs review, when the
    /// placeholder was used.
    pub flagged_line: Option<usize>,
    /// Invalid value that was recovered from.
    pub invalid_value: Option<String>,
}

impl Resolution {
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Computes the content-type edits for a document.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeResolver {
    annotator: CommentAnnotator,
}

impl ContentTypeResolver {
    pub fn new(annotator: CommentAnnotator) -> Self {
        Self { annotator }
    }

    /// Resolve the content type of `doc`, stored at `path`.
    ///
    /// `rule` is the ContentType rule whose instruction goes into the
    /// placeholder flag.
    pub fn resolve(&self, path: &Path, doc: &Document, rule: &FixRule) -> Resolution {
        let lines = doc.lines();
        let Some(attr) = detect(lines) else {
            return self.insert_fallback(path, doc, rule, None);
        };
        let line = attr.source_line_index + 1;
        let parsed = attr.content_type();

        match (attr.form, parsed) {
            (ContentTypeForm::Current, Some(ty)) => {
                let canonical = current_line(ty.as_str());
                let ops = if lines[attr.source_line_index] == canonical {
                    Vec::new()
                } else {
                    vec![PatchOperation::replace(line, canonical)]
                };
                Resolution {
                    value: ty.as_str().to_string(),
                    source: ResolutionSource::Existing,
                    ops,
                    flagged_line: None,
                    invalid_value: None,
                }
            }
            (ContentTypeForm::Commented, Some(ty)) => {
                debug!(path = %path.display(), line, "uncommenting content type");
                Resolution {
                    value: ty.as_str().to_string(),
                    source: ResolutionSource::Uncommented,
                    ops: vec![rewrite_in_place(lines, attr.source_line_index, ty.as_str())],
                    flagged_line: None,
                    invalid_value: None,
                }
            }
            (form, Some(ty)) if form.is_deprecated() => {
                debug!(path = %path.display(), line, value = %ty, "moving deprecated content type");
                let mut ops = vec![delete_attribute(lines, attr.source_line_index)];
                ops.push(PatchOperation::insert_attribute(1, current_line(ty.as_str())));
                Resolution {
                    value: ty.as_str().to_string(),
                    source: ResolutionSource::Deprecated,
                    ops,
                    flagged_line: None,
                    invalid_value: None,
                }
            }
            (ContentTypeForm::Current, None) if attr.is_placeholder() => {
                match ContentType::from_file_name(path) {
                    Some(ty) => Resolution {
                        value: ty.as_str().to_string(),
                        source: ResolutionSource::FilenamePrefix,
                        ops: vec![PatchOperation::replace(line, current_line(ty.as_str()))],
                        flagged_line: None,
                        invalid_value: None,
                    },
                    None => {
                        let ops = self.flag_unless_flagged(doc, line, rule);
                        Resolution {
                            value: PLACEHOLDER.to_string(),
                            source: ResolutionSource::Placeholder,
                            flagged_line: Some(line + ops.len()),
                            ops,
                            invalid_value: None,
                        }
                    }
                }
            }
            (_, _) => {
                let invalid_value = if attr.is_placeholder() {
                    None
                } else {
                    let err = RemedyError::InvalidContentTypeValue {
                        value: attr.value.clone(),
                    };
                    warn!(path = %path.display(), line, error = %err, "falling back from invalid content type");
                    Some(attr.value.clone())
                };
                if attr.form.is_deprecated() {
                    let mut res = self.insert_fallback(path, doc, rule, Some(attr.source_line_index));
                    res.invalid_value = invalid_value;
                    res
                } else {
                    let (value, source) = fallback_value(path);
                    let mut ops = Vec::new();
                    let mut flagged_line = None;
                    if source == ResolutionSource::Placeholder {
                        ops = self.flag_unless_flagged(doc, line, rule);
                        flagged_line = Some(line + ops.len());
                    }
                    ops.push(rewrite_in_place(lines, attr.source_line_index, &value));
                    Resolution {
                        value,
                        source,
                        ops,
                        flagged_line,
                        invalid_value,
                    }
                }
            }
        }
    }

    fn flag_unless_flagged(&self, doc: &Document, line: usize, rule: &FixRule) -> Vec<PatchOperation> {
        if CommentAnnotator::is_flagged(doc, line, &rule.name) {
            Vec::new()
        } else {
            vec![PatchOperation::insert_above(line, self.annotator.flag_text(rule))]
        }
    }

    /// Insert a prefix or placeholder attribute at the top, optionally
    /// deleting a deprecated line at `remove`.
    fn insert_fallback(
        &self,
        path: &Path,
        doc: &Document,
        rule: &FixRule,
        remove: Option<usize>,
    ) -> Resolution {
        let (value, source) = fallback_value(path);
        let mut ops = Vec::new();
        if let Some(index) = remove {
            ops.push(delete_attribute(doc.lines(), index));
        }
        let mut flagged_line = None;
        if source == ResolutionSource::Placeholder {
            ops.push(PatchOperation::insert_above(1, self.annotator.flag_text(rule)));
            flagged_line = Some(2);
        }
        ops.push(PatchOperation::insert_attribute(1, current_line(&value)));
        Resolution {
            value,
            source,
            ops,
            flagged_line,
            invalid_value: None,
        }
    }
}

fn fallback_value(path: &Path) -> (String, ResolutionSource) {
    match ContentType::from_file_name(path) {
        Some(ty) => (ty.as_str().to_string(), ResolutionSource::FilenamePrefix),
        None => (PLACEHOLDER.to_string(), ResolutionSource::Placeholder),
    }
}

fn blank_run_after(lines: &[String], index: usize) -> usize {
    lines[index + 1..]
        .iter()
        .take_while(|l| l.trim().is_empty())
        .count()
}

/// Replace the attribute line and its trailing blank lines with the
/// current form followed by one blank line.
fn rewrite_in_place(lines: &[String], index: usize, value: &str) -> PatchOperation {
    let end = index + 1 + blank_run_after(lines, index);
    PatchOperation::replace_range(index + 1, end, vec![current_line(value), String::new()])
}

/// Delete a deprecated attribute line. Its trailing blank lines go too
/// when it starts the document or follows a blank line.
fn delete_attribute(lines: &[String], index: usize) -> PatchOperation {
    let starts_paragraph = index == 0 || lines[index - 1].trim().is_empty();
    let end = if starts_paragraph {
        index + 1 + blank_run_after(lines, index)
    } else {
        index + 1
    };
    PatchOperation::replace_range(index + 1, end, Vec::new())
}

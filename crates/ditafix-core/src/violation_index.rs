//! Linter output parser.
//!
//! Normalizes the JSON emitted by one linter invocation into [`Violation`]
//! records grouped by file. Two schemas are accepted:
//!
//! - Vale's `--output=JSON` map of `path -> [alert]`
//! - a flat array of `{file, line, rule, message, severity}` records
//!
//! Line numbers are kept exactly as reported, so they always refer to the
//! buffer the linter saw.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::{ParseError, Severity, Violation};

/// One alert in Vale's JSON output.
#[derive(Debug, Deserialize)]
struct ValeAlert {
    #[serde(rename = "Check")]
    check: String,
    #[serde(rename = "Line")]
    line: i64,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "Span", default)]
    span: Option<Vec<i64>>,
    #[serde(rename = "Match", default)]
    matched: Option<String>,
}

/// One record of the flat schema.
#[derive(Debug, Deserialize)]
struct FlatRecord {
    file: String,
    line: i64,
    rule: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    severity: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LinterOutput {
    Vale(BTreeMap<String, Vec<ValeAlert>>),
    Flat(Vec<FlatRecord>),
}

/// Violations of one rule, grouped by file in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationIndex {
    rule: String,
    by_file: BTreeMap<PathBuf, Vec<Violation>>,
}

impl ViolationIndex {
    /// Parse raw linter stdout for `rule`.
    ///
    /// `namespace` is the style prefix stripped from check names
    /// (e.g. `AsciiDocDITA` in `AsciiDocDITA.EntityReference`). Records
    /// for other rules are dropped. Blank output means no violations.
    pub fn parse(raw: &str, rule: &str, namespace: &str) -> Result<Self, ParseError> {
        let mut index = Self {
            rule: rule.to_string(),
            by_file: BTreeMap::new(),
        };
        if raw.trim().is_empty() {
            return Ok(index);
        }

        let value: serde_json::Value = serde_json::from_str(raw)?;
        let output: LinterOutput = serde_json::from_value(value).map_err(|e| {
            ParseError::UnknownSchema(format!("expected Vale map or flat record array: {e}"))
        })?;

        match output {
            LinterOutput::Vale(files) => {
                for (file, alerts) in files {
                    for alert in alerts {
                        let name = strip_namespace(&alert.check, namespace);
                        if name != rule {
                            debug!(check = %alert.check, "dropping alert for another rule");
                            continue;
                        }
                        let line = checked_line(&file, alert.line)?;
                        let mut violation = Violation::new(
                            &file,
                            line,
                            name,
                            alert.message,
                            Severity::parse(&alert.severity),
                        );
                        if let Some(span) = alert.span.as_deref() {
                            if let [start, end] = span {
                                if *start >= 1 && *end >= *start {
                                    violation = violation.with_span(*start as usize, *end as usize);
                                }
                            }
                        }
                        if let Some(m) = alert.matched.filter(|m| !m.is_empty()) {
                            violation = violation.with_match(m);
                        }
                        index.push(violation);
                    }
                }
            }
            LinterOutput::Flat(records) => {
                for rec in records {
                    let name = strip_namespace(&rec.rule, namespace);
                    if name != rule {
                        debug!(rule = %rec.rule, "dropping record for another rule");
                        continue;
                    }
                    let line = checked_line(&rec.file, rec.line)?;
                    index.push(Violation::new(
                        &rec.file,
                        line,
                        name,
                        rec.message,
                        Severity::parse(&rec.severity),
                    ));
                }
            }
        }

        for list in index.by_file.values_mut() {
            list.sort_by_key(|v| (v.line, v.span.map(|s| s.0).unwrap_or(0)));
        }
        Ok(index)
    }

    /// Build an index from already-normalized violations.
    pub fn from_violations(rule: &str, violations: Vec<Violation>) -> Self {
        let mut index = Self {
            rule: rule.to_string(),
            by_file: BTreeMap::new(),
        };
        for v in violations.into_iter().filter(|v| v.rule == rule) {
            index.push(v);
        }
        for list in index.by_file.values_mut() {
            list.sort_by_key(|v| (v.line, v.span.map(|s| s.0).unwrap_or(0)));
        }
        index
    }

    fn push(&mut self, violation: Violation) {
        self.by_file
            .entry(violation.file_path.clone())
            .or_default()
            .push(violation);
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }

    /// Total number of violations across files.
    pub fn len(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    /// Files with at least one violation, in path order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.by_file.keys().map(PathBuf::as_path)
    }

    /// Violations for one file, ordered by line.
    pub fn for_file(&self, file: &Path) -> &[Violation] {
        self.by_file.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate `(file, violations)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[Violation])> {
        self.by_file
            .iter()
            .map(|(k, v)| (k.as_path(), v.as_slice()))
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.by_file.into_values().flatten().collect()
    }
}

fn strip_namespace<'a>(check: &'a str, namespace: &str) -> &'a str {
    check
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(check)
}

fn checked_line(file: &str, line: i64) -> Result<usize, ParseError> {
    if line < 1 {
        return Err(ParseError::InvalidLine {
            file: file.to_string(),
            line,
        });
    }
    Ok(line as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALE_OUTPUT: &str = r#"{
      "modules/con_b.adoc": [
        {"Check": "AsciiDocDITA.EntityReference", "Line": 9, "Message": "HTML character entity references are not supported in DITA.", "Severity": "warning", "Span": [4, 10], "Match": "&mdash;"},
        {"Check": "AsciiDocDITA.EntityReference", "Line": 2, "Message": "m", "Severity": "warning", "Span": [1, 6]}
      ],
      "modules/con_a.adoc": [
        {"Check": "AsciiDocDITA.LineBreak", "Line": 5, "Message": "other", "Severity": "error"},
        {"Check": "AsciiDocDITA.EntityReference", "Line": 1, "Message": "m", "Severity": "error"}
      ]
    }"#;

    #[test]
    fn test_parse_vale_groups_and_filters() {
        let index = ViolationIndex::parse(VALE_OUTPUT, "EntityReference", "AsciiDocDITA").unwrap();
        assert_eq!(index.len(), 3);
        let files: Vec<_> = index.files().collect();
        assert_eq!(
            files,
            vec![Path::new("modules/con_a.adoc"), Path::new("modules/con_b.adoc")]
        );

        let b = index.for_file(Path::new("modules/con_b.adoc"));
        assert_eq!(b[0].line, 2);
        assert_eq!(b[1].line, 9);
        assert_eq!(b[1].span, Some((4, 10)));
        assert_eq!(b[1].matched.as_deref(), Some("&mdash;"));
        assert_eq!(b[1].rule, "EntityReference");
    }

    #[test]
    fn test_parse_flat_records() {
        let raw = r#"[
          {"file": "a.adoc", "line": 3, "rule": "PageBreak", "message": "x", "severity": "error"},
          {"file": "a.adoc", "line": 1, "rule": "AsciiDocDITA.PageBreak", "message": "y", "severity": "suggestion"}
        ]"#;
        let index = ViolationIndex::parse(raw, "PageBreak", "AsciiDocDITA").unwrap();
        let a = index.for_file(Path::new("a.adoc"));
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].line, 1);
        assert_eq!(a[0].severity, Severity::Suggestion);
    }

    #[test]
    fn test_parse_blank_output_is_empty() {
        let index = ViolationIndex::parse("  \n", "PageBreak", "AsciiDocDITA").unwrap();
        assert!(index.is_empty());
        let index = ViolationIndex::parse("{}", "PageBreak", "AsciiDocDITA").unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_parse_malformed_output_fails() {
        let err = ViolationIndex::parse("not json", "PageBreak", "AsciiDocDITA").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));

        let err = ViolationIndex::parse(r#"{"a.adoc": 3}"#, "PageBreak", "AsciiDocDITA").unwrap_err();
        assert!(matches!(err, ParseError::UnknownSchema(_)));
    }

    #[test]
    fn test_parse_rejects_zero_line() {
        let raw = r#"[{"file": "a.adoc", "line": 0, "rule": "PageBreak"}]"#;
        let err = ViolationIndex::parse(raw, "PageBreak", "AsciiDocDITA").unwrap_err();
        assert!(matches!(err, ParseError::InvalidLine { line: 0, .. }));
    }
}

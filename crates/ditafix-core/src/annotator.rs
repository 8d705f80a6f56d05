//! Flag comments for violations that need a human.
//!
//! A flag is a single AsciiDoc comment line placed directly above the
//! violating line:
//!
//! ```text
//! // Rule: TaskStep - Rewrite the content as a list of steps. See https://...
//! ```

use std::collections::BTreeSet;

use crate::domain::{FixRule, Violation};
use crate::patch::{Document, PatchOperation};

/// Base URL of the AsciiDocDITA rule definitions.
pub const DEFAULT_RESOURCE_BASE_URL: &str =
    "https://github.com/jhradilek/asciidoctor-dita-vale/blob/main/styles/AsciiDocDITA";

/// Builds flag comments and the insertions that place them.
#[derive(Debug, Clone)]
pub struct CommentAnnotator {
    base_url: String,
}

impl Default for CommentAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_RESOURCE_BASE_URL)
    }
}

impl CommentAnnotator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn resource_url(&self, rule_name: &str) -> String {
        format!("{}/{rule_name}.yml", self.base_url.trim_end_matches('/'))
    }

    pub fn flag_text(&self, rule: &FixRule) -> String {
        format!(
            "// Rule: {} - {}. See {}",
            rule.name,
            rule.instruction.trim_end_matches('.'),
            self.resource_url(&rule.name)
        )
    }

    /// Whether `line` is a flag comment for `rule_name`.
    pub fn is_flag_for(line: &str, rule_name: &str) -> bool {
        line.trim_start()
            .strip_prefix("// Rule: ")
            .and_then(|rest| rest.strip_prefix(rule_name))
            .is_some_and(|rest| rest.starts_with(" - "))
    }

    /// Whether 1-based `line` is directly preceded by a flag for `rule_name`.
    pub fn is_flagged(doc: &Document, line: usize, rule_name: &str) -> bool {
        line > 1
            && doc
                .line(line - 1)
                .is_some_and(|above| Self::is_flag_for(above, rule_name))
    }

    /// Insertions flagging every violated line not already flagged.
    ///
    /// Several violations on one line produce a single flag.
    pub fn annotate(
        &self,
        rule: &FixRule,
        doc: &Document,
        violations: &[Violation],
    ) -> Vec<PatchOperation> {
        let text = self.flag_text(rule);
        let lines: BTreeSet<usize> = violations
            .iter()
            .filter(|v| v.rule == rule.name)
            .map(|v| v.line)
            .filter(|&line| line >= 1 && line <= doc.len() + 1)
            .collect();
        lines
            .into_iter()
            .filter(|&line| !Self::is_flagged(doc, line, &rule.name))
            .map(|line| PatchOperation::insert_above(line, text.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::classifier::RuleRegistry;
    use crate::domain::Severity;
    use crate::patch::PatchEngine;

    fn violation(line: usize, rule: &str) -> Violation {
        Violation::new("a.adoc", line, rule, "m", Severity::Warning)
    }

    #[test]
    fn test_flag_text_format() {
        let reg = RuleRegistry::builtin();
        let rule = reg.classify("TaskStep").unwrap();
        let text = CommentAnnotator::default().flag_text(rule);
        assert_eq!(
            text,
            "// Rule: TaskStep - Rewrite the content as a list of steps. See \
             https://github.com/jhradilek/asciidoctor-dita-vale/blob/main/styles/AsciiDocDITA/TaskStep.yml"
        );
        assert!(CommentAnnotator::is_flag_for(&text, "TaskStep"));
        assert!(!CommentAnnotator::is_flag_for(&text, "Task"));
    }

    #[test]
    fn test_custom_base_url() {
        let ann = CommentAnnotator::new("https://docs.example.com/rules/");
        assert_eq!(
            ann.resource_url("PageBreak"),
            "https://docs.example.com/rules/PageBreak.yml"
        );
    }

    #[test]
    fn test_one_flag_per_line_and_no_duplicates() {
        let reg = RuleRegistry::builtin();
        let rule = reg.classify("SidebarBlock").unwrap();
        let ann = CommentAnnotator::default();
        let mut doc = Document::from_lines(["a", "****", "b", "****"]);
        let vs = vec![
            violation(2, "SidebarBlock"),
            violation(2, "SidebarBlock"),
            violation(4, "SidebarBlock"),
        ];

        let ops = ann.annotate(rule, &doc, &vs);
        assert_eq!(ops.len(), 2);
        PatchEngine::apply(Path::new("a.adoc"), &mut doc, ops).unwrap();
        assert_eq!(doc.len(), 6);
        assert!(CommentAnnotator::is_flagged(&doc, 3, "SidebarBlock"));
        assert!(CommentAnnotator::is_flagged(&doc, 6, "SidebarBlock"));

        // A rerun reports the shifted lines; both are already flagged.
        let rerun = vec![violation(3, "SidebarBlock"), violation(6, "SidebarBlock")];
        assert!(ann.annotate(rule, &doc, &rerun).is_empty());
    }

    #[test]
    fn test_flag_for_other_rule_does_not_count() {
        let reg = RuleRegistry::builtin();
        let rule = reg.classify("TagDirective").unwrap();
        let ann = CommentAnnotator::default();
        let other = ann.flag_text(reg.classify("SidebarBlock").unwrap());
        let doc = Document::from_lines([other.as_str(), "tag::x[]"]);
        let ops = ann.annotate(rule, &doc, &[violation(2, "TagDirective")]);
        assert_eq!(ops.len(), 1);
    }
}

//! Static rule registry: rule name to tier, dependency and stage.
//!
//! The table is hand-curated. Nothing here is inferred at runtime.

use std::collections::HashMap;

use crate::domain::{FixRule, FixTier, RemedyError, Result, StageDefinition};
use crate::domain::FixTier::{Deterministic, NonDeterministic, Partial};

/// Name of the content-type rule every structural rule may depend on.
pub const CONTENT_TYPE_RULE: &str = "ContentType";

struct RuleEntry {
    name: &'static str,
    tier: FixTier,
    dependency: Option<&'static str>,
    instruction: &'static str,
}

struct StageEntry {
    name: &'static str,
    prerequisite_only: bool,
    rules: &'static [RuleEntry],
}

const fn rule(
    name: &'static str,
    tier: FixTier,
    dependency: Option<&'static str>,
    instruction: &'static str,
) -> RuleEntry {
    RuleEntry {
        name,
        tier,
        dependency,
        instruction,
    }
}

const CT: Option<&'static str> = Some(CONTENT_TYPE_RULE);

const STAGES: &[StageEntry] = &[
    StageEntry {
        name: "content-type",
        prerequisite_only: true,
        rules: &[rule(
            CONTENT_TYPE_RULE,
            Partial,
            None,
            "Set the content type to ASSEMBLY, CONCEPT, PROCEDURE, REFERENCE, or SNIPPET",
        )],
    },
    StageEntry {
        name: "deterministic",
        prerequisite_only: false,
        rules: &[
            rule(
                "EntityReference",
                Deterministic,
                None,
                "Replace the character entity reference with an attribute reference",
            ),
            rule("LineBreak", Deterministic, None, "Remove the hard line break"),
            rule("PageBreak", Deterministic, None, "Remove the page break"),
            rule("ThematicBreak", Deterministic, None, "Remove the thematic break"),
        ],
    },
    StageEntry {
        name: "structure",
        prerequisite_only: false,
        rules: &[
            rule(
                "ShortDescription",
                Partial,
                CT,
                "Add a short description marked with [role=\"_abstract\"]",
            ),
            rule("DocumentId", Partial, None, "Add an ID above the document title"),
            rule("DocumentTitle", Partial, CT, "Add a level 0 document title"),
            rule("BlockTitle", Partial, None, "Remove the block title or move it into the text"),
            rule("AdmonitionTitle", Partial, None, "Remove the admonition title"),
            rule("DiscreteHeading", Partial, None, "Replace the discrete heading with text"),
            rule("AuthorLine", Partial, None, "Remove the author line or insert a blank line above it"),
        ],
    },
    StageEntry {
        name: "procedures",
        prerequisite_only: false,
        rules: &[
            rule("TaskContents", NonDeterministic, CT, "Add a .Procedure block title above the steps"),
            rule("TaskDuplicate", NonDeterministic, CT, "Use only one .Procedure block title"),
            rule("TaskExample", NonDeterministic, CT, "Use at most one example in a procedure"),
            rule("TaskSection", NonDeterministic, CT, "Move the section out of the procedure"),
            rule("TaskStep", NonDeterministic, CT, "Rewrite the content as a list of steps"),
            rule("TaskTitle", NonDeterministic, CT, "Use only supported block titles in a procedure"),
        ],
    },
    StageEntry {
        name: "review",
        prerequisite_only: false,
        rules: &[
            rule("AttributeReference", NonDeterministic, None, "Replace the unsupported attribute reference"),
            rule("CalloutList", NonDeterministic, None, "Replace callouts with a definition list"),
            rule("ConditionalCode", NonDeterministic, None, "Remove the conditional or split the content"),
            rule("CrossReference", NonDeterministic, None, "Use an xref to a file and ID"),
            rule("EquationFormula", NonDeterministic, None, "Rewrite the formula without a block title"),
            rule("ExampleBlock", NonDeterministic, None, "Move the example block to the top level"),
            rule("IncludeDirective", NonDeterministic, None, "Include only supported content"),
            rule("LinkAttribute", NonDeterministic, None, "Do not use attributes in the link URL"),
            rule("NestedSection", NonDeterministic, None, "Split the nested section into its own module"),
            rule("RelatedLinks", NonDeterministic, None, "Use only links in the Additional resources section"),
            rule("SidebarBlock", NonDeterministic, None, "Remove the sidebar or convert it to text"),
            rule("TableFooter", NonDeterministic, None, "Move the table footer into the table body"),
            rule("TagDirective", NonDeterministic, None, "Remove the tag directive"),
        ],
    },
];

/// Registry of every rule the engine knows, with its journey stages.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: HashMap<String, FixRule>,
    stages: Vec<StageDefinition>,
}

impl RuleRegistry {
    /// The curated AsciiDocDITA registry.
    pub fn builtin() -> Self {
        let mut rules = HashMap::new();
        let mut stages = Vec::new();
        for stage in STAGES {
            let mut names = Vec::with_capacity(stage.rules.len());
            for entry in stage.rules {
                names.push(entry.name.to_string());
                rules.insert(
                    entry.name.to_string(),
                    FixRule {
                        name: entry.name.to_string(),
                        tier: entry.tier,
                        dependency: entry.dependency.map(str::to_string),
                        instruction: entry.instruction.to_string(),
                        stage: stage.name.to_string(),
                    },
                );
            }
            stages.push(StageDefinition {
                name: stage.name.to_string(),
                rules: names,
                prerequisite_only: stage.prerequisite_only,
            });
        }
        Self { rules, stages }
    }

    /// Look up the fix rule for `rule_name`.
    ///
    /// # Errors
    ///
    /// Returns `RemedyError::UnknownRule` if the rule is not registered.
    pub fn classify(&self, rule_name: &str) -> Result<&FixRule> {
        self.rules
            .get(rule_name)
            .ok_or_else(|| RemedyError::UnknownRule(rule_name.to_string()))
    }

    /// Journey stages in execution order.
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&StageDefinition> {
        self.stages.get(index)
    }

    /// Index of the stage that contains `rule_name`.
    pub fn stage_of(&self, rule_name: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.rules.iter().any(|r| r == rule_name))
    }

    /// Rules whose result `rule_name` must see in a file before touching it.
    ///
    /// This is the rule's own dependency plus every rule of an earlier
    /// prerequisite-only stage, so no later stage edits a file that still
    /// carries a placeholder from those stages.
    pub fn prerequisites_for(&self, rule_name: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        if let Some(dep) = self.rules.get(rule_name).and_then(|r| r.dependency.as_deref()) {
            out.push(dep);
        }
        let Some(own_stage) = self.stage_of(rule_name) else {
            return out;
        };
        for stage in self.stages[..own_stage].iter().filter(|s| s.prerequisite_only) {
            for name in &stage.rules {
                if !out.contains(&name.as_str()) {
                    out.push(name.as_str());
                }
            }
        }
        out
    }

    /// All rules in stage order.
    pub fn ordered_rules(&self) -> impl Iterator<Item = &FixRule> {
        self.stages
            .iter()
            .flat_map(|s| s.rules.iter())
            .filter_map(|name| self.rules.get(name))
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_rules() {
        let reg = RuleRegistry::builtin();
        let er = reg.classify("EntityReference").unwrap();
        assert_eq!(er.tier, FixTier::Deterministic);
        assert!(er.dependency.is_none());

        let ct = reg.classify("ContentType").unwrap();
        assert_eq!(ct.tier, FixTier::Partial);

        let step = reg.classify("TaskStep").unwrap();
        assert_eq!(step.tier, FixTier::NonDeterministic);
        assert_eq!(step.dependency.as_deref(), Some(CONTENT_TYPE_RULE));
    }

    #[test]
    fn test_classify_unknown_rule() {
        let reg = RuleRegistry::builtin();
        let err = reg.classify("NoSuchRule").unwrap_err();
        assert!(matches!(err, RemedyError::UnknownRule(name) if name == "NoSuchRule"));
    }

    #[test]
    fn test_dependencies_live_in_earlier_prerequisite_stages() {
        let reg = RuleRegistry::builtin();
        for rule in reg.ordered_rules() {
            if let Some(dep) = &rule.dependency {
                let dep_stage = reg.stage_of(dep).unwrap();
                let own_stage = reg.stage_of(&rule.name).unwrap();
                assert!(dep_stage < own_stage, "{} depends on a later stage", rule.name);
                assert!(reg.stage(dep_stage).unwrap().prerequisite_only);
            }
        }
    }

    #[test]
    fn test_later_stages_wait_on_prerequisite_stage() {
        let reg = RuleRegistry::builtin();
        assert!(reg.prerequisites_for(CONTENT_TYPE_RULE).is_empty());
        assert_eq!(reg.prerequisites_for("LineBreak"), vec![CONTENT_TYPE_RULE]);
        assert_eq!(reg.prerequisites_for("TagDirective"), vec![CONTENT_TYPE_RULE]);
        // The own dependency is not listed twice.
        assert_eq!(reg.prerequisites_for("TaskStep"), vec![CONTENT_TYPE_RULE]);
        assert!(reg.prerequisites_for("NoSuchRule").is_empty());
    }

    #[test]
    fn test_first_stage_is_content_type() {
        let reg = RuleRegistry::builtin();
        let first = reg.stage(0).unwrap();
        assert_eq!(first.rules, vec![CONTENT_TYPE_RULE.to_string()]);
        assert!(first.prerequisite_only);
        assert_eq!(reg.ordered_rules().count(), 31);
    }
}

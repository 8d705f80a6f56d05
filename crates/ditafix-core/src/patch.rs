//! Line-based document buffer and bottom-up patch application.
//!
//! All operations of one pass are computed against the same pre-edit buffer
//! and carry its line numbers. [`PatchEngine::apply`] sorts them by
//! descending start line and applies them from the bottom of the document
//! upward: every splice happens at or above lines already processed, so the
//! targets of the operations still pending never move. Operations computed
//! against different baselines (two rules interleaved) cannot be reconciled
//! this way, which is why a pass only ever carries one rule.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{RemedyError, Result};

/// Line ending style detected when a document is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// A document as an ordered sequence of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
    ending: LineEnding,
    trailing_newline: bool,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        let ending = if text.contains("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };
        if text.is_empty() {
            return Self {
                lines: Vec::new(),
                ending,
                trailing_newline: true,
            };
        }
        let mut lines: Vec<String> = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect();
        let trailing_newline = text.ends_with('\n');
        if trailing_newline {
            lines.pop();
        }
        Self {
            lines,
            ending,
            trailing_newline,
        }
    }

    /// Build a document from lines, using LF endings and a final newline.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ending: LineEnding::Lf,
            trailing_newline: true,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn render(&self) -> String {
        let sep = self.ending.as_str();
        let mut out = self.lines.join(sep);
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(sep);
        }
        out
    }

    /// Write the whole document next to `path` and rename it into place.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let tmp = path.with_file_name(format!(".{file_name}.ditafix.tmp"));
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(self.render().as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Line at 1-based `number`.
    pub fn line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn ending(&self) -> LineEnding {
        self.ending
    }
}

/// 1-based inclusive line range in the pre-edit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn line(n: usize) -> Self {
        Self { start: n, end: n }
    }

    fn contains(&self, n: usize) -> bool {
        n >= self.start && n <= self.end
    }

    fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    /// Replace the target range with `text`; empty `text` deletes it.
    Replace,
    /// Splice `text` directly above the target line.
    InsertAbove,
    /// Splice an attribute line above the target and keep exactly one
    /// blank line after it.
    InsertAttribute,
}

/// One edit against the pre-edit buffer of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub target: LineRange,
    pub kind: PatchKind,
    pub text: Vec<String>,
}

impl PatchOperation {
    pub fn replace(line: usize, text: impl Into<String>) -> Self {
        Self {
            target: LineRange::line(line),
            kind: PatchKind::Replace,
            text: vec![text.into()],
        }
    }

    pub fn replace_range(start: usize, end: usize, text: Vec<String>) -> Self {
        Self {
            target: LineRange { start, end },
            kind: PatchKind::Replace,
            text,
        }
    }

    pub fn delete(line: usize) -> Self {
        Self {
            target: LineRange::line(line),
            kind: PatchKind::Replace,
            text: Vec::new(),
        }
    }

    pub fn insert_above(line: usize, text: impl Into<String>) -> Self {
        Self {
            target: LineRange::line(line),
            kind: PatchKind::InsertAbove,
            text: vec![text.into()],
        }
    }

    pub fn insert_attribute(line: usize, attribute: impl Into<String>) -> Self {
        Self {
            target: LineRange::line(line),
            kind: PatchKind::InsertAttribute,
            text: vec![attribute.into()],
        }
    }
}

/// What an `apply` call did to the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub applied: usize,
    pub lines_before: usize,
    pub lines_after: usize,
}

#[derive(Default)]
struct LineGroup {
    replace: Option<PatchOperation>,
    inserts: Vec<PatchOperation>,
    attributes: Vec<PatchOperation>,
}

/// Applies a batch of operations to one document, bottom-up.
pub struct PatchEngine;

impl PatchEngine {
    /// Apply `ops` to `doc`.
    ///
    /// At a shared start line the replacement goes first, then plain
    /// insertions in submission order, then attribute insertions, so the
    /// inserted block stays contiguous.
    ///
    /// # Errors
    ///
    /// Returns `RemedyError::PatchConflict` when a target is out of range,
    /// two replacements overlap, or an insertion lands inside a replaced
    /// range. The document is left untouched in that case.
    pub fn apply(file: &Path, doc: &mut Document, ops: Vec<PatchOperation>) -> Result<PatchSummary> {
        let lines_before = doc.len();
        Self::validate(file, doc, &ops)?;

        let applied = ops.len();
        let mut groups: BTreeMap<usize, LineGroup> = BTreeMap::new();
        for op in ops {
            let group = groups.entry(op.target.start).or_default();
            match op.kind {
                PatchKind::Replace => group.replace = Some(op),
                PatchKind::InsertAbove => group.inserts.push(op),
                PatchKind::InsertAttribute => group.attributes.push(op),
            }
        }

        for (start, group) in groups.into_iter().rev() {
            let at = start - 1;
            if let Some(rep) = group.replace {
                doc.lines.splice(at..rep.target.end, rep.text);
            }
            let has_attribute = !group.attributes.is_empty();
            let block: Vec<String> = group
                .inserts
                .into_iter()
                .chain(group.attributes)
                .flat_map(|op| op.text)
                .collect();
            let block_len = block.len();
            doc.lines.splice(at..at, block);
            if has_attribute {
                normalize_blank_after(&mut doc.lines, at + block_len);
            }
        }

        Ok(PatchSummary {
            applied,
            lines_before,
            lines_after: doc.len(),
        })
    }

    fn validate(file: &Path, doc: &Document, ops: &[PatchOperation]) -> Result<()> {
        let conflict = |detail: String| RemedyError::PatchConflict {
            file: file.to_path_buf(),
            detail,
        };
        let len = doc.len();
        let mut replaces: Vec<LineRange> = Vec::new();
        for op in ops {
            let t = op.target;
            match op.kind {
                PatchKind::Replace => {
                    if t.start == 0 || t.end < t.start || t.end > len {
                        return Err(conflict(format!(
                            "replace {}..={} is outside 1..={len}",
                            t.start, t.end
                        )));
                    }
                    replaces.push(t);
                }
                PatchKind::InsertAbove | PatchKind::InsertAttribute => {
                    if t.start == 0 || t.start > len + 1 {
                        return Err(conflict(format!(
                            "insertion above line {} is outside 1..={}",
                            t.start,
                            len + 1
                        )));
                    }
                }
            }
        }

        replaces.sort_by_key(|r| (r.start, r.end));
        for pair in replaces.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(conflict(format!(
                    "replace {}..={} overlaps replace {}..={}",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end
                )));
            }
        }

        for op in ops.iter().filter(|o| o.kind != PatchKind::Replace) {
            let line = op.target.start;
            if let Some(r) = replaces.iter().find(|r| r.contains(line) && r.start != line) {
                return Err(conflict(format!(
                    "insertion above line {line} falls inside replace {}..={}",
                    r.start, r.end
                )));
            }
        }
        Ok(())
    }
}

/// Leave exactly one blank line at `pos`.
fn normalize_blank_after(lines: &mut Vec<String>, pos: usize) {
    let blanks = lines[pos.min(lines.len())..]
        .iter()
        .take_while(|l| l.trim().is_empty())
        .count();
    match blanks {
        0 => lines.insert(pos, String::new()),
        1 => {}
        n => {
            lines.drain(pos + 1..pos + n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(lines: &[&str]) -> Document {
        Document::from_lines(lines.iter().copied())
    }

    fn numbered(n: usize) -> Document {
        Document::from_lines((1..=n).map(|i| format!("line {i}")))
    }

    #[test]
    fn test_flags_land_above_original_lines() {
        let mut d = numbered(20);
        let ops = vec![
            PatchOperation::insert_above(5, "// flag 5"),
            PatchOperation::insert_above(10, "// flag 10"),
            PatchOperation::insert_above(15, "// flag 15"),
        ];
        PatchEngine::apply(Path::new("x.adoc"), &mut d, ops).unwrap();

        for n in [5, 10, 15] {
            let pos = d
                .lines()
                .iter()
                .position(|l| l == &format!("line {n}"))
                .unwrap();
            assert_eq!(d.lines()[pos - 1], format!("// flag {n}"));
        }
        assert_eq!(d.len(), 23);
    }

    #[test]
    fn test_submission_order_does_not_matter() {
        let mut a = numbered(6);
        let mut b = numbered(6);
        let ops = vec![
            PatchOperation::delete(2),
            PatchOperation::replace(4, "four"),
            PatchOperation::insert_above(6, "// six"),
        ];
        let mut reversed = ops.clone();
        reversed.reverse();
        PatchEngine::apply(Path::new("a"), &mut a, ops).unwrap();
        PatchEngine::apply(Path::new("b"), &mut b, reversed).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.lines(),
            &["line 1", "line 3", "four", "line 5", "// six", "line 6"]
        );
    }

    #[test]
    fn test_replace_and_insert_share_line() {
        let mut d = doc(&["a", "b", "c"]);
        let ops = vec![
            PatchOperation::insert_above(2, "// note"),
            PatchOperation::replace(2, "B"),
        ];
        PatchEngine::apply(Path::new("x"), &mut d, ops).unwrap();
        assert_eq!(d.lines(), &["a", "// note", "B", "c"]);
    }

    #[test]
    fn test_overlapping_replaces_conflict() {
        let mut d = numbered(5);
        let before = d.clone();
        let ops = vec![
            PatchOperation::replace_range(2, 3, vec!["x".into()]),
            PatchOperation::replace(3, "y"),
        ];
        let err = PatchEngine::apply(Path::new("c.adoc"), &mut d, ops).unwrap_err();
        assert!(matches!(err, RemedyError::PatchConflict { .. }));
        assert_eq!(d, before);
    }

    #[test]
    fn test_insert_inside_replace_conflicts() {
        let mut d = numbered(5);
        let ops = vec![
            PatchOperation::replace_range(2, 4, vec![]),
            PatchOperation::insert_above(3, "// lost"),
        ];
        let err = PatchEngine::apply(Path::new("c.adoc"), &mut d, ops).unwrap_err();
        assert!(err.to_string().contains("falls inside"));
    }

    #[test]
    fn test_out_of_range_conflicts() {
        let mut d = numbered(2);
        assert!(PatchEngine::apply(Path::new("c"), &mut d, vec![PatchOperation::replace(3, "x")]).is_err());
        assert!(PatchEngine::apply(Path::new("c"), &mut d, vec![PatchOperation::insert_above(4, "x")]).is_err());
        // Appending directly after the last line is allowed.
        PatchEngine::apply(Path::new("c"), &mut d, vec![PatchOperation::insert_above(3, "end")]).unwrap();
        assert_eq!(d.lines().last().map(String::as_str), Some("end"));
    }

    #[test]
    fn test_attribute_gets_exactly_one_blank_line() {
        let mut d = doc(&["= Title", "", "Body"]);
        PatchEngine::apply(
            Path::new("x"),
            &mut d,
            vec![PatchOperation::insert_attribute(1, ":_mod-docs-content-type: CONCEPT")],
        )
        .unwrap();
        assert_eq!(
            d.lines(),
            &[":_mod-docs-content-type: CONCEPT", "", "= Title", "", "Body"]
        );

        let mut d = doc(&["", "", "", "= Title"]);
        PatchEngine::apply(
            Path::new("x"),
            &mut d,
            vec![PatchOperation::insert_attribute(1, ":a: b")],
        )
        .unwrap();
        assert_eq!(d.lines(), &[":a: b", "", "= Title"]);
    }

    #[test]
    fn test_flag_and_attribute_block_order() {
        let mut d = doc(&["Body"]);
        let ops = vec![
            PatchOperation::insert_attribute(1, ":_mod-docs-content-type: TBD"),
            PatchOperation::insert_above(1, "// Rule: ContentType - fix. See url"),
        ];
        PatchEngine::apply(Path::new("x"), &mut d, ops).unwrap();
        assert_eq!(
            d.lines(),
            &[
                "// Rule: ContentType - fix. See url",
                ":_mod-docs-content-type: TBD",
                "",
                "Body"
            ]
        );
    }

    #[test]
    fn test_parse_render_preserves_crlf_and_trailing_newline() {
        let text = "a\r\nb\r\n";
        let d = Document::parse(text);
        assert_eq!(d.lines(), &["a", "b"]);
        assert_eq!(d.ending(), LineEnding::CrLf);
        assert_eq!(d.render(), text);

        let d = Document::parse("a\nb");
        assert_eq!(d.render(), "a\nb");
        assert_eq!(Document::parse("").render(), "");
    }

    #[test]
    fn test_write_atomic_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("con_a.adoc");
        let d = doc(&["= A", "", "text"]);
        d.write_atomic(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "= A\n\ntext\n");
        assert_eq!(Document::read(&path).unwrap(), d);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

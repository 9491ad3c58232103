//! Derivation trace
//!
//! The solver records one entry per formula application that survives
//! into the final derivation. Entries for abandoned branches are
//! truncated away as soon as a dependency fails, so a finished log reads
//! as the proof of the answer, leaves first.

use serde::Serialize;

use crate::recursion::key::QuantityKey;

/// One surviving formula application
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    /// Key the formula produced a value for
    pub key: String,
    /// Remaining descent budget when the formula fired
    pub depth: u32,
    /// True when reached through a lateral (same-level) hop
    pub lateral: bool,
    /// Catalog name of the formula
    pub rule: &'static str,
    /// Rendered identity with the actual keys substituted
    pub statement: String,
    /// Value the combinator produced
    pub value: f64,
}

/// Ordered record of the surviving derivation chain
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Position to rewind to if the branch being attempted fails
    pub(crate) fn mark(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry recorded since `mark`
    pub(crate) fn rewind(&mut self, mark: usize) {
        self.entries.truncate(mark);
    }

    pub(crate) fn record(
        &mut self,
        key: &QuantityKey,
        depth: u32,
        lateral: bool,
        rule: &'static str,
        statement: String,
        value: f64,
    ) {
        self.entries.push(TraceEntry {
            key: key.to_string(),
            depth,
            lateral,
            rule,
            statement,
            value,
        });
    }
}

/// Renders a finished trace for output
pub trait TraceFormatter {
    fn format(&self, log: &TraceLog) -> String;
}

/// Indented plain-text rendering
///
/// Deeper steps indent further; the rule name is right-aligned after a
/// `~` so the identities line up in a column.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormatter;

impl TraceFormatter for PlainFormatter {
    fn format(&self, log: &TraceLog) -> String {
        if log.is_empty() {
            return String::from("(no derivation steps)\n");
        }
        let top = log.entries().iter().map(|e| e.depth).max().unwrap_or(0);

        let mut out = String::new();
        for entry in log.entries() {
            let mut level = (top - entry.depth) as usize;
            if entry.lateral {
                level += 1;
            }
            let line = format!("{}{}", "  ".repeat(level), entry.statement);
            let pad = 58usize.saturating_sub(line.len());
            out.push_str(&line);
            out.push_str(&" ".repeat(pad + 1));
            out.push('~');
            out.push_str(entry.rule);
            out.push('\n');
        }
        out
    }
}

/// JSON rendering of the raw entries
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl TraceFormatter for JsonFormatter {
    fn format(&self, log: &TraceLog) -> String {
        let result = if self.pretty {
            serde_json::to_string_pretty(log.entries())
        } else {
            serde_json::to_string(log.entries())
        };
        // Entries hold only strings, numbers, and bools
        result.unwrap_or_else(|_| String::from("[]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> TraceLog {
        let mut log = TraceLog::new();
        log.record(
            &QuantityKey::survival(61),
            2,
            false,
            "complement of mortality",
            "p(61) = 1 - q(61)".into(),
            0.98,
        );
        log.record(
            &QuantityKey::mortality(60),
            3,
            false,
            "complement of survival",
            "q(60) = p(60,:0) - p(60,:1)".into(),
            0.02,
        );
        log
    }

    #[test]
    fn test_rewind_drops_abandoned_entries() {
        let mut log = sample_log();
        let mark = log.mark();
        log.record(
            &QuantityKey::survival(99),
            1,
            false,
            "survival chain rule",
            "dead end".into(),
            0.0,
        );
        assert_eq!(log.len(), 3);
        log.rewind(mark);
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[1].rule, "complement of survival");
    }

    #[test]
    fn test_plain_format_indents_by_depth() {
        let text = PlainFormatter.format(&sample_log());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        // depth 2 entry sits one level below the depth 3 entry
        assert!(lines[0].starts_with("  p(61)"));
        assert!(lines[1].starts_with("q(60)"));
        assert!(lines[0].contains("~complement of mortality"));
    }

    #[test]
    fn test_plain_format_empty() {
        assert!(PlainFormatter.format(&TraceLog::new()).contains("no derivation"));
    }

    #[test]
    fn test_json_format_round_trips_fields() {
        let text = JsonFormatter { pretty: false }.format(&sample_log());
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["rule"], "complement of mortality");
        assert_eq!(parsed[1]["depth"], 3);
    }
}

//! Instruction-marker filtering over raw program log lines.
//!
//! One predicate type covers both watch styles:
//! - [`MatchMode::AnyOf`]: a single line containing any expected marker is enough
//!   (pool creation: `Program log: Instruction: InitializeMint`).
//! - [`MatchMode::ExactSet`]: the set of observed instructions must equal the
//!   expected set (burn + close, and nothing else).

use serde::{Deserialize, Serialize};

/// Log line prefix the token programs use when announcing an instruction.
pub const INSTRUCTION_PREFIX: &str = "Program log: Instruction: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    AnyOf,
    ExactSet,
}

/// Configurable predicate deciding whether a notification is interesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub mode: MatchMode,
    /// Expected instruction markers, compared against log lines.
    pub instructions: Vec<String>,
    /// In `exact_set` mode, only lines starting with this prefix are
    /// considered. `None` considers every line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_prefix: Option<String>,
}

impl LogFilter {
    pub fn any_of<I, S>(instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: MatchMode::AnyOf,
            instructions: instructions.into_iter().map(Into::into).collect(),
            line_prefix: None,
        }
    }

    pub fn exact_set<I, S>(instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: MatchMode::ExactSet,
            instructions: instructions.into_iter().map(Into::into).collect(),
            line_prefix: None,
        }
    }

    /// Restrict `exact_set` evaluation to lines starting with `prefix`.
    pub fn with_line_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.line_prefix = Some(prefix.into());
        self
    }

    /// Evaluate the predicate over `logs`.
    pub fn matches<S: AsRef<str>>(&self, logs: &[S]) -> bool {
        if self.instructions.is_empty() {
            return false;
        }
        match self.mode {
            MatchMode::AnyOf => logs.iter().any(|line| {
                let line = line.as_ref();
                self.instructions.iter().any(|i| line.contains(i.as_str()))
            }),
            MatchMode::ExactSet => self.matches_exact(logs),
        }
    }

    fn matches_exact<S: AsRef<str>>(&self, logs: &[S]) -> bool {
        let considered: Vec<&str> = logs
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| match &self.line_prefix {
                Some(prefix) => l.starts_with(prefix.as_str()),
                None => true,
            })
            .collect();

        if considered.is_empty() {
            return false;
        }

        let all_expected = considered
            .iter()
            .all(|line| self.instructions.iter().any(|i| i.trim() == *line));
        let all_present = self
            .instructions
            .iter()
            .all(|i| considered.iter().any(|line| line.contains(i.trim())));

        all_expected && all_present
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: &str = "Program log: Instruction: InitializeMint";
    const BURN: &str = "Program log: Instruction: Burn";
    const CLOSE: &str = "Program log: Instruction: CloseAccount";
    const TRANSFER: &str = "Program log: Instruction: Transfer";

    // ==================== any_of ====================

    #[test]
    fn any_of_matches_substring_in_any_line() {
        let filter = LogFilter::any_of([INIT]);
        let logs = [
            "Program 675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8 invoke [1]",
            "Program log: Instruction: InitializeMint2",
            "Program 675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8 success",
        ];
        assert!(filter.matches(&logs));
    }

    #[test]
    fn any_of_rejects_when_no_marker_present() {
        let filter = LogFilter::any_of([INIT]);
        assert!(!filter.matches(&[TRANSFER, "Program log: swap"]));
    }

    #[test]
    fn any_of_rejects_empty_logs() {
        let filter = LogFilter::any_of([INIT]);
        let logs: [&str; 0] = [];
        assert!(!filter.matches(&logs));
    }

    // ==================== exact_set ====================

    #[test]
    fn exact_set_matches_equal_sets() {
        let filter = LogFilter::exact_set([BURN, CLOSE]);
        assert!(filter.matches(&[BURN, CLOSE]));
    }

    #[test]
    fn exact_set_tolerates_repeats_and_whitespace() {
        let filter = LogFilter::exact_set([BURN, CLOSE]);
        assert!(filter.matches(&[BURN, "  Program log: Instruction: CloseAccount ", BURN]));
    }

    #[test]
    fn exact_set_rejects_missing_instruction() {
        let filter = LogFilter::exact_set([BURN, CLOSE]);
        assert!(!filter.matches(&[BURN]));
    }

    #[test]
    fn exact_set_rejects_extra_instruction() {
        let filter = LogFilter::exact_set([BURN, CLOSE]);
        assert!(!filter.matches(&[BURN, CLOSE, TRANSFER]));
    }

    #[test]
    fn exact_set_rejects_empty_logs() {
        let filter = LogFilter::exact_set([BURN, CLOSE]);
        let logs: [&str; 0] = [];
        assert!(!filter.matches(&logs));
    }

    #[test]
    fn exact_set_with_prefix_ignores_runtime_lines() {
        let filter = LogFilter::exact_set([BURN, CLOSE]).with_line_prefix(INSTRUCTION_PREFIX);
        let logs = [
            "Program TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA invoke [1]",
            BURN,
            "Program TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA consumed 4753 of 200000 compute units",
            CLOSE,
            "Program TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA success",
        ];
        assert!(filter.matches(&logs));
        assert!(!LogFilter::exact_set([BURN, CLOSE]).matches(&logs));
    }

    #[test]
    fn exact_set_with_prefix_still_rejects_extra_instruction() {
        let filter = LogFilter::exact_set([BURN, CLOSE]).with_line_prefix(INSTRUCTION_PREFIX);
        assert!(!filter.matches(&[BURN, TRANSFER, CLOSE]));
    }

    #[test]
    fn empty_instruction_list_never_matches() {
        let filter = LogFilter::any_of(Vec::<String>::new());
        assert!(!filter.matches(&[INIT]));
        let filter = LogFilter::exact_set(Vec::<String>::new());
        assert!(!filter.matches(&[INIT]));
    }

    #[test]
    fn mode_deserializes_from_snake_case() {
        let filter: LogFilter = serde_json::from_str(
            r#"{"mode":"exact_set","instructions":["a","b"]}"#,
        )
        .unwrap();
        assert_eq!(filter.mode, MatchMode::ExactSet);
        assert_eq!(filter.line_prefix, None);
    }
}

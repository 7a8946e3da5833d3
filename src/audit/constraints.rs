use serde::Serialize;

/// Hard rules fixed for the lifetime of a session.
///
/// Shared behind an `Arc` by prompt construction and the auditor; there is no
/// way to mutate it after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintSet {
    rules: Vec<String>,
}

impl ConstraintSet {
    /// Blank rules are dropped and exact duplicates collapsed.
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept: Vec<String> = Vec::new();
        for rule in rules {
            let rule = rule.as_ref().trim();
            if !rule.is_empty() && !kept.iter().any(|r| r == rule) {
                kept.push(rule.to_string());
            }
        }
        Self { rules: kept }
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `1. rule` lines, or a placeholder when no rules were given.
    pub fn render_numbered(&self) -> String {
        if self.rules.is_empty() {
            return "(no explicit constraints; check logic and facts only)".to_string();
        }
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{}. {rule}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

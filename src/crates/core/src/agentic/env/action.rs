//! Extracts a discrete action from free-form model output.

use crate::util::errors::{EnvError, EnvResult};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    /// Resolved action id, `None` when the text did not name a known action.
    pub action: Option<u32>,
    /// Canonical action name on success, otherwise the cleaned capture.
    pub action_content: String,
}

pub struct ActionParser {
    pattern: Regex,
    lookup: HashMap<String, (u32, String)>,
    reserved_tokens: Vec<String>,
}

impl ActionParser {
    pub fn new(
        pattern: &str,
        action_lookup: &BTreeMap<u32, String>,
        reserved_tokens: &[String],
    ) -> EnvResult<Self> {
        let pattern = RegexBuilder::new(pattern)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| EnvError::config(format!("Invalid action pattern: {}", e)))?;
        if pattern.captures_len() < 2 {
            return Err(EnvError::config(
                "Action pattern must contain a capture group for the action",
            ));
        }

        let lookup = action_lookup
            .iter()
            .map(|(id, name)| (name.trim().to_lowercase(), (*id, name.clone())))
            .collect();

        Ok(Self {
            pattern,
            lookup,
            reserved_tokens: reserved_tokens
                .iter()
                .filter(|t| !t.is_empty())
                .cloned()
                .collect(),
        })
    }

    pub fn parse(&self, text: &str) -> ParsedAction {
        let Some(captured) = self
            .pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            return ParsedAction {
                action: None,
                action_content: String::new(),
            };
        };

        let mut content = captured.trim().to_string();
        for token in &self.reserved_tokens {
            content = content.replace(token.as_str(), "").trim().to_string();
        }

        match self.lookup.get(&content.to_lowercase()) {
            Some((id, name)) => ParsedAction {
                action: Some(*id),
                action_content: name.clone(),
            },
            None => ParsedAction {
                action: None,
                action_content: content,
            },
        }
    }
}

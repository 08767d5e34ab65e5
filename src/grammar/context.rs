//! Serializable context definition: the intents, slots and expressions of a
//! command domain, as loaded from a context file.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IntentError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDefinition {
    pub name: String,
    pub intents: Vec<IntentDefinition>,
    #[serde(default)]
    pub slots: Vec<SlotDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    pub expressions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub name: String,
    #[serde(flatten)]
    pub domain: SlotDomain,
}

/// Admissible values of a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotDomain {
    /// Explicit phrases; a phrase may span several words.
    Values(Vec<String>),
    /// Regular expression selecting single words from the model vocabulary.
    Pattern(String),
}

/// One whitespace-separated token of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionToken {
    Word(String),
    /// `$slot_type:name`: any value of `slot_type`, reported under `name`.
    Slot { slot_type: String, name: String },
}

static SLOT_REF_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\$([A-Za-z][A-Za-z0-9_]*):([A-Za-z][A-Za-z0-9_]*)$"));

impl ContextDefinition {
    pub fn from_json(json: &str) -> Result<Self, IntentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IntentError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let context = Self::from_json(&content)?;
        log::debug!(
            "Loaded context '{}' ({} intents, {} slots) from {}",
            context.name,
            context.intents.len(),
            context.slots.len(),
            path.as_ref().display()
        );
        Ok(context)
    }
}

pub fn parse_expression(expression: &str) -> Result<Vec<ExpressionToken>, IntentError> {
    let re = SLOT_REF_RE
        .as_ref()
        .map_err(|e| IntentError::InvalidContext(e.to_string()))?;

    let tokens = expression
        .split_whitespace()
        .map(|raw| {
            if !raw.starts_with('$') {
                return Ok(ExpressionToken::Word(raw.to_lowercase()));
            }
            let caps = re.captures(raw).ok_or_else(|| {
                IntentError::InvalidContext(format!(
                    "malformed slot reference '{raw}' in '{expression}'"
                ))
            })?;
            Ok(ExpressionToken::Slot {
                slot_type: caps[1].to_string(),
                name: caps[2].to_string(),
            })
        })
        .collect::<Result<Vec<_>, IntentError>>()?;

    if tokens.is_empty() {
        return Err(IntentError::InvalidContext(
            "expression must not be empty".to_string(),
        ));
    }
    Ok(tokens)
}

/// Splits a slot value phrase into lowercase words.
pub(crate) fn phrase_words(phrase: &str) -> Vec<String> {
    phrase.split_whitespace().map(str::to_lowercase).collect()
}

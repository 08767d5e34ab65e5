use indexmap::IndexMap;
use serde::Serialize;

use crate::decoder::Hypothesis;
use crate::grammar::Grammar;

/// An understood command.
///
/// `slots` keeps the order in which values were spoken. The value is owned
/// and independent of the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub name: String,
    pub slots: IndexMap<String, String>,
}

impl Intent {
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }
}

/// Picks the best accepted terminal hypothesis and projects it into an
/// [`Intent`], or `None` when nothing was understood.
pub(crate) fn extract(
    grammar: &Grammar,
    hypotheses: &[Hypothesis],
    min_word_frames: usize,
    threshold: f32,
) -> Option<Intent> {
    let mut best: Option<(&Hypothesis, &str)> = None;
    for hyp in hypotheses {
        if hyp.confidence() < threshold {
            continue;
        }
        let Some(intent) = hyp
            .terminal(grammar, min_word_frames)
            .and_then(|node| grammar.intent_of(node))
        else {
            continue;
        };
        if best.map_or(true, |(b, _)| hyp.score > b.score) {
            best = Some((hyp, intent));
        }
    }

    let (hyp, name) = best?;

    let mut slots = IndexMap::with_capacity(hyp.bindings.len());
    for binding in &hyp.bindings {
        let (Some(slot), Some(value)) = (
            grammar.slot_name(binding.slot),
            grammar.value(binding.value),
        ) else {
            continue;
        };
        // A repeated slot keeps its last value, at its last position.
        slots.shift_remove(slot);
        slots.insert(slot.to_string(), value.to_string());
    }

    log::debug!(
        "Selected '{}' with confidence {:.3} over {} word frames",
        name,
        hyp.confidence(),
        hyp.word_frames
    );
    Some(Intent {
        name: name.to_string(),
        slots,
    })
}

use std::collections::TryReserveError;

use crate::config::DecoderConfig;
use crate::error::IntentError;
use crate::grammar::{Binding, Grammar, LabelId, NodeId};
use crate::scoring::{FrameScores, MIN_LOG_PROB};

use super::state::{Cursor, FrameSummary, Hypothesis};

/// Candidate produced from a parent hypothesis for the next frame.
struct Step {
    cursor: Cursor,
    score: f32,
    word_score: f32,
    word_frames: u32,
    binding: Option<Binding>,
}

/// Keeps the best candidate per cursor while a frame is expanded.
struct Merge<'a> {
    pending: &'a mut Vec<Hypothesis>,
    slots: &'a mut [Option<u32>],
    node_count: usize,
}

impl Merge<'_> {
    fn key(&self, cursor: Cursor) -> usize {
        match cursor {
            Cursor::At(node) => node.index(),
            Cursor::In { edge, .. } => self.node_count + edge.index(),
        }
    }

    fn offer(&mut self, parent: &Hypothesis, step: Step) -> Result<(), TryReserveError> {
        if !step.score.is_finite() {
            return Ok(());
        }
        let key = self.key(step.cursor);
        let Some(slot) = self.slots.get_mut(key) else {
            return Ok(());
        };

        match *slot {
            Some(index) => {
                let current = &mut self.pending[index as usize];
                if step.score > current.score {
                    copy_bindings(&mut current.bindings, &parent.bindings, step.binding)?;
                    current.cursor = step.cursor;
                    current.score = step.score;
                    current.word_score = step.word_score;
                    current.word_frames = step.word_frames;
                }
            }
            None => {
                let mut bindings = Vec::new();
                copy_bindings(&mut bindings, &parent.bindings, step.binding)?;
                *slot = Some(self.pending.len() as u32);
                self.pending.push(Hypothesis {
                    cursor: step.cursor,
                    score: step.score,
                    word_score: step.word_score,
                    word_frames: step.word_frames,
                    bindings,
                });
            }
        }
        Ok(())
    }

    /// Starts every word leaving `node` whose label clears the entry floor.
    fn enter_from(
        &mut self,
        grammar: &Grammar,
        scores: &FrameScores,
        node: NodeId,
        parent: &Hypothesis,
        entry_floor: f32,
    ) -> Result<(), TryReserveError> {
        for &edge_id in grammar.out_edges(node) {
            let Some(edge) = grammar.edge(edge_id) else {
                continue;
            };
            let lp = scores.label(edge.label);
            if lp < entry_floor {
                continue;
            }
            self.offer(
                parent,
                Step {
                    cursor: Cursor::In {
                        edge: edge_id,
                        dwell: 1,
                    },
                    score: parent.score + lp,
                    word_score: parent.word_score + lp,
                    word_frames: parent.word_frames + 1,
                    binding: edge.binding(),
                },
            )?;
        }
        Ok(())
    }
}

fn mark(label: LabelId, active: &mut Vec<LabelId>, seen: &mut [bool]) {
    if let Some(seen) = seen.get_mut(label) {
        if !*seen {
            *seen = true;
            active.push(label);
        }
    }
}

fn copy_bindings(
    dst: &mut Vec<Binding>,
    parent: &[Binding],
    extra: Option<Binding>,
) -> Result<(), TryReserveError> {
    dst.clear();
    dst.try_reserve(parent.len() + usize::from(extra.is_some()))?;
    dst.extend_from_slice(parent);
    dst.extend(extra);
    Ok(())
}

/// The live hypothesis set of one session.
///
/// A frame is first expanded into a pending set ([`Frontier::prepare`]) and
/// only replaces the live set on [`Frontier::commit`], so a failed frame
/// leaves the search exactly where it was.
#[derive(Debug)]
pub struct Frontier {
    hypotheses: Vec<Hypothesis>,
    pending: Vec<Hypothesis>,
    slots: Vec<Option<u32>>,
    active: Vec<LabelId>,
    label_seen: Vec<bool>,
    node_count: usize,
    max_out_degree: usize,
}

impl Frontier {
    pub fn new(grammar: &Grammar) -> Self {
        Self {
            hypotheses: vec![Hypothesis::root(grammar.start())],
            pending: Vec::new(),
            slots: vec![None; grammar.node_count() + grammar.edge_count()],
            active: Vec::new(),
            label_seen: vec![false; grammar.labels().len()],
            node_count: grammar.node_count(),
            max_out_degree: grammar.max_out_degree(),
        }
    }

    pub fn reset(&mut self, start: NodeId) {
        self.hypotheses.clear();
        self.hypotheses.push(Hypothesis::root(start));
        self.pending.clear();
    }

    /// Live hypotheses, best first.
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    /// Labels the next frame can extend into or continue.
    pub fn active_labels(&mut self, grammar: &Grammar, min_word_frames: usize) -> &[LabelId] {
        let Self {
            hypotheses,
            active,
            label_seen,
            ..
        } = self;

        active.clear();
        for hyp in hypotheses.iter() {
            let from = match hyp.cursor {
                Cursor::At(node) => Some(node),
                Cursor::In { edge, dwell } => {
                    let Some(edge) = grammar.edge(edge) else {
                        continue;
                    };
                    mark(edge.label, active, label_seen);
                    (dwell as usize >= min_word_frames).then_some(edge.target)
                }
            };
            for &edge in from.map_or(&[][..], |node| grammar.out_edges(node)) {
                if let Some(edge) = grammar.edge(edge) {
                    mark(edge.label, active, label_seen);
                }
            }
        }

        for &label in active.iter() {
            label_seen[label] = false;
        }
        active
    }

    /// Expands every live hypothesis by one frame into the pending set,
    /// merging per cursor, then prunes it.
    pub fn prepare(
        &mut self,
        grammar: &Grammar,
        scores: &FrameScores,
        config: &DecoderConfig,
        threshold: f32,
    ) -> Result<FrameSummary, IntentError> {
        let Self {
            hypotheses,
            pending,
            slots,
            node_count,
            max_out_degree,
            ..
        } = self;

        pending.clear();
        pending.try_reserve(hypotheses.len() * (2 + *max_out_degree))?;

        let mut merge = Merge {
            pending: &mut *pending,
            slots: slots.as_mut_slice(),
            node_count: *node_count,
        };
        let expanded = expand(&mut merge, hypotheses.as_slice(), grammar, scores, config);

        for hyp in merge.pending.iter() {
            let key = merge.key(hyp.cursor);
            if let Some(slot) = merge.slots.get_mut(key) {
                *slot = None;
            }
        }
        expanded?;

        let best = pending
            .iter()
            .map(|h| h.score)
            .fold(f32::NEG_INFINITY, f32::max);
        pending.retain(|h| h.score >= best - config.prune_margin);
        pending.sort_by(|a, b| b.score.total_cmp(&a.score));
        pending.truncate(config.beam_width.max(1));

        let accepted = |h: &Hypothesis| {
            h.confidence() >= threshold
                && h.terminal(grammar, config.min_word_frames).is_some()
        };
        let start = grammar.start();
        let summary = FrameSummary {
            hypotheses: pending.len(),
            best_score: best,
            advanced: pending.iter().any(|h| !h.is_at(start)),
            accepted_terminal: pending.iter().any(accepted),
            best_is_accepted_terminal: pending.first().is_some_and(accepted),
        };

        log::trace!(
            "Frontier {} -> {} hypotheses (best {:.2})",
            hypotheses.len(),
            summary.hypotheses,
            summary.best_score
        );
        Ok(summary)
    }

    /// Makes the pending set live.
    pub fn commit(&mut self) {
        std::mem::swap(&mut self.hypotheses, &mut self.pending);
        self.pending.clear();
    }
}

fn expand(
    merge: &mut Merge<'_>,
    hypotheses: &[Hypothesis],
    grammar: &Grammar,
    scores: &FrameScores,
    config: &DecoderConfig,
) -> Result<(), TryReserveError> {
    let entry_floor = config.entry_floor.ln();
    let pause = scores.silence_log();

    for parent in hypotheses {
        match parent.cursor {
            Cursor::At(node) => {
                merge.offer(
                    parent,
                    Step {
                        cursor: parent.cursor,
                        score: parent.score + pause,
                        word_score: parent.word_score,
                        word_frames: parent.word_frames,
                        binding: None,
                    },
                )?;
                merge.enter_from(grammar, scores, node, parent, entry_floor)?;
            }
            Cursor::In { edge: edge_id, dwell } => {
                let Some(edge) = grammar.edge(edge_id) else {
                    continue;
                };
                let lp = scores.label(edge.label).max(MIN_LOG_PROB);
                merge.offer(
                    parent,
                    Step {
                        cursor: Cursor::In {
                            edge: edge_id,
                            dwell: dwell.saturating_add(1),
                        },
                        score: parent.score + lp,
                        word_score: parent.word_score + lp,
                        word_frames: parent.word_frames + 1,
                        binding: None,
                    },
                )?;

                if dwell as usize >= config.min_word_frames {
                    merge.offer(
                        parent,
                        Step {
                            cursor: Cursor::At(edge.target),
                            score: parent.score + pause,
                            word_score: parent.word_score,
                            word_frames: parent.word_frames,
                            binding: None,
                        },
                    )?;
                    merge.enter_from(grammar, scores, edge.target, parent, entry_floor)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::ContextDefinition;

    fn grammar() -> Grammar {
        let context = ContextDefinition::from_json(
            r#"{
                "name": "coffee",
                "intents": [{ "name": "order", "expressions": ["brew $size:size"] }],
                "slots": [{ "name": "size", "values": ["small", "large"] }]
            }"#,
        )
        .unwrap();
        let vocab: Vec<String> = ["brew", "small", "large"].map(String::from).to_vec();
        Grammar::compile(&context, &vocab).unwrap()
    }

    fn frame(grammar: &Grammar, word: Option<&str>) -> FrameScores {
        let mut scores = FrameScores::new(grammar.labels().len());
        for (id, label) in grammar.labels().iter().enumerate() {
            let p: f32 = if Some(label.as_str()) == word { 0.95 } else { 0.01 };
            scores.set_label(id, p.ln());
        }
        scores.set_silence(if word.is_some() { 0.0 } else { 1.0 });
        scores
    }

    fn step(frontier: &mut Frontier, grammar: &Grammar, word: Option<&str>) -> FrameSummary {
        let config = DecoderConfig::default();
        let summary = frontier
            .prepare(grammar, &frame(grammar, word), &config, 0.5)
            .unwrap();
        frontier.commit();
        summary
    }

    #[test]
    fn silence_keeps_the_root_hypothesis() {
        let grammar = grammar();
        let mut frontier = Frontier::new(&grammar);
        for _ in 0..5 {
            let summary = step(&mut frontier, &grammar, None);
            assert!(!summary.advanced);
        }
        assert_eq!(frontier.len(), 1);
        assert!(frontier.hypotheses()[0].is_at(grammar.start()));
        assert_eq!(frontier.hypotheses()[0].score, 0.0);
    }

    #[test]
    fn only_reachable_labels_are_active() {
        let grammar = grammar();
        let mut frontier = Frontier::new(&grammar);
        let active = frontier.active_labels(&grammar, 2).to_vec();
        assert_eq!(active, vec![0]);

        for _ in 0..3 {
            step(&mut frontier, &grammar, Some("brew"));
        }
        let mut active = frontier.active_labels(&grammar, 2).to_vec();
        active.sort();
        assert_eq!(active, vec![0, 1, 2]);
    }

    #[test]
    fn matching_words_reach_an_accepted_terminal_with_binding() {
        let grammar = grammar();
        let mut frontier = Frontier::new(&grammar);
        for word in ["brew", "brew", "brew", "large", "large", "large"] {
            step(&mut frontier, &grammar, Some(word));
        }
        let summary = step(&mut frontier, &grammar, None);
        assert!(summary.advanced);
        assert!(summary.accepted_terminal);
        assert!(summary.best_is_accepted_terminal);

        let best = &frontier.hypotheses()[0];
        assert_eq!(best.bindings.len(), 1);
        assert_eq!(grammar.value(best.bindings[0].value), Some("large"));
        assert!(best.confidence() > 0.9);
        assert_eq!(best.word_frames, 6);
    }

    #[test]
    fn words_below_the_entry_floor_are_not_entered() {
        let grammar = grammar();
        let mut frontier = Frontier::new(&grammar);
        let summary = step(&mut frontier, &grammar, Some("large"));
        assert!(!summary.advanced);
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn beam_width_bounds_the_frontier() {
        let grammar = grammar();
        let mut frontier = Frontier::new(&grammar);
        let config = DecoderConfig {
            beam_width: 1,
            ..Default::default()
        };
        for _ in 0..4 {
            frontier
                .prepare(&grammar, &frame(&grammar, Some("brew")), &config, 0.5)
                .unwrap();
            frontier.commit();
            assert_eq!(frontier.len(), 1);
        }
    }

    #[test]
    fn prepare_without_commit_leaves_live_set_untouched() {
        let grammar = grammar();
        let mut frontier = Frontier::new(&grammar);
        step(&mut frontier, &grammar, Some("brew"));
        let before = frontier.hypotheses().to_vec();
        frontier
            .prepare(
                &grammar,
                &frame(&grammar, Some("brew")),
                &DecoderConfig::default(),
                0.5,
            )
            .unwrap();
        assert_eq!(frontier.hypotheses(), before.as_slice());
    }
}

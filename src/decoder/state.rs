use crate::grammar::{Binding, EdgeId, Grammar, NodeId};

/// Position of a hypothesis in the grammar network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Between words, resting on a node.
    At(NodeId),
    /// Inside the word of `edge`, `dwell` frames in.
    In { edge: EdgeId, dwell: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub cursor: Cursor,
    /// Accumulated log score over every frame.
    pub score: f32,
    /// Accumulated label log probability over frames spent inside words.
    pub word_score: f32,
    pub word_frames: u32,
    /// Slot values chosen so far, in path order.
    pub bindings: Vec<Binding>,
}

impl Hypothesis {
    pub fn root(start: NodeId) -> Self {
        Self {
            cursor: Cursor::At(start),
            score: 0.0,
            word_score: 0.0,
            word_frames: 0,
            bindings: Vec::new(),
        }
    }

    /// Geometric-mean label posterior over the word frames, in `[0, 1]`.
    pub fn confidence(&self) -> f32 {
        if self.word_frames == 0 {
            return 0.0;
        }
        (self.word_score / self.word_frames as f32).exp().clamp(0.0, 1.0)
    }

    /// Terminal node this hypothesis could end on right now, if any.
    pub fn terminal(&self, grammar: &Grammar, min_word_frames: usize) -> Option<NodeId> {
        let node = match self.cursor {
            Cursor::At(node) => node,
            Cursor::In { edge, dwell } if dwell as usize >= min_word_frames => {
                grammar.edge(edge)?.target
            }
            Cursor::In { .. } => return None,
        };
        grammar.is_terminal(node).then_some(node)
    }

    pub fn is_at(&self, node: NodeId) -> bool {
        self.cursor == Cursor::At(node)
    }
}

/// What one search step observed, handed to the endpoint detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    pub hypotheses: usize,
    pub best_score: f32,
    /// Some hypothesis has left the start node.
    pub advanced: bool,
    /// Some terminal-capable hypothesis clears the acceptance threshold.
    pub accepted_terminal: bool,
    /// The overall best hypothesis is such a hypothesis.
    pub best_is_accepted_terminal: bool,
}

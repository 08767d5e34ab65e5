use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use regex::Regex;

use super::context::{parse_expression, phrase_words, ContextDefinition, ExpressionToken, SlotDomain};
use super::{Edge, EdgeId, Grammar, IntentId, LabelId, Node, NodeId, SlotId, ValueId};
use crate::error::IntentError;

fn invalid(msg: String) -> IntentError {
    IntentError::InvalidContext(msg)
}

/// A slot type with its value phrases resolved to vocabulary labels.
struct ResolvedSlot {
    /// `(phrase, labels)` per admissible value.
    values: Vec<(String, Vec<LabelId>)>,
}

struct NetworkBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    slot_names: Vec<String>,
    slot_index: HashMap<String, SlotId>,
    values: Vec<String>,
    value_index: HashMap<String, ValueId>,
    /// Join node of the fan created for `(from, slot type, slot name)`.
    fans: HashMap<(NodeId, usize, SlotId), NodeId>,
}

impl NetworkBuilder {
    fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            edges: Vec::new(),
            slot_names: Vec::new(),
            slot_index: HashMap::new(),
            values: Vec::new(),
            value_index: HashMap::new(),
            fans: HashMap::new(),
        }
    }

    fn add_node(&mut self) -> NodeId {
        self.nodes.push(Node::default());
        NodeId((self.nodes.len() - 1) as u32)
    }

    fn add_edge(&mut self, from: NodeId, edge: Edge) {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(edge);
        self.nodes[from.index()].edges.push(id);
    }

    fn intern_slot(&mut self, name: &str) -> SlotId {
        if let Some(&id) = self.slot_index.get(name) {
            return id;
        }
        self.slot_names.push(name.to_string());
        let id = self.slot_names.len() - 1;
        self.slot_index.insert(name.to_string(), id);
        id
    }

    fn intern_value(&mut self, phrase: &str) -> ValueId {
        if let Some(&id) = self.value_index.get(phrase) {
            return id;
        }
        self.values.push(phrase.to_string());
        let id = self.values.len() - 1;
        self.value_index.insert(phrase.to_string(), id);
        id
    }

    /// Follows or creates the literal edge `from --label-->`.
    fn literal(&mut self, from: NodeId, label: LabelId) -> NodeId {
        let existing = self.nodes[from.index()]
            .edges
            .iter()
            .map(|id| &self.edges[id.index()])
            .find(|e| e.slot.is_none() && e.label == label)
            .map(|e| e.target);
        if let Some(target) = existing {
            return target;
        }
        let target = self.add_node();
        self.add_edge(
            from,
            Edge {
                target,
                label,
                slot: None,
                value: None,
                closes_intent: false,
            },
        );
        target
    }

    /// Follows or creates the fan of every value of `slot_type` leaving
    /// `from`, returning the node where the alternatives merge.
    fn slot(&mut self, from: NodeId, slot_type: usize, slot: &ResolvedSlot, name: &str) -> NodeId {
        let slot_id = self.intern_slot(name);
        if let Some(&join) = self.fans.get(&(from, slot_type, slot_id)) {
            return join;
        }

        let join = self.add_node();
        for (phrase, labels) in &slot.values {
            let value_id = self.intern_value(phrase);
            let mut cur = from;
            for (i, &label) in labels.iter().enumerate() {
                let last = i + 1 == labels.len();
                let target = if last { join } else { self.add_node() };
                self.add_edge(
                    cur,
                    Edge {
                        target,
                        label,
                        slot: Some(slot_id),
                        value: last.then_some(value_id),
                        closes_intent: false,
                    },
                );
                cur = target;
            }
        }
        self.fans.insert((from, slot_type, slot_id), join);
        join
    }
}

impl Grammar {
    /// Compiles `context` into a transition network over `vocabulary`, the
    /// label set of the acoustic model the grammar will be decoded with.
    pub fn compile(context: &ContextDefinition, vocabulary: &[String]) -> Result<Self, IntentError> {
        if context.intents.is_empty() {
            return Err(invalid(format!("context '{}' has no intents", context.name)));
        }

        let label_index: HashMap<String, LabelId> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, w)| (w.to_lowercase(), i))
            .collect();
        let lookup = |word: &str| {
            label_index.get(word).copied().ok_or_else(|| {
                invalid(format!("word '{word}' is not in the model vocabulary"))
            })
        };

        let mut slot_types: HashMap<&str, usize> = HashMap::new();
        let mut resolved = Vec::with_capacity(context.slots.len());
        for (i, def) in context.slots.iter().enumerate() {
            if slot_types.insert(def.name.as_str(), i).is_some() {
                return Err(invalid(format!("duplicate slot '{}'", def.name)));
            }
            resolved.push(resolve_slot(&def.name, &def.domain, vocabulary, &lookup)?);
        }

        let mut seen_intents = HashSet::new();
        let mut builder = NetworkBuilder::new();
        for (intent_id, intent) in context.intents.iter().enumerate() {
            if !seen_intents.insert(intent.name.as_str()) {
                return Err(invalid(format!("duplicate intent '{}'", intent.name)));
            }
            if intent.expressions.is_empty() {
                return Err(invalid(format!("intent '{}' has no expressions", intent.name)));
            }

            for expression in &intent.expressions {
                let mut cur = NodeId(0);
                for token in parse_expression(expression)? {
                    cur = match token {
                        ExpressionToken::Word(word) => builder.literal(cur, lookup(&word)?),
                        ExpressionToken::Slot { slot_type, name } => {
                            let &type_id = slot_types.get(slot_type.as_str()).ok_or_else(|| {
                                invalid(format!(
                                    "unknown slot '{slot_type}' in '{expression}'"
                                ))
                            })?;
                            builder.slot(cur, type_id, &resolved[type_id], &name)
                        }
                    };
                }
                mark_terminal(&mut builder, cur, intent_id, context, expression)?;
            }
        }

        let NetworkBuilder {
            nodes,
            mut edges,
            slot_names,
            values,
            ..
        } = builder;

        for edge in &mut edges {
            edge.closes_intent = nodes[edge.target.index()].intent.is_some();
        }
        if let Some(dead) = nodes
            .iter()
            .position(|n| n.edges.is_empty() && n.intent.is_none())
        {
            return Err(invalid(format!("node {dead} is a dead end")));
        }

        let info = describe(context, &resolved);
        log::info!(
            "Compiled context '{}': {} intents, {} nodes, {} edges",
            context.name,
            context.intents.len(),
            nodes.len(),
            edges.len()
        );

        Ok(Self {
            name: context.name.clone(),
            labels: vocabulary.to_vec(),
            intents: context.intents.iter().map(|i| i.name.clone()).collect(),
            slot_names,
            values,
            nodes,
            edges,
            info,
        })
    }
}

fn resolve_slot(
    name: &str,
    domain: &SlotDomain,
    vocabulary: &[String],
    lookup: &impl Fn(&str) -> Result<LabelId, IntentError>,
) -> Result<ResolvedSlot, IntentError> {
    let mut values: Vec<(String, Vec<LabelId>)> = Vec::new();
    match domain {
        SlotDomain::Values(phrases) => {
            for phrase in phrases {
                let words = phrase_words(phrase);
                if words.is_empty() {
                    return Err(invalid(format!("slot '{name}' has an empty value")));
                }
                let canonical = words.join(" ");
                if values.iter().any(|(p, _)| *p == canonical) {
                    log::warn!("Slot '{name}' lists '{canonical}' more than once");
                    continue;
                }
                let labels = words
                    .iter()
                    .map(|w| lookup(w))
                    .collect::<Result<Vec<_>, _>>()?;
                values.push((canonical, labels));
            }
        }
        SlotDomain::Pattern(pattern) => {
            let re = Regex::new(pattern)
                .map_err(|e| invalid(format!("slot '{name}' pattern: {e}")))?;
            for (label, word) in vocabulary.iter().enumerate() {
                let word = word.to_lowercase();
                if re.is_match(&word) && !values.iter().any(|(p, _)| *p == word) {
                    values.push((word, vec![label]));
                }
            }
        }
    }

    if values.is_empty() {
        return Err(invalid(format!("slot '{name}' has no admissible values")));
    }
    Ok(ResolvedSlot { values })
}

fn mark_terminal(
    builder: &mut NetworkBuilder,
    node: NodeId,
    intent_id: IntentId,
    context: &ContextDefinition,
    expression: &str,
) -> Result<(), IntentError> {
    match builder.nodes[node.index()].intent {
        None => builder.nodes[node.index()].intent = Some(intent_id),
        Some(existing) if existing == intent_id => {
            log::warn!(
                "Duplicate expression '{}' in intent '{}'",
                expression,
                context.intents[intent_id].name
            );
        }
        Some(existing) => {
            return Err(invalid(format!(
                "expression '{}' is claimed by both '{}' and '{}'",
                expression, context.intents[existing].name, context.intents[intent_id].name
            )));
        }
    }
    Ok(())
}

fn describe(context: &ContextDefinition, slots: &[ResolvedSlot]) -> String {
    let mut out = String::from("context:\n  expressions:\n");
    for intent in &context.intents {
        let _ = writeln!(out, "    {}:", intent.name);
        for expression in &intent.expressions {
            let _ = writeln!(out, "      - {}", expression.trim());
        }
    }
    if !context.slots.is_empty() {
        out.push_str("  slots:\n");
        for (def, slot) in context.slots.iter().zip(slots) {
            let _ = writeln!(out, "    {}:", def.name);
            for (phrase, _) in &slot.values {
                let _ = writeln!(out, "      - {phrase}");
            }
        }
    }
    out
}

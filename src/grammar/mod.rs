//! Compiled, immutable grammar network shared by every session decoding
//! against the same context.
//!
//! Nodes and edges live in flat arenas addressed by [`NodeId`] and
//! [`EdgeId`]. Lookups with an id the network never produced return empty
//! results instead of panicking.

mod compile;
pub mod context;

pub use context::{
    parse_expression, ContextDefinition, ExpressionToken, IntentDefinition, SlotDefinition,
    SlotDomain,
};

/// Index into the acoustic model vocabulary.
pub type LabelId = usize;
/// Index of a reported slot name.
pub type SlotId = usize;
/// Index of a slot value phrase.
pub type ValueId = usize;
pub type IntentId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A slot value chosen along a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub slot: SlotId,
    pub value: ValueId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: NodeId,
    /// Acoustic label the edge expects.
    pub label: LabelId,
    /// Set on every edge of a slot value phrase.
    pub slot: Option<SlotId>,
    /// Set on the last edge of a slot value phrase only.
    pub value: Option<ValueId>,
    /// Whether `target` completes an expression.
    pub closes_intent: bool,
}

impl Edge {
    pub fn binding(&self) -> Option<Binding> {
        Some(Binding {
            slot: self.slot?,
            value: self.value?,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    edges: Vec<EdgeId>,
    intent: Option<IntentId>,
}

#[derive(Debug)]
pub struct Grammar {
    name: String,
    labels: Vec<String>,
    intents: Vec<String>,
    slot_names: Vec<String>,
    values: Vec<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    info: String,
}

impl Grammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Largest number of edges leaving any single node.
    pub fn max_out_degree(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).max().unwrap_or(0)
    }

    /// Outgoing edges of `node`.
    pub fn out_edges(&self, node: NodeId) -> &[EdgeId] {
        self.nodes
            .get(node.index())
            .map(|n| n.edges.as_slice())
            .unwrap_or(&[])
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    pub fn is_terminal(&self, node: NodeId) -> bool {
        self.terminal_intent(node).is_some()
    }

    pub fn terminal_intent(&self, node: NodeId) -> Option<IntentId> {
        self.nodes.get(node.index()).and_then(|n| n.intent)
    }

    /// Name of the intent owning a terminal node.
    pub fn intent_of(&self, node: NodeId) -> Option<&str> {
        self.terminal_intent(node)
            .and_then(|i| self.intents.get(i))
            .map(String::as_str)
    }

    pub fn intents(&self) -> &[String] {
        &self.intents
    }

    /// Acoustic vocabulary the grammar was compiled against.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, id: LabelId) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn slot_name(&self, id: SlotId) -> Option<&str> {
        self.slot_names.get(id).map(String::as_str)
    }

    pub fn value(&self, id: ValueId) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }

    /// Human-readable listing of the context's expressions and slots.
    pub fn describe(&self) -> &str {
        &self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn lights_context() -> ContextDefinition {
        ContextDefinition::from_json(
            r#"{
                "name": "lights",
                "intents": [
                    { "name": "turnLightOn", "expressions": ["turn on the $location:location light"] },
                    { "name": "turnLightOff", "expressions": ["turn off the $location:location light"] }
                ],
                "slots": [{ "name": "location", "values": ["kitchen", "living room"] }]
            }"#,
        )
        .unwrap()
    }

    fn lights_vocab() -> Vec<String> {
        vocab(&["turn", "on", "off", "the", "light", "kitchen", "living", "room"])
    }

    #[test]
    fn shared_prefix_is_compiled_once() {
        let grammar = Grammar::compile(&lights_context(), &lights_vocab()).unwrap();
        let from_start = grammar.out_edges(grammar.start());
        assert_eq!(from_start.len(), 1, "both intents start with 'turn'");

        let turn = grammar.edge(from_start[0]).unwrap();
        assert_eq!(grammar.label(turn.label), Some("turn"));
        assert_eq!(grammar.out_edges(turn.target).len(), 2);
        assert_eq!(grammar.max_out_degree(), 2);
    }

    #[test]
    fn slot_fan_merges_into_one_join_node() {
        let grammar = Grammar::compile(&lights_context(), &lights_vocab()).unwrap();
        let mut node = grammar.start();
        for _ in 0..3 {
            let first = grammar.out_edges(node)[0];
            node = grammar.edge(first).unwrap().target;
        }

        let fan = grammar.out_edges(node);
        assert_eq!(fan.len(), 2);
        let kitchen = grammar.edge(fan[0]).unwrap();
        assert_eq!(grammar.value(kitchen.value.unwrap()), Some("kitchen"));
        assert_eq!(grammar.slot_name(kitchen.slot.unwrap()), Some("location"));

        let living = grammar.edge(fan[1]).unwrap();
        assert!(living.value.is_none(), "binding sits on the last word");
        let room = grammar.edge(grammar.out_edges(living.target)[0]).unwrap();
        assert_eq!(grammar.value(room.value.unwrap()), Some("living room"));
        assert_eq!(room.target, kitchen.target);
    }

    #[test]
    fn terminal_nodes_carry_their_intent() {
        let grammar = Grammar::compile(&lights_context(), &lights_vocab()).unwrap();
        let terminals: Vec<_> = (0..grammar.node_count() as u32)
            .map(NodeId)
            .filter_map(|n| grammar.intent_of(n))
            .collect();
        assert_eq!(terminals.len(), 2);
        assert!(terminals.contains(&"turnLightOn"));
        assert!(terminals.contains(&"turnLightOff"));

        let closing = (0..grammar.edge_count() as u32)
            .map(EdgeId)
            .filter_map(|e| grammar.edge(e))
            .filter(|e| e.closes_intent)
            .count();
        assert_eq!(closing, 2);
    }

    #[test]
    fn unknown_ids_are_empty_rather_than_panicking() {
        let grammar = Grammar::compile(&lights_context(), &lights_vocab()).unwrap();
        assert!(grammar.out_edges(NodeId(9999)).is_empty());
        assert!(grammar.edge(EdgeId(9999)).is_none());
        assert!(grammar.intent_of(NodeId(9999)).is_none());
    }

    #[test]
    fn describe_lists_expressions_and_slots() {
        let grammar = Grammar::compile(&lights_context(), &lights_vocab()).unwrap();
        let info = grammar.describe();
        assert!(info.starts_with("context:"));
        assert!(info.contains("turnLightOn:"));
        assert!(info.contains("- turn on the $location:location light"));
        assert!(info.contains("- living room"));
    }

    #[test]
    fn grammar_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Grammar>();
    }
}

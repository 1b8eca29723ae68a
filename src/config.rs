//! Graph configuration: the declarative topology a graph is built from.
//!
//! A [`GraphConfig`] is plain data: serde-serializable structs plus a
//! [`FromStr`] parser for a small text format:
//!
//! ```text
//! # Streams crossing the graph boundary.
//! input_stream: "tick_start"
//! input_stream: "tick_end"
//! output_stream: "rate"
//!
//! node {
//!   calculator: "RateCalculator"
//!   input_stream: "TICK:0:tick_start"
//!   input_stream: "TICK:1:tick_end"
//!   output_stream: "RATE:rate"
//!   input_side_packet: "FREQUENCY:frequency"
//! }
//! ```
//!
//! A stream binding takes one of three forms: a bare stream name (untagged,
//! positional), `TAG:name`, or `TAG:index:name`. Tags are upper-case
//! (`[A-Z_][A-Z0-9_]*`), stream and side packet names lower-case
//! (`[a-z_][a-z0-9_]*`). Omitted indices count up per tag in declaration
//! order.

use crate::error::GraphError;
use crate::port::PortKey;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One stream binding on a node: which port, which stream.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamBinding {
    /// The port on the node.
    pub key: PortKey,
    /// The graph-wide stream name.
    pub stream: String,
}

impl StreamBinding {
    /// Creates a binding from a port key and a stream name.
    #[must_use]
    pub fn new(key: PortKey, stream: impl Into<String>) -> Self {
        Self {
            key,
            stream: stream.into(),
        }
    }
}

/// One side packet binding on a node: the slot tag the calculator declares
/// and the graph-wide side packet name it resolves to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SidePacketBinding {
    /// Slot tag the calculator sees.
    pub tag: String,
    /// Graph-wide side packet name bound at run start.
    pub name: String,
}

/// Configuration of one node.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Registered calculator name to instantiate.
    pub calculator: String,
    /// Optional node name; defaults to the calculator name plus a positional
    /// suffix when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Input stream bindings in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_streams: Vec<StreamBinding>,
    /// Output stream bindings in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_streams: Vec<StreamBinding>,
    /// Side packet bindings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_side_packets: Vec<SidePacketBinding>,
    /// Input stream handler name; the default policy when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_stream_handler: Option<String>,
    /// Fixed-size handler option: buffered packets per input required to fire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_queue_size: Option<usize>,
    /// Fixed-size handler option: packets drained per input per firing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_queue_size: Option<usize>,
    /// Fixed-size handler option: drain the same count from every live input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_min_size: Option<bool>,
}

impl NodeConfig {
    /// Creates a node config for a registered calculator name.
    #[must_use]
    pub fn new(calculator: impl Into<String>) -> Self {
        Self {
            calculator: calculator.into(),
            ..Self::default()
        }
    }
}

/// Configuration of a whole graph: boundary streams plus nodes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Streams fed from outside the graph.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_streams: Vec<String>,
    /// Streams observable from outside the graph.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_streams: Vec<String>,
    /// Nodes in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeConfig>,
}

impl FromStr for GraphConfig {
    type Err = GraphError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Parser::new(text).parse()
    }
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase() || c == '_')
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Per-node counters assigning indices to bindings that omit them.
#[derive(Default)]
struct IndexCounters {
    counters: Vec<(String, usize)>,
}

impl IndexCounters {
    fn next(&mut self, tag: &str) -> usize {
        match self.counters.iter_mut().find(|(t, _)| t == tag) {
            Some((_, counter)) => {
                let index = *counter;
                *counter += 1;
                index
            }
            None => {
                self.counters.push((tag.to_string(), 1));
                0
            }
        }
    }

    fn claim(&mut self, tag: &str, index: usize) {
        match self.counters.iter_mut().find(|(t, _)| t == tag) {
            Some((_, counter)) => *counter = (*counter).max(index + 1),
            None => self.counters.push((tag.to_string(), index + 1)),
        }
    }
}

/// One node block under construction.
#[derive(Default)]
struct NodeBuilder {
    config: NodeConfig,
    input_counters: IndexCounters,
    output_counters: IndexCounters,
}

/// Parsed right-hand side of a `key: value` line.
enum Value {
    Text(String),
    Integer(usize),
    Boolean(bool),
}

struct Parser<'a> {
    text: &'a str,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text }
    }

    fn parse(self) -> Result<GraphConfig, GraphError> {
        let mut config = GraphConfig::default();
        let mut node: Option<NodeBuilder> = None;

        for (number, raw) in self.text.lines().enumerate() {
            let line_number = number + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if line == "}" {
                let builder = node.take().ok_or_else(|| {
                    wiring_at(line_number, "unmatched '}' outside a node block")
                })?;
                if builder.config.calculator.is_empty() {
                    return Err(wiring_at(line_number, "node block without a calculator"));
                }
                config.nodes.push(builder.config);
                continue;
            }
            if line == "node {" || line == "node{" {
                if node.is_some() {
                    return Err(wiring_at(line_number, "node blocks do not nest"));
                }
                node = Some(NodeBuilder::default());
                continue;
            }

            let (field, value) = split_field(line, line_number)?;
            match node.as_mut() {
                Some(builder) => apply_node_field(builder, field, value, line_number)?,
                None => apply_graph_field(&mut config, field, value, line_number)?,
            }
        }

        if node.is_some() {
            return Err(GraphError::wiring("unterminated node block at end of input"));
        }
        Ok(config)
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (position, character) in line.char_indices() {
        match character {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..position],
            _ => {}
        }
    }
    line
}

fn wiring_at(line_number: usize, message: impl std::fmt::Display) -> GraphError {
    GraphError::wiring(format!("config line {}: {}", line_number, message))
}

fn split_field(line: &str, line_number: usize) -> Result<(&str, Value), GraphError> {
    let (field, rest) = line
        .split_once(':')
        .ok_or_else(|| wiring_at(line_number, format!("expected 'field: value', got '{}'", line)))?;
    let field = field.trim();
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(wiring_at(line_number, format!("field '{}' has no value", field)));
    }
    let value = if let Some(inner) = rest.strip_prefix('"') {
        let inner = inner
            .strip_suffix('"')
            .ok_or_else(|| wiring_at(line_number, "unterminated string value"))?;
        Value::Text(inner.to_string())
    } else if rest == "true" || rest == "false" {
        Value::Boolean(rest == "true")
    } else {
        let integer = rest
            .parse::<usize>()
            .map_err(|_| {
                wiring_at(
                    line_number,
                    format!("expected a quoted string, integer, or bool, got '{}'", rest),
                )
            })?;
        Value::Integer(integer)
    };
    Ok((field, value))
}

fn expect_text(field: &str, value: Value, line_number: usize) -> Result<String, GraphError> {
    match value {
        Value::Text(text) => Ok(text),
        _ => Err(wiring_at(
            line_number,
            format!("field '{}' takes a quoted string", field),
        )),
    }
}

fn apply_graph_field(
    config: &mut GraphConfig,
    field: &str,
    value: Value,
    line_number: usize,
) -> Result<(), GraphError> {
    match field {
        "input_stream" => {
            let name = expect_text(field, value, line_number)?;
            if !is_valid_name(&name) {
                return Err(wiring_at(line_number, format!("invalid stream name '{}'", name)));
            }
            if config.input_streams.contains(&name) {
                return Err(wiring_at(
                    line_number,
                    format!("duplicate graph input stream '{}'", name),
                ));
            }
            config.input_streams.push(name);
        }
        "output_stream" => {
            let name = expect_text(field, value, line_number)?;
            if !is_valid_name(&name) {
                return Err(wiring_at(line_number, format!("invalid stream name '{}'", name)));
            }
            if config.output_streams.contains(&name) {
                return Err(wiring_at(
                    line_number,
                    format!("duplicate graph output stream '{}'", name),
                ));
            }
            config.output_streams.push(name);
        }
        other => {
            return Err(wiring_at(
                line_number,
                format!("unknown graph field '{}'", other),
            ));
        }
    }
    Ok(())
}

fn apply_node_field(
    builder: &mut NodeBuilder,
    field: &str,
    value: Value,
    line_number: usize,
) -> Result<(), GraphError> {
    match field {
        "calculator" => {
            let name = expect_text(field, value, line_number)?;
            if !builder.config.calculator.is_empty() {
                return Err(wiring_at(line_number, "node already has a calculator"));
            }
            builder.config.calculator = name;
        }
        "name" => {
            let name = expect_text(field, value, line_number)?;
            if builder.config.name.is_some() {
                return Err(wiring_at(line_number, "node already has a name"));
            }
            builder.config.name = Some(name);
        }
        "input_stream" => {
            let raw = expect_text(field, value, line_number)?;
            let binding = parse_stream_binding(&raw, &mut builder.input_counters, line_number)?;
            builder.config.input_streams.push(binding);
        }
        "output_stream" => {
            let raw = expect_text(field, value, line_number)?;
            let binding = parse_stream_binding(&raw, &mut builder.output_counters, line_number)?;
            builder.config.output_streams.push(binding);
        }
        "input_side_packet" => {
            let raw = expect_text(field, value, line_number)?;
            let (tag, name) = raw.split_once(':').ok_or_else(|| {
                wiring_at(line_number, format!("side packet binding '{}' must be TAG:name", raw))
            })?;
            if !is_valid_tag(tag) {
                return Err(wiring_at(line_number, format!("invalid side packet tag '{}'", tag)));
            }
            if !is_valid_name(name) {
                return Err(wiring_at(line_number, format!("invalid side packet name '{}'", name)));
            }
            builder.config.input_side_packets.push(SidePacketBinding {
                tag: tag.to_string(),
                name: name.to_string(),
            });
        }
        "input_stream_handler" => {
            let name = expect_text(field, value, line_number)?;
            builder.config.input_stream_handler = Some(name);
        }
        "trigger_queue_size" => match value {
            Value::Integer(size) => builder.config.trigger_queue_size = Some(size),
            _ => return Err(wiring_at(line_number, "trigger_queue_size takes an integer")),
        },
        "target_queue_size" => match value {
            Value::Integer(size) => builder.config.target_queue_size = Some(size),
            _ => return Err(wiring_at(line_number, "target_queue_size takes an integer")),
        },
        "fixed_min_size" => match value {
            Value::Boolean(flag) => builder.config.fixed_min_size = Some(flag),
            _ => return Err(wiring_at(line_number, "fixed_min_size takes a bool")),
        },
        other => {
            return Err(wiring_at(line_number, format!("unknown node field '{}'", other)));
        }
    }
    Ok(())
}

/// Parses `name`, `TAG:name`, or `TAG:index:name`.
fn parse_stream_binding(
    raw: &str,
    counters: &mut IndexCounters,
    line_number: usize,
) -> Result<StreamBinding, GraphError> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (tag, explicit_index, stream) = match parts.as_slice() {
        [stream] => ("", None, *stream),
        [tag, stream] => (*tag, None, *stream),
        [tag, index, stream] => {
            let index = index.parse::<usize>().map_err(|_| {
                wiring_at(line_number, format!("invalid port index in binding '{}'", raw))
            })?;
            (*tag, Some(index), *stream)
        }
        _ => {
            return Err(wiring_at(
                line_number,
                format!("stream binding '{}' has too many ':' separators", raw),
            ));
        }
    };
    if !tag.is_empty() && !is_valid_tag(tag) {
        return Err(wiring_at(line_number, format!("invalid port tag '{}'", tag)));
    }
    if !is_valid_name(stream) {
        return Err(wiring_at(line_number, format!("invalid stream name '{}'", stream)));
    }
    let index = match explicit_index {
        Some(index) => {
            counters.claim(tag, index);
            index
        }
        None => counters.next(tag),
    };
    Ok(StreamBinding::new(PortKey::new(tag, index), stream))
}

//! GraphML ingestion for delay graphs, plus the goal-file reader.
//!
//! The expected input is a single `<graph edgedefault="directed">` in the
//! GraphML namespace. Every `<node>` carries `<data>` children for the vertex
//! attributes (`VertexId`, `NodeType`, `NodeUniqueId`, the three cost keys,
//! `IsRegistered`, `IsInputTerminal`, `IsOutputTerminal`,
//! `DisallowRegister`); every `<edge>` carries `Delay` and `IsFeedback`.
//! `<key>` declarations mapping key ids to attribute names are honoured when
//! present; otherwise the `key` attribute is taken as the attribute name
//! directly. Unknown data keys are ignored.
//!
//! The goal file is a small XML document whose root contains a
//! `<TargetClockPeriodInPicoSeconds>` element with a positive integer.

use super::{DelayEdge, DelayGraph, DelayNode, NodeType};
use std::collections::HashMap;
use std::{error::Error, fmt};

/// Error response of [`parse`] and [`parse_goal`].
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    SyntaxError(String),
    MissingElement(String),
    MissingData { element: String, key: String },
    InvalidValue { key: String, value: String },
    DuplicateVertex(String),
    UndefinedEndpoint(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::SyntaxError(err) => write!(f, "{}", err),
            ParseError::MissingElement(name) => write!(f, "Missing element: {}", name),
            ParseError::MissingData { element, key } => {
                write!(f, "Element {} is missing data key {}", element, key)
            }
            ParseError::InvalidValue { key, value } => {
                write!(f, "Invalid value for {}: {:?}", key, value)
            }
            ParseError::DuplicateVertex(id) => write!(f, "Duplicate vertex: {}", id),
            ParseError::UndefinedEndpoint(id) => write!(f, "Undefined edge endpoint: {}", id),
        }
    }
}

impl Error for ParseError {}

/// Resolved `<data>` values of one element, keyed by attribute name.
struct DataValues<'a> {
    element: &'a str,
    values: Vec<(String, &'a str)>,
}

impl<'a> DataValues<'a> {
    fn collect(
        node: roxmltree::Node<'a, 'a>,
        element: &'a str,
        key_names: &HashMap<&'a str, &'a str>,
    ) -> Self {
        let values = node
            .children()
            .filter(|c| c.is_element() && c.tag_name().name() == "data")
            .filter_map(|c| {
                let key = c.attribute("key")?;
                let name = key_names.get(key).copied().unwrap_or(key);
                Some((name.to_owned(), c.text().unwrap_or("").trim()))
            })
            .collect();
        DataValues { element, values }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.values
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, v)| *v)
    }

    /// Value by name, falling back to document order when the producer did
    /// not name its keys (edge data is written positionally by some
    /// exporters).
    fn get_or_positional(&self, key: &str, position: usize) -> Option<&'a str> {
        self.get(key)
            .or_else(|| self.values.get(position).map(|(_, v)| *v))
    }

    fn int(&self, key: &str) -> Result<i64, ParseError> {
        let raw = self.get(key).ok_or_else(|| ParseError::MissingData {
            element: self.element.to_owned(),
            key: key.to_owned(),
        })?;
        parse_int(key, raw)
    }

    fn uint(&self, key: &str) -> Result<u64, ParseError> {
        let raw = self.get(key).ok_or_else(|| ParseError::MissingData {
            element: self.element.to_owned(),
            key: key.to_owned(),
        })?;
        parse_uint(key, raw)
    }

    fn boolean(&self, key: &str) -> Result<bool, ParseError> {
        let raw = self.get(key).ok_or_else(|| ParseError::MissingData {
            element: self.element.to_owned(),
            key: key.to_owned(),
        })?;
        parse_bool(key, raw)
    }
}

fn parse_int(key: &str, raw: &str) -> Result<i64, ParseError> {
    raw.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_owned(),
        value: raw.to_owned(),
    })
}

fn parse_uint(key: &str, raw: &str) -> Result<u64, ParseError> {
    raw.parse().map_err(|_| ParseError::InvalidValue {
        key: key.to_owned(),
        value: raw.to_owned(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ParseError> {
    match raw {
        "1" => Ok(true),
        "0" => Ok(false),
        _ if raw.eq_ignore_ascii_case("true") => Ok(true),
        _ if raw.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(ParseError::InvalidValue {
            key: key.to_owned(),
            value: raw.to_owned(),
        }),
    }
}

/// Parse a GraphML document into a [`DelayGraph`].
///
/// Vertices and edges are added in document order, which downstream
/// algorithms rely on for tie-breaking.
pub fn parse(input: &str) -> Result<DelayGraph, ParseError> {
    let doc = roxmltree::Document::parse(input)
        .map_err(|e| ParseError::SyntaxError(e.to_string()))?;

    let graph_el = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "graph")
        .ok_or_else(|| ParseError::MissingElement("graph".to_owned()))?;

    // <key id="d3" attr.name="Delay"/> declarations, when present
    let key_names: HashMap<&str, &str> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "key")
        .filter_map(|n| Some((n.attribute("id")?, n.attribute("attr.name")?)))
        .collect();

    let mut g = DelayGraph::new();
    let mut lut = HashMap::new();

    for node in graph_el
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "node")
    {
        let id = node
            .attribute("id")
            .ok_or_else(|| ParseError::MissingElement("node id".to_owned()))?;
        let data = DataValues::collect(node, id, &key_names);

        let parsed = DelayNode {
            vertex_id: data.int("VertexId")?,
            node_type: NodeType::from_ordinal(data.int("NodeType")?),
            node_unique_id: data.int("NodeUniqueId")?,
            throughput_cost: data.uint("ThroughputCostIfRegistered")?,
            latency_cost: data.uint("LatencyCostIfRegistered")?,
            register_cost: data.uint("RegisterCostIfRegistered")?,
            is_registered: data.boolean("IsRegistered")?,
            is_input_terminal: data.boolean("IsInputTerminal")?,
            is_output_terminal: data.boolean("IsOutputTerminal")?,
            disallow_register: data.boolean("DisallowRegister")?,
        };

        let ix = g.add_node(parsed);
        if lut.insert(id.to_owned(), ix).is_some() {
            return Err(ParseError::DuplicateVertex(id.to_owned()));
        }
    }

    for edge in graph_el
        .children()
        .filter(|c| c.is_element() && c.tag_name().name() == "edge")
    {
        let source = edge
            .attribute("source")
            .ok_or_else(|| ParseError::MissingElement("edge source".to_owned()))?;
        let target = edge
            .attribute("target")
            .ok_or_else(|| ParseError::MissingElement("edge target".to_owned()))?;
        let src = *lut
            .get(source)
            .ok_or_else(|| ParseError::UndefinedEndpoint(source.to_owned()))?;
        let dst = *lut
            .get(target)
            .ok_or_else(|| ParseError::UndefinedEndpoint(target.to_owned()))?;

        let data = DataValues::collect(edge, source, &key_names);
        let delay = data
            .get_or_positional("Delay", 0)
            .ok_or_else(|| ParseError::MissingData {
                element: format!("{} -> {}", source, target),
                key: "Delay".to_owned(),
            })
            .and_then(|raw| parse_uint("Delay", raw))?;
        let is_feedback = data
            .get_or_positional("IsFeedback", 1)
            .ok_or_else(|| ParseError::MissingData {
                element: format!("{} -> {}", source, target),
                key: "IsFeedback".to_owned(),
            })
            .and_then(|raw| parse_bool("IsFeedback", raw))?;

        g.add_edge(src, dst, DelayEdge { delay, is_feedback });
    }

    Ok(g)
}

/// Parse a goal file and return the target clock period in picoseconds.
pub fn parse_goal(input: &str) -> Result<u64, ParseError> {
    let doc = roxmltree::Document::parse(input)
        .map_err(|e| ParseError::SyntaxError(e.to_string()))?;

    let element = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "TargetClockPeriodInPicoSeconds")
        .ok_or_else(|| {
            ParseError::MissingElement("TargetClockPeriodInPicoSeconds".to_owned())
        })?;

    let raw = element.text().unwrap_or("").trim();
    let period = parse_uint("TargetClockPeriodInPicoSeconds", raw)?;
    if period == 0 {
        return Err(ParseError::InvalidValue {
            key: "TargetClockPeriodInPicoSeconds".to_owned(),
            value: raw.to_owned(),
        });
    }
    Ok(period)
}

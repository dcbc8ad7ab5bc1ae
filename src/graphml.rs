// emubench: Timed evaluation harness for emulated multi-PoP NFV platforms
// Copyright (C) 2024-2025 The emubench developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Minimal GraphML reader covering the Topology-Zoo attributes we need.
//!
//! Only `<key>`, `<node>`, `<edge>` and `<data>` elements are interpreted,
//! and of the declared attributes only the node label, the node coordinates
//! and the edge `LinkLabel` (carrying the advertised link speed). Everything
//! else in the document is skipped.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use geoutils::Location;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use thiserror::Error;

/// Errors raised while reading a GraphML file.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cannot read graph file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed GraphML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("`{element}` element is missing its `{attribute}` attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("edge references unknown node id `{0}`")]
    UnknownNode(String),
}

/// A parsed GraphML document, reduced to nodes and edges.
#[derive(Debug, Clone, Default)]
pub struct GraphDescription {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// A GraphML node with the subset of Topology-Zoo attributes we interpret.
#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    /// Document-local node id, referenced by edges.
    pub id: String,
    /// Human-readable node label, usually a city name.
    pub label: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GraphNode {
    /// Geographic position of the node, if both coordinates are present.
    pub fn location(&self) -> Option<Location> {
        Some(Location::new(self.latitude?, self.longitude?))
    }
}

/// A GraphML edge with endpoints resolved to node positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    /// Position of the source node in [`GraphDescription::nodes`].
    pub source: usize,
    /// Position of the target node in [`GraphDescription::nodes`].
    pub target: usize,
    /// The `LinkLabel` attribute, e.g. `"10 Gbps"`.
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum DataField {
    Label,
    Latitude,
    Longitude,
    LinkLabel,
}

impl DataField {
    fn from_attr_name(name: &str) -> Option<Self> {
        match name {
            "label" => Some(Self::Label),
            "Latitude" => Some(Self::Latitude),
            "Longitude" => Some(Self::Longitude),
            "LinkLabel" => Some(Self::LinkLabel),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawEdge {
    source: String,
    target: String,
    label: Option<String>,
}

/// Read and parse the GraphML file at `path`.
pub fn read_graph(path: impl AsRef<Path>) -> Result<GraphDescription, GraphError> {
    let path = path.as_ref();
    let xml = fs::read_to_string(path).map_err(|source| GraphError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_graph(&xml)
}

/// Parse a GraphML document from a string.
pub fn parse_graph(xml: &str) -> Result<GraphDescription, GraphError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    // key id -> interpreted attribute, filled from the <key> declarations
    let mut keys: HashMap<String, DataField> = HashMap::new();
    let mut nodes: Vec<GraphNode> = Vec::new();
    let mut raw_edges: Vec<RawEdge> = Vec::new();

    let mut node: Option<GraphNode> = None;
    let mut edge: Option<RawEdge> = None;
    let mut data_key: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"key" => register_key(&mut keys, e)?,
                b"node" => node = Some(new_node(e)?),
                b"edge" => edge = Some(new_raw_edge(e)?),
                b"data" => data_key = attr_value(e, b"key")?,
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"key" => register_key(&mut keys, e)?,
                b"node" => nodes.push(new_node(e)?),
                b"edge" => raw_edges.push(new_raw_edge(e)?),
                _ => {}
            },
            Event::Text(ref t) => {
                if let Some(field) = data_key.as_ref().and_then(|k| keys.get(k)) {
                    let text = t.unescape()?.into_owned();
                    assign(*field, text, node.as_mut(), edge.as_mut());
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"node" => nodes.extend(node.take()),
                b"edge" => raw_edges.extend(edge.take()),
                b"data" => data_key = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let mut edges = Vec::with_capacity(raw_edges.len());
    for raw in &raw_edges {
        let source = *index
            .get(raw.source.as_str())
            .ok_or_else(|| GraphError::UnknownNode(raw.source.clone()))?;
        let target = *index
            .get(raw.target.as_str())
            .ok_or_else(|| GraphError::UnknownNode(raw.target.clone()))?;
        edges.push(GraphEdge {
            source,
            target,
            label: raw.label.clone(),
        });
    }

    Ok(GraphDescription { nodes, edges })
}

fn register_key(keys: &mut HashMap<String, DataField>, e: &BytesStart) -> Result<(), GraphError> {
    let id = attr_value(e, b"id")?;
    let name = attr_value(e, b"attr.name")?;
    if let (Some(id), Some(field)) = (id, name.as_deref().and_then(DataField::from_attr_name)) {
        keys.insert(id, field);
    }
    Ok(())
}

fn new_node(e: &BytesStart) -> Result<GraphNode, GraphError> {
    let id = attr_value(e, b"id")?.ok_or(GraphError::MissingAttribute {
        element: "node",
        attribute: "id",
    })?;
    Ok(GraphNode {
        id,
        ..Default::default()
    })
}

fn new_raw_edge(e: &BytesStart) -> Result<RawEdge, GraphError> {
    let source = attr_value(e, b"source")?.ok_or(GraphError::MissingAttribute {
        element: "edge",
        attribute: "source",
    })?;
    let target = attr_value(e, b"target")?.ok_or(GraphError::MissingAttribute {
        element: "edge",
        attribute: "target",
    })?;
    Ok(RawEdge {
        source,
        target,
        label: None,
    })
}

fn assign(field: DataField, text: String, node: Option<&mut GraphNode>, edge: Option<&mut RawEdge>) {
    match (field, node, edge) {
        (DataField::Label, Some(n), _) => n.label = Some(text),
        (DataField::Latitude, Some(n), _) => n.latitude = parse_coord(&text),
        (DataField::Longitude, Some(n), _) => n.longitude = parse_coord(&text),
        (DataField::LinkLabel, _, Some(e)) => e.label = Some(text),
        _ => {}
    }
}

fn parse_coord(text: &str) -> Option<f64> {
    match text.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring unparsable coordinate `{text}`");
            None
        }
    }
}

fn attr_value(e: &BytesStart, name: &[u8]) -> Result<Option<String>, GraphError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key attr.name="Latitude" attr.type="double" for="node" id="d29" />
  <key attr.name="Longitude" attr.type="double" for="node" id="d32" />
  <key attr.name="label" attr.type="string" for="node" id="d33" />
  <key attr.name="LinkLabel" attr.type="string" for="edge" id="d38" />
  <graph edgedefault="undirected">
    <node id="0">
      <data key="d29">47.66033</data>
      <data key="d32">9.17582</data>
      <data key="d33">Konstanz</data>
    </node>
    <node id="1">
      <data key="d29">48.49144</data>
      <data key="d32">9.20427</data>
      <data key="d33">Reutlingen</data>
    </node>
    <node id="2">
      <data key="d33">Nowhere</data>
    </node>
    <edge source="0" target="1">
      <data key="d38">10 Gbps</data>
    </edge>
    <edge source="1" target="2" />
  </graph>
</graphml>"#;

    #[test]
    fn parse_nodes_and_edges() {
        let graph = parse_graph(SAMPLE).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[0].label.as_deref(), Some("Konstanz"));
        assert_eq!(graph.nodes[0].latitude, Some(47.66033));
        assert_eq!(graph.nodes[0].longitude, Some(9.17582));
        assert_eq!(graph.nodes[2].label.as_deref(), Some("Nowhere"));
        assert_eq!(graph.nodes[2].latitude, None);

        assert_eq!(
            graph.edges,
            vec![
                GraphEdge {
                    source: 0,
                    target: 1,
                    label: Some("10 Gbps".to_string())
                },
                GraphEdge {
                    source: 1,
                    target: 2,
                    label: None
                },
            ]
        );
    }

    #[test]
    fn locations_require_both_coordinates() {
        let graph = parse_graph(SAMPLE).unwrap();
        assert!(graph.nodes[0].location().is_some());
        assert!(graph.nodes[2].location().is_none());
    }

    #[test]
    fn edge_to_unknown_node_is_an_error() {
        let xml = r#"<graphml>
          <graph><node id="0"/><edge source="0" target="9"/></graph>
        </graphml>"#;
        let err = parse_graph(xml).unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(id) if id == "9"));
    }

    #[test]
    fn edge_without_endpoint_is_an_error() {
        let xml = r#"<graphml><graph><node id="0"/><edge source="0"/></graph></graphml>"#;
        let err = parse_graph(xml).unwrap_err();
        assert!(matches!(
            err,
            GraphError::MissingAttribute {
                element: "edge",
                attribute: "target"
            }
        ));
    }
}

//! In-memory quad store used as a rank source
//!
//! Every distinct term (subject, predicate, object or graph name) is interned
//! to a dense id starting at 1, so the entity count doubles as the node count.
//! Each statement `s p o g` is a candidate edge `s -> o`.

use super::filter::EdgeFilter;
use super::{Edge, GraphSource};
use graphrank_algorithms::NodeId;
use rio_api::model::{Quad, Triple};
use rio_api::parser::{QuadsParser, TriplesParser};
use rio_turtle::{NQuadsParser, TurtleError, TurtleParser};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Triple source errors
#[derive(Error, Debug)]
pub enum TripleError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed RDF input
    #[error("Parse error: {0}")]
    Parse(#[from] TurtleError),
}

pub type TripleResult<T> = Result<T, TripleError>;

/// One interned quad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Statement {
    pub subject: NodeId,
    pub predicate: NodeId,
    pub object: NodeId,
    /// Graph id, 0 for the default graph
    pub context: NodeId,
    /// Asserted rather than inferred
    pub explicit: bool,
}

/// Interned quads indexed by object
#[derive(Debug, Clone, Default)]
pub struct TripleGraph {
    /// Term of each id; index 0 is unused
    terms: Vec<String>,
    ids: FxHashMap<String, NodeId>,
    statements: Vec<Statement>,
    /// Object -> statement positions
    by_object: FxHashMap<NodeId, Vec<usize>>,
}

impl TripleGraph {
    pub fn new() -> Self {
        Self {
            terms: vec![String::new()],
            ..Default::default()
        }
    }

    /// Id of `term`, assigning the next free one if it is new
    pub fn intern(&mut self, term: &str) -> NodeId {
        if let Some(id) = self.ids.get(term) {
            return *id;
        }
        if self.terms.is_empty() {
            self.terms.push(String::new());
        }
        let id = self.terms.len() as NodeId;
        self.terms.push(term.to_string());
        self.ids.insert(term.to_string(), id);
        id
    }

    pub fn lookup(&self, term: &str) -> Option<NodeId> {
        self.ids.get(term).copied()
    }

    pub fn term(&self, id: NodeId) -> Option<&str> {
        if id == 0 {
            return None;
        }
        self.terms.get(id as usize).map(String::as_str)
    }

    /// Number of interned entities
    pub fn entity_count(&self) -> u64 {
        self.terms.len().saturating_sub(1) as u64
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> + '_ {
        self.statements.iter()
    }

    pub fn push(&mut self, statement: Statement) {
        let position = self.statements.len();
        self.statements.push(statement);
        self.by_object
            .entry(statement.object)
            .or_default()
            .push(position);
    }

    /// Add an asserted statement to the default graph
    pub fn add(&mut self, subject: &str, predicate: &str, object: &str) -> Statement {
        self.add_quad(subject, predicate, object, None, true)
    }

    /// Add a statement to `graph` (or the default graph)
    pub fn add_quad(
        &mut self,
        subject: &str,
        predicate: &str,
        object: &str,
        graph: Option<&str>,
        explicit: bool,
    ) -> Statement {
        let statement = Statement {
            subject: self.intern(subject),
            predicate: self.intern(predicate),
            object: self.intern(object),
            context: graph.map(|g| self.intern(g)).unwrap_or(0),
            explicit,
        };
        self.push(statement);
        statement
    }

    /// Statements whose object is `object`
    pub fn with_object(&self, object: NodeId) -> impl Iterator<Item = &Statement> + '_ {
        self.by_object
            .get(&object)
            .into_iter()
            .flatten()
            .map(move |position| &self.statements[*position])
    }

    /// Load statements from an N-Quads, N-Triples or Turtle (`.ttl`) file.
    ///
    /// Terms are interned in their N-Triples form, so IRIs read as `<iri>` and
    /// literals keep their quotes and suffix.
    pub fn load(path: impl AsRef<Path>) -> TripleResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut graph = Self::new();
        match path.extension().and_then(|e| e.to_str()) {
            Some("ttl") => graph.extend_from_turtle(reader)?,
            _ => graph.extend_from(reader)?,
        };
        info!(
            "Loaded {} statements over {} entities from {:?}",
            graph.len(),
            graph.entity_count(),
            path
        );
        Ok(graph)
    }

    /// Add every statement of an N-Quads (or N-Triples) document
    pub fn extend_from(&mut self, reader: impl BufRead) -> TripleResult<usize> {
        let mut added = 0;
        NQuadsParser::new(reader).parse_all(&mut |quad: Quad<'_>| -> TripleResult<()> {
            let graph = quad.graph_name.map(|g| g.to_string());
            self.add_quad(
                &quad.subject.to_string(),
                &quad.predicate.to_string(),
                &quad.object.to_string(),
                graph.as_deref(),
                true,
            );
            added += 1;
            Ok(())
        })?;
        debug!("Read {} statements", added);
        Ok(added)
    }

    /// Add every triple of a Turtle document to the default graph
    pub fn extend_from_turtle(&mut self, reader: impl BufRead) -> TripleResult<usize> {
        let mut added = 0;
        TurtleParser::new(reader, None).parse_all(&mut |triple: Triple<'_>| -> TripleResult<()> {
            self.add(
                &triple.subject.to_string(),
                &triple.predicate.to_string(),
                &triple.object.to_string(),
            );
            added += 1;
            Ok(())
        })?;
        debug!("Read {} triples", added);
        Ok(added)
    }
}

/// A [`TripleGraph`] seen through an optional [`EdgeFilter`]
#[derive(Debug, Clone)]
pub struct FilteredGraph {
    graph: Arc<TripleGraph>,
    filter: Option<EdgeFilter>,
}

impl FilteredGraph {
    /// `None` turns every statement into an edge
    pub fn new(graph: Arc<TripleGraph>, filter: Option<EdgeFilter>) -> Self {
        Self { graph, filter }
    }

    pub fn graph(&self) -> &TripleGraph {
        &self.graph
    }

    fn accepts(&self, statement: &Statement) -> bool {
        self.filter.as_ref().map_or(true, |f| f.accepts(statement))
    }
}

impl GraphSource for FilteredGraph {
    fn node_count(&self) -> u64 {
        self.graph.entity_count()
    }

    fn size_hint(&self) -> u64 {
        self.graph.len() as u64
    }

    fn edges(&self) -> Box<dyn Iterator<Item = Edge> + '_> {
        Box::new(
            self.graph
                .statements()
                .filter(move |s| self.accepts(s))
                .map(|s| Edge::new(s.subject, s.object)),
        )
    }

    fn inbound(&self, id: NodeId) -> Box<dyn Iterator<Item = Edge> + '_> {
        Box::new(
            self.graph
                .with_object(id)
                .filter(move |s| self.accepts(s))
                .map(|s| Edge::new(s.subject, s.object)),
        )
    }

    fn label(&self, id: NodeId) -> Option<String> {
        self.graph.term(id).map(str::to_string)
    }
}

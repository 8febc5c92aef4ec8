//! OBO stanza parser.
//!
//! Only `[Term]` stanzas become nodes. The configured id prefix is stripped
//! from node ids and from every referenced id so self-references compare
//! equal. `relationship: part_of GO:0005575` lines become an edge labelled
//! `PART_OF`. After all files are read, edges that point at an `alt_id` are
//! rewritten to the owning term's primary id.

use crate::error::Result;
use crate::records::{RawRecord, StanzaRecords};
use crate::{new_node, relationship_edge, IngestError, ParseStats, RecordParser};
use graphload_model::{EdgeTarget, Graph, Node, SourceFormat, SourceProfile, ValueType, PROP_NAME};
use regex::Regex;
use std::collections::HashMap;
use std::io::BufRead;
use tracing::{debug, info, warn};

const TERM: &str = "Term";
const KEY_SYNONYM: &str = "synonym";
const KEY_RELATIONSHIP: &str = "relationship";
const KEY_ALT_ID: &str = "alt_id";

pub struct OboParser<'a> {
    profile: &'a SourceProfile,
    quoted: Regex,
    stats: ParseStats,
}

impl<'a> OboParser<'a> {
    pub fn new(profile: &'a SourceProfile) -> Result<Self> {
        if profile.format != SourceFormat::Stanza {
            return Err(IngestError::WrongFormat {
                profile: profile.name.clone(),
                expected: "stanza",
            });
        }
        Ok(Self {
            profile,
            quoted: Regex::new(r#""((?:[^"\\]|\\.)*)""#)?,
            stats: ParseStats::default(),
        })
    }

    fn quoted_text<'v>(&self, value: &'v str) -> Option<&'v str> {
        self.quoted
            .captures(value)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
    }

    /// Reference id with the trailing `! comment` and id prefix removed.
    fn clean_ref<'v>(&self, value: &'v str) -> &'v str {
        let value = value.split(" !").next().unwrap_or(value).trim();
        self.profile.strip_prefix(value)
    }

    pub fn record_to_node(&mut self, record: &RawRecord) -> Option<Node> {
        if record.kind.as_deref() != Some(TERM) {
            self.stats.skipped += 1;
            return None;
        }
        let mapping = &self.profile.mapping;
        let Some(raw_id) = record.get(&mapping.id_key).map(|v| self.clean_ref(v)) else {
            self.stats.missing_id += 1;
            warn!(source = %self.profile.name, line = record.line, "stanza without id dropped");
            return None;
        };
        if raw_id.is_empty() {
            self.stats.missing_id += 1;
            return None;
        }
        let mut node = new_node(self.profile, raw_id);
        let mut synonyms: Vec<(String, &str, ValueType)> = Vec::new();

        for (key, value) in &record.fields {
            if key == &mapping.id_key {
                continue;
            }
            if let Some(spec) = mapping.attributes.get(key) {
                let property = spec.property_for(key);
                if key == KEY_SYNONYM {
                    match self.quoted_text(value) {
                        Some(text) => synonyms.push((property, text, spec.value_type)),
                        None => debug!(line = record.line, value = %value, "unquoted synonym"),
                    }
                } else if value.contains('"') {
                    let text = self.quoted_text(value).unwrap_or(value);
                    node.push_value(&property, text, spec.value_type);
                } else {
                    node.push_value(&property, self.clean_ref(value), spec.value_type);
                }
            }
            if let Some(rel) = mapping.relationships.get(key) {
                if key == KEY_RELATIONSHIP {
                    // `<TYPE> <TARGET> [! comment]`
                    let mut parts = value.split_whitespace();
                    match (parts.next(), parts.next()) {
                        (Some(kind), Some(target)) => {
                            let label = kind.to_uppercase();
                            let target = self.clean_ref(target);
                            node.add_edge(relationship_edge(self.profile, rel, &label, target));
                        }
                        _ => warn!(line = record.line, value = %value, "malformed relationship line"),
                    }
                } else {
                    let target = value.split_whitespace().next().unwrap_or("");
                    let target = self.clean_ref(target);
                    if !target.is_empty() {
                        node.add_edge(relationship_edge(self.profile, rel, &rel.label, target));
                    }
                }
            }
        }
        // the name may follow its synonyms in the stanza
        let name = node.field(PROP_NAME);
        for (property, text, value_type) in synonyms {
            if text != name {
                node.push_value(&property, text, value_type);
            }
        }
        Some(node)
    }

    /// Point edges that name an alternate id at the owning term instead.
    fn rewrite_alt_ids(&self, graph: &mut Graph) -> usize {
        let Some(spec) = self.profile.mapping.attributes.get(KEY_ALT_ID) else {
            return 0;
        };
        let alt_property = spec.property_for(KEY_ALT_ID);
        let entity = self.profile.entity_type().to_string();
        let mut primary: HashMap<String, String> = HashMap::new();
        for node in graph.nodes() {
            for alt in node.values(&alt_property) {
                if graph.find(&entity, &alt).is_none() {
                    primary.insert(alt, node.id().to_string());
                }
            }
        }
        if primary.is_empty() {
            return 0;
        }

        let mut rewritten = 0;
        for node in graph.nodes_mut() {
            for edge in node.edges_mut() {
                if let EdgeTarget::Pending(target) = &mut edge.target {
                    if target.entity_type != entity {
                        continue;
                    }
                    if let Some(id) = primary.get(&target.raw_id) {
                        target.raw_id = id.clone();
                        rewritten += 1;
                    }
                }
            }
        }
        rewritten
    }
}

impl RecordParser for OboParser<'_> {
    fn parse_reader(&mut self, reader: &mut dyn BufRead, graph: &mut Graph) -> Result<()> {
        for record in StanzaRecords::new(reader) {
            let record = record?;
            self.stats.records += 1;
            if let Some(node) = self.record_to_node(&record) {
                self.stats.nodes += 1;
                self.stats.edges += node.edges().count();
                graph.insert(node);
            }
        }
        Ok(())
    }

    fn finish(&mut self, graph: &mut Graph) {
        let rewritten = self.rewrite_alt_ids(graph);
        if rewritten > 0 {
            info!(source = %self.profile.name, rewritten, "alternate ids rewritten");
        }
    }

    fn stats(&self) -> &ParseStats {
        &self.stats
    }
}

//! Attribute-value (`.dat`) parser.

use crate::error::Result;
use crate::records::{AttributeValueRecords, RawRecord};
use crate::{new_node, relationship_edge, ParseStats, RecordParser};
use graphload_model::{Graph, Node, RelationshipType, SourceFormat, SourceProfile};
use std::io::BufRead;
use tracing::{debug, warn};

pub struct AttributeValueParser<'a> {
    profile: &'a SourceProfile,
    stats: ParseStats,
}

impl<'a> AttributeValueParser<'a> {
    pub fn new(profile: &'a SourceProfile) -> Result<Self> {
        if profile.format != SourceFormat::AttributeValue {
            return Err(crate::IngestError::WrongFormat {
                profile: profile.name.clone(),
                expected: "attribute-value",
            });
        }
        Ok(Self {
            profile,
            stats: ParseStats::default(),
        })
    }

    /// Build a node from one record. Records without an id are dropped.
    pub fn record_to_node(&mut self, record: &RawRecord) -> Option<Node> {
        let mapping = &self.profile.mapping;
        let Some(raw_id) = record
            .get(&mapping.id_key)
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            self.stats.missing_id += 1;
            warn!(
                source = %self.profile.name,
                line = record.line,
                key = %mapping.id_key,
                "record without id dropped"
            );
            return None;
        };
        let mut node = new_node(self.profile, self.profile.strip_prefix(raw_id));

        // Relationship that annotation lines (`^KEY`) attach to.
        let mut last_rel: Option<&RelationshipType> = None;
        for (key, value) in &record.fields {
            if key.starts_with('^') {
                match last_rel.and_then(|rel| rel.edge_attributes.get(key)) {
                    Some(property) => {
                        if let Some(edge) = node.last_edge_mut() {
                            edge.attributes.insert(property.clone(), value.clone());
                        }
                    }
                    None => debug!(key = %key, line = record.line, "unattached annotation"),
                }
                continue;
            }
            last_rel = None;
            if key == &mapping.id_key {
                continue;
            }

            let mut known = false;
            if let Some(spec) = mapping.attributes.get(key) {
                node.push_value(&spec.property_for(key), value, spec.value_type);
                known = true;
            }
            if let Some(rel) = mapping.relationships.get(key) {
                let target = self.profile.strip_prefix(value.trim());
                if !target.is_empty() {
                    node.add_edge(relationship_edge(self.profile, rel, &rel.label, target));
                    last_rel = Some(rel);
                }
                known = true;
            }
            if !known {
                debug!(key = %key, "unmapped key ignored");
            }
        }
        Some(node)
    }
}

impl RecordParser for AttributeValueParser<'_> {
    fn parse_reader(&mut self, reader: &mut dyn BufRead, graph: &mut Graph) -> Result<()> {
        for record in AttributeValueRecords::new(reader)? {
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

    fn stats(&self) -> &ParseStats {
        &self.stats
    }
}

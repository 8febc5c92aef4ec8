//! XML rendering of a changelog.
//!
//! Plain changesets become `<sql>` elements. Changesets that read a data file
//! become `<customChange>` elements naming the loader class, the query, the
//! file and its start row, followed by the `${...}` connection parameters.
//! Attribute and text escaping is left to quick-xml.

use crate::changeset::{ChangeLog, ChangeSet, LOADER_PARAMETERS};
use crate::error::{ChangelogError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::{Path, PathBuf};
use tracing::info;

const NAMESPACE: &str = "http://www.liquibase.org/xml/ns/dbchangelog";
const SCHEMA_INSTANCE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.liquibase.org/xml/ns/dbchangelog \
http://www.liquibase.org/xml/ns/dbchangelog/dbchangelog-4.4.xsd";

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 4),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| ChangelogError::Xml(e.to_string()))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.event(Event::Start(BytesStart::new(name)))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn into_string(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| ChangelogError::Xml(e.to_string()))
    }
}

fn changeset(out: &mut XmlOut, changeset: &ChangeSet) -> Result<()> {
    let mut start = BytesStart::new("changeSet");
    start.push_attribute(("id", changeset.id.as_str()));
    start.push_attribute(("author", changeset.author.as_str()));
    out.event(Event::Start(start))?;
    out.text_element("comment", &changeset.comment)?;

    match &changeset.data {
        None => out.text_element("sql", &changeset.query)?,
        Some(data) => {
            let start_at = data.start_at.to_string();
            let mut custom = BytesStart::new("customChange");
            custom.push_attribute(("class", data.handler_class.as_str()));
            custom.push_attribute(("query", changeset.query.as_str()));
            custom.push_attribute(("fileName", data.file_name.as_str()));
            if let Some(archive) = &data.archive {
                custom.push_attribute(("archiveFileName", archive.as_str()));
            }
            custom.push_attribute(("startAt", start_at.as_str()));
            custom.push_attribute(("fileType", data.file_type.as_str()));
            let params: Vec<(String, String)> = LOADER_PARAMETERS
                .iter()
                .map(|p| (p.to_string(), format!("${{{}}}", p)))
                .collect();
            for (name, value) in &params {
                custom.push_attribute((name.as_str(), value.as_str()));
            }
            out.event(Event::Empty(custom))?;
        }
    }
    out.event(Event::End(BytesEnd::new("changeSet")))
}

/// The full changelog document.
pub fn render(changelog: &ChangeLog) -> Result<String> {
    let mut out = XmlOut::new();
    out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut root = BytesStart::new("databaseChangeLog");
    root.push_attribute(("xmlns", NAMESPACE));
    root.push_attribute(("xmlns:xsi", SCHEMA_INSTANCE));
    root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
    out.event(Event::Start(root))?;
    for cs in &changelog.changesets {
        changeset(&mut out, cs)?;
    }
    out.event(Event::End(BytesEnd::new("databaseChangeLog")))?;
    let mut xml = out.into_string()?;
    xml.push('\n');
    Ok(xml)
}

/// Render into `dir/<changelog file name>`.
pub fn write_changelog(changelog: &ChangeLog, dir: &Path) -> Result<PathBuf> {
    let xml = render(changelog)?;
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ChangelogError::Io { path, source }
    };
    std::fs::create_dir_all(dir).map_err(io(dir))?;
    let path = dir.join(&changelog.file_name);
    std::fs::write(&path, xml).map_err(io(&path))?;
    info!(file = %path.display(), changesets = changelog.len(), "changelog written");
    Ok(path)
}

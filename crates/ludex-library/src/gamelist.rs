//! Gamelist document model
//!
//! A gamelist is a `<gameList>` root holding `<game>` and `<folder>` nodes,
//! each with one child element per field. The model keeps everything it
//! does not understand (root attributes, node attributes, unknown fields,
//! unknown top-level elements) so a save only rewrites what changed.

use crate::GamelistError;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::path::Path;

pub const ROOT_TAG: &str = "gameList";

/// Top-level node kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Game,
    Folder,
    /// Any other top-level element, kept verbatim
    Other(String),
}

impl NodeKind {
    pub fn tag(&self) -> &str {
        match self {
            NodeKind::Game => "game",
            NodeKind::Folder => "folder",
            NodeKind::Other(tag) => tag,
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "game" => NodeKind::Game,
            "folder" => NodeKind::Folder,
            other => NodeKind::Other(other.to_string()),
        }
    }
}

/// One child element of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamelistField {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
}

impl GamelistField {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            text: text.into(),
        }
    }
}

/// A `<game>` or `<folder>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamelistNode {
    pub kind: NodeKind,
    pub attributes: Vec<(String, String)>,
    pub fields: Vec<GamelistField>,
}

impl GamelistNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, tag: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.text.as_str())
    }

    pub fn path(&self) -> Option<&str> {
        self.field("path").map(str::trim)
    }

    /// Replace the first field with this tag, or append one
    pub fn set_field(&mut self, tag: &str, text: impl Into<String>) {
        let text = text.into();
        match self.fields.iter_mut().find(|f| f.tag == tag) {
            Some(field) => field.text = text,
            None => self.fields.push(GamelistField::new(tag, text)),
        }
    }

    pub fn remove_field(&mut self, tag: &str) {
        self.fields.retain(|f| f.tag != tag);
    }
}

/// A parsed gamelist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GamelistDocument {
    pub root_attributes: Vec<(String, String)>,
    pub nodes: Vec<GamelistNode>,
}

impl GamelistDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_attribute(&self, name: &str) -> Option<&str> {
        self.root_attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_root_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.root_attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.root_attributes.push((name.to_string(), value)),
        }
    }

    /// Read a document from disk
    pub fn read(path: &Path) -> Result<Self, GamelistError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse document text
    pub fn parse(text: &str) -> Result<Self, GamelistError> {
        // Field text keeps its whitespace; text outside fields is ignored
        let mut xml = Reader::from_str(text);
        xml.config_mut().trim_text(false);

        let mut doc = GamelistDocument::new();
        let mut seen_root = false;
        // Element nesting below the root: node, field, anything deeper
        let mut depth = 0usize;
        let mut node: Option<GamelistNode> = None;
        let mut field: Option<GamelistField> = None;

        loop {
            match xml.read_event()? {
                Event::Start(ref e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if !seen_root {
                        if tag != ROOT_TAG {
                            return Err(GamelistError::Malformed(format!(
                                "unexpected root element <{}>",
                                tag
                            )));
                        }
                        seen_root = true;
                        doc.root_attributes = read_attributes(e)?;
                        continue;
                    }
                    depth += 1;
                    match depth {
                        1 => {
                            let mut n = GamelistNode::new(NodeKind::from_tag(&tag));
                            n.attributes = read_attributes(e)?;
                            node = Some(n);
                        }
                        2 => {
                            field = Some(GamelistField {
                                tag,
                                attributes: read_attributes(e)?,
                                text: String::new(),
                            });
                        }
                        _ => {
                            tracing::debug!("Ignoring nested element <{}> in gamelist", tag);
                        }
                    }
                }
                Event::Empty(ref e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if !seen_root {
                        if tag != ROOT_TAG {
                            return Err(GamelistError::Malformed(format!(
                                "unexpected root element <{}>",
                                tag
                            )));
                        }
                        // `<gameList/>`: nothing inside
                        doc.root_attributes = read_attributes(e)?;
                        return Ok(doc);
                    }
                    match depth {
                        0 => {
                            let mut n = GamelistNode::new(NodeKind::from_tag(&tag));
                            n.attributes = read_attributes(e)?;
                            doc.nodes.push(n);
                        }
                        1 => {
                            if let Some(n) = node.as_mut() {
                                n.fields.push(GamelistField {
                                    tag,
                                    attributes: read_attributes(e)?,
                                    text: String::new(),
                                });
                            }
                        }
                        _ => {}
                    }
                }
                Event::Text(ref e) => {
                    if depth == 2
                        && let Some(f) = field.as_mut()
                    {
                        f.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(ref e) => {
                    if depth == 2
                        && let Some(f) = field.as_mut()
                    {
                        f.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::End(_) => {
                    match depth {
                        0 => break,
                        1 => {
                            if let Some(n) = node.take() {
                                doc.nodes.push(n);
                            }
                        }
                        2 => {
                            if let (Some(n), Some(f)) = (node.as_mut(), field.take()) {
                                n.fields.push(f);
                            }
                        }
                        _ => {}
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => {
                    if !seen_root {
                        return Err(GamelistError::Malformed("no <gameList> element".into()));
                    }
                    if depth > 0 || node.is_some() {
                        return Err(GamelistError::Malformed("unexpected end of document".into()));
                    }
                    break;
                }
                _ => {}
            }
        }

        Ok(doc)
    }

    /// Serialize with tab indentation
    pub fn to_xml_string(&self) -> Result<String, GamelistError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;

        let mut root = BytesStart::new(ROOT_TAG);
        for (k, v) in &self.root_attributes {
            root.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Start(root))?;
        for node in &self.nodes {
            write_node(&mut writer, node)?;
        }
        writer.write_event(Event::End(BytesEnd::new(ROOT_TAG)))?;

        let mut text = String::from_utf8_lossy(&writer.into_inner()).to_string();
        text.push('\n');
        Ok(text)
    }

    /// Write through a temporary sibling and rename it into place
    pub fn write_atomic(&self, path: &Path) -> Result<(), GamelistError> {
        let text = self.to_xml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);

        std::fs::write(&tmp, text)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn read_attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, GamelistError> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        attributes.push((key, value));
    }
    Ok(attributes)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &GamelistNode) -> Result<(), GamelistError> {
    let mut start = BytesStart::new(node.kind.tag());
    for (k, v) in &node.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if node.fields.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for field in &node.fields {
        let mut el = BytesStart::new(field.tag.as_str());
        for (k, v) in &field.attributes {
            el.push_attribute((k.as_str(), v.as_str()));
        }
        if field.text.is_empty() {
            writer.write_event(Event::Empty(el))?;
        } else {
            writer.write_event(Event::Start(el))?;
            writer.write_event(Event::Text(BytesText::new(&field.text)))?;
            writer.write_event(Event::End(BytesEnd::new(field.tag.as_str())))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(node.kind.tag())))?;
    Ok(())
}

/// Export one game for an emulator to read (`%GAMEINFOXML%`)
pub fn write_game_info(
    path: &Path,
    system: &str,
    system_name: &str,
    node: &GamelistNode,
) -> Result<(), GamelistError> {
    let mut doc = GamelistDocument::new();
    doc.set_root_attribute("system", system);
    doc.set_root_attribute("systemname", system_name);
    doc.nodes.push(node.clone());
    doc.write_atomic(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<gameList version="2">
	<provider>
		<System>NES</System>
	</provider>
	<game id="1234" source="ScreenScraper.fr">
		<path>./mario.nes</path>
		<name>Super Mario Bros. &amp; Co</name>
		<rating>0.8</rating>
		<scrap name="ScreenScraper" date="20240101T000000"/>
	</game>
	<folder>
		<path>./hacks</path>
		<name>Hacks</name>
	</folder>
	<game>
		<path>steam:/installed/42</path>
		<desc><![CDATA[Line one
Line two]]></desc>
	</game>
</gameList>
"#;

    #[test]
    fn test_parse_sample() {
        let doc = GamelistDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.root_attribute("version"), Some("2"));
        assert_eq!(doc.nodes.len(), 4);

        assert_eq!(doc.nodes[0].kind, NodeKind::Other("provider".into()));
        let mario = &doc.nodes[1];
        assert_eq!(mario.kind, NodeKind::Game);
        assert_eq!(mario.path(), Some("./mario.nes"));
        assert_eq!(mario.field("name"), Some("Super Mario Bros. & Co"));
        assert_eq!(mario.attributes[0], ("id".to_string(), "1234".to_string()));
        assert_eq!(mario.fields[3].tag, "scrap");
        assert_eq!(mario.fields[3].attributes.len(), 2);

        assert_eq!(doc.nodes[2].kind, NodeKind::Folder);
        assert_eq!(doc.nodes[3].field("desc"), Some("Line one\nLine two"));
    }

    #[test]
    fn test_unknown_content_survives_rewrite() {
        let doc = GamelistDocument::parse(SAMPLE).unwrap();
        let text = doc.to_xml_string().unwrap();
        let reparsed = GamelistDocument::parse(&text).unwrap();
        assert_eq!(doc, reparsed);
        assert!(text.contains("<scrap name=\"ScreenScraper\""));
        assert!(text.contains("&amp; Co"));
    }

    #[test]
    fn test_field_whitespace_is_kept() {
        let mut doc = GamelistDocument::new();
        let mut node = GamelistNode::new(NodeKind::Game);
        node.set_field("path", "./zelda.nes");
        node.set_field("desc", "  indented\n");
        doc.nodes.push(node);

        let text = doc.to_xml_string().unwrap();
        let reparsed = GamelistDocument::parse(&text).unwrap();
        assert_eq!(reparsed.nodes.len(), 1);
        assert_eq!(reparsed.nodes[0].path(), Some("./zelda.nes"));
        assert_eq!(reparsed.nodes[0].field("desc"), Some("  indented\n"));
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_empty_documents() {
        let doc = GamelistDocument::parse("<gameList/>").unwrap();
        assert!(doc.nodes.is_empty());

        let doc = GamelistDocument::parse("<?xml version=\"1.0\"?>\n<gameList></gameList>").unwrap();
        assert!(doc.nodes.is_empty());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(GamelistDocument::parse("<notAGameList/>").is_err());
        assert!(GamelistDocument::parse("<gameList><game><path>x").is_err());
        assert!(GamelistDocument::parse("").is_err());
    }

    #[test]
    fn test_set_and_remove_field() {
        let mut node = GamelistNode::new(NodeKind::Game);
        node.set_field("path", "./a.nes");
        node.set_field("name", "A");
        node.set_field("name", "B");
        assert_eq!(node.fields.len(), 2);
        assert_eq!(node.field("name"), Some("B"));

        node.remove_field("name");
        assert_eq!(node.field("name"), None);
    }

    #[test]
    fn test_write_atomic_and_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nes").join("gamelist.xml");

        let mut doc = GamelistDocument::new();
        let mut node = GamelistNode::new(NodeKind::Game);
        node.set_field("path", "./a.nes");
        node.set_field("favorite", "true");
        doc.nodes.push(node);

        doc.write_atomic(&path).unwrap();
        assert!(!dir.path().join("nes").join("gamelist.xml.tmp").exists());

        let read = GamelistDocument::read(&path).unwrap();
        assert_eq!(read, doc);
    }

    #[test]
    fn test_write_game_info() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("game.xml");

        let mut node = GamelistNode::new(NodeKind::Game);
        node.set_field("path", "/roms/mame/pacman.zip");
        node.set_field("name", "Pac-Man");
        write_game_info(&path, "mame", "Arcade", &node).unwrap();

        let doc = GamelistDocument::read(&path).unwrap();
        assert_eq!(doc.root_attribute("system"), Some("mame"));
        assert_eq!(doc.nodes[0].field("name"), Some("Pac-Man"));
    }
}

//! Name helpers: arcade short-name table and title normalization

use crate::GamelistError;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::path::Path;

/// Arcade short name to real title table.
///
/// Read from a `mamenames.xml` style document:
/// `<game><mamename>pacman</mamename><realname>Pac-Man</realname></game>`.
#[derive(Debug, Clone, Default)]
pub struct ArcadeNames {
    names: HashMap<String, String>,
}

impl ArcadeNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, GamelistError> {
        let text = std::fs::read_to_string(path)?;
        let table = Self::parse(&text)?;
        tracing::info!("Loaded {} arcade names from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn parse(text: &str) -> Result<Self, GamelistError> {
        let mut xml = Reader::from_str(text);
        xml.config_mut().trim_text(true);

        let mut table = Self::new();
        let mut current_tag = String::new();
        let mut short = String::new();
        let mut real = String::new();

        loop {
            match xml.read_event()? {
                Event::Start(ref e) => {
                    current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    if current_tag == "game" {
                        short.clear();
                        real.clear();
                    }
                }
                Event::Text(ref e) => {
                    let text = e.unescape()?;
                    match current_tag.as_str() {
                        "mamename" => short.push_str(&text),
                        "realname" => real.push_str(&text),
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    if e.name().as_ref() == b"game" && !short.is_empty() && !real.is_empty() {
                        table.insert(&short, &real);
                    }
                    current_tag.clear();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(table)
    }

    pub fn insert(&mut self, short_name: &str, real_name: &str) {
        self.names
            .insert(short_name.to_lowercase(), real_name.to_string());
    }

    /// Real title for a ROM stem ("pacman" -> "Pac-Man")
    pub fn lookup(&self, short_name: &str) -> Option<&str> {
        self.names
            .get(&short_name.to_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Case-folded, alphanumeric-only form of a title for fuzzy matching
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arcade_names() {
        let xml = r#"<?xml version="1.0"?>
<mamenames>
  <game>
    <mamename>pacman</mamename>
    <realname>Pac-Man (Midway)</realname>
  </game>
  <game>
    <mamename>sf2</mamename>
    <realname>Street Fighter II: The World Warrior</realname>
  </game>
  <game>
    <mamename>broken</mamename>
  </game>
</mamenames>"#;
        let names = ArcadeNames::parse(xml).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names.lookup("PACMAN"), Some("Pac-Man (Midway)"));
        assert_eq!(names.lookup("sf2"), Some("Street Fighter II: The World Warrior"));
        assert_eq!(names.lookup("broken"), None);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The Witcher 3: Wild Hunt"), "thewitcher3wildhunt");
        assert_eq!(normalize_title("  DOOM (1993) "), "doom1993");
        assert_eq!(normalize_title("Café"), "café");
    }
}

use crate::line::split_lines;

/// Keys of one section, in first-seen order, each with every value given for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    entries: Vec<(String, Vec<String>)>,
}

impl Section {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == key)
    }

    /// Values recorded for `key`; empty when the key never appeared.
    pub fn values(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Each key with its values joined by `", "`.
    pub fn flattened(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, values)| (name.clone(), values.join(", ")))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(name, _)| name == key) {
            Some((_, values)) => values.push(value.to_string()),
            None => self
                .entries
                .push((key.to_string(), vec![value.to_string()])),
        }
    }
}

/// Best-effort section → key → values model of a complete file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralDocument {
    sections: Vec<(String, Section)>,
}

impl StructuralDocument {
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, section)| section)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections
            .iter()
            .map(|(name, section)| (name.as_str(), section))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    // A repeated header starts that section over, keeping its original position.
    fn open(&mut self, name: &str) -> usize {
        match self.sections.iter().position(|(existing, _)| existing == name) {
            Some(idx) => {
                self.sections[idx].1 = Section::default();
                idx
            }
            None => {
                self.sections.push((name.to_string(), Section::default()));
                self.sections.len() - 1
            }
        }
    }
}

/// Parses a finished configuration file. Never fails: lines that cannot be
/// interpreted are dropped.
pub fn parse(text: &str) -> StructuralDocument {
    let mut document = StructuralDocument::default();
    let mut current: Option<usize> = None;

    for line in split_lines(text) {
        let trimmed = line.text.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.len() >= 2 && trimmed.starts_with('[') && trimmed.ends_with(']') {
            let name = &trimmed[1..trimmed.len() - 1];
            let idx = document.open(name);
            // Keys under an empty section name have nowhere to go.
            current = if name.is_empty() { None } else { Some(idx) };
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };

        if let Some(idx) = current {
            document.sections[idx].1.push(key.trim(), value.trim());
        }
    }

    document
}

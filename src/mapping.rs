use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::PrepError;

/// Static relocation table for extracted PETA files: a path relative to the
/// dataset root maps to its canonical path, also relative to the root.
#[derive(Debug, Clone, Default)]
pub struct FileMapping {
    entries: HashMap<String, String>,
}

impl FileMapping {
    pub fn load(path: &Path) -> Result<Self, PrepError> {
        let content =
            fs::read_to_string(path).map_err(|_| PrepError::MappingRead(path.to_path_buf()))?;
        content.parse()
    }

    pub fn lookup(&self, source: &str) -> Result<&str, PrepError> {
        self.entries
            .get(source)
            .map(String::as_str)
            .ok_or_else(|| PrepError::MissingMapping(source.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }
}

impl std::str::FromStr for FileMapping {
    type Err = PrepError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut entries = HashMap::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                [source, destination] if !source.is_empty() && !destination.is_empty() => {
                    entries.insert(source.to_string(), destination.to_string());
                }
                _ => {
                    return Err(PrepError::MappingParse {
                        line: index + 1,
                        content: raw.to_string(),
                    });
                }
            }
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_duplicates_win() {
        let mapping: FileMapping = "a/b.png,x.png\na/b.png,y.png\n".parse().unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.lookup("a/b.png").unwrap(), "y.png");
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let mapping: FileMapping = "# header\n\n  a.png , b.png  \n".parse().unwrap();
        assert_eq!(mapping.lookup("a.png").unwrap(), "b.png");
    }
}

//! Read-only language table, loaded once at startup from `lang.json`.

use gavel_protocol::{Language, LanguageSummary};

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub struct LanguageRegistry {
    languages: Vec<Language>,
}

impl LanguageRegistry {
    /// Ids are assigned from the table position, 1-based; whatever the file
    /// carries in an `id` field is overwritten.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut languages: Vec<Language> =
            serde_json::from_slice(data).context("failed to parse language table")?;
        for (index, language) in languages.iter_mut().enumerate() {
            language.id = index as u32 + 1;
        }
        Ok(Self { languages })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("failed to read language table {}", path.display()))?;
        Self::from_slice(&data)
    }

    pub fn by_id(&self, id: u32) -> Option<&Language> {
        self.languages.iter().find(|l| l.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.name == name)
    }

    pub fn all(&self) -> &[Language] {
        &self.languages
    }

    pub fn summaries(&self) -> Vec<LanguageSummary> {
        self.languages
            .iter()
            .map(|l| LanguageSummary {
                id: l.id,
                name: l.name.clone(),
            })
            .collect()
    }
}

/// Substitute the single optional `%s` slot of a command template.
pub fn render_template(template: &str, arg: &str) -> String {
    template.replacen("%s", arg, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"[
        {"name": "C (GCC)", "source_file": "main.c",
         "compile_cmd": "gcc -O2 -o main main.c %s", "run_cmd": "./main"},
        {"name": "Python 3", "source_file": "main.py",
         "compile_cmd": "", "run_cmd": "python3 main.py"}
    ]"#;

    #[test]
    fn ids_are_assigned_by_position() {
        let registry = LanguageRegistry::from_slice(TABLE.as_bytes()).unwrap();
        assert_eq!(registry.all().len(), 2);
        assert_eq!(registry.by_id(1).unwrap().name, "C (GCC)");
        assert_eq!(registry.by_id(2).unwrap().source_file, "main.py");
        assert!(registry.by_id(3).is_none());
        assert!(registry.by_id(0).is_none());
    }

    #[test]
    fn lookup_by_name() {
        let registry = LanguageRegistry::from_slice(TABLE.as_bytes()).unwrap();
        assert_eq!(registry.by_name("Python 3").unwrap().id, 2);
        assert!(registry.by_name("COBOL").is_none());
    }

    #[test]
    fn summaries_hide_commands() {
        let registry = LanguageRegistry::from_slice(TABLE.as_bytes()).unwrap();
        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, 1);
        assert_eq!(summaries[0].name, "C (GCC)");
    }

    #[test]
    fn template_substitution() {
        assert_eq!(
            render_template("gcc -O2 -o main main.c %s", ""),
            "gcc -O2 -o main main.c "
        );
        assert_eq!(
            render_template("gcc %s main.c", "-DDEBUG"),
            "gcc -DDEBUG main.c"
        );
        assert_eq!(render_template("./main", "x"), "./main");
    }

    #[test]
    fn malformed_table_is_rejected() {
        assert!(LanguageRegistry::from_slice(b"{not json").is_err());
    }
}

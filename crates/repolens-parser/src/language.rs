use repolens_core::Language;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::Parser;

pub struct LanguageConfig {
    pub grammar: tree_sitter::Language,
    pub extensions: Vec<&'static str>,
}

/// Extension-keyed registry of the supported tree-sitter grammars.
pub struct LanguageRegistry {
    configs: HashMap<Language, LanguageConfig>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut configs = HashMap::new();

        configs.insert(
            Language::Rust,
            LanguageConfig {
                grammar: tree_sitter_rust::LANGUAGE.into(),
                extensions: vec!["rs"],
            },
        );

        configs.insert(
            Language::Python,
            LanguageConfig {
                grammar: tree_sitter_python::LANGUAGE.into(),
                extensions: vec!["py", "pyi"],
            },
        );

        configs.insert(
            Language::JavaScript,
            LanguageConfig {
                grammar: tree_sitter_javascript::LANGUAGE.into(),
                extensions: vec!["js", "jsx", "mjs"],
            },
        );

        configs.insert(
            Language::TypeScript,
            LanguageConfig {
                grammar: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                extensions: vec!["ts", "tsx"],
            },
        );

        configs.insert(
            Language::Go,
            LanguageConfig {
                grammar: tree_sitter_go::LANGUAGE.into(),
                extensions: vec!["go"],
            },
        );

        configs.insert(
            Language::Java,
            LanguageConfig {
                grammar: tree_sitter_java::LANGUAGE.into(),
                extensions: vec!["java"],
            },
        );

        Self { configs }
    }

    pub fn detect(&self, path: &Path) -> Option<Language> {
        let extension = path.extension()?.to_str()?;
        self.configs
            .iter()
            .find(|(_, config)| config.extensions.contains(&extension))
            .map(|(language, _)| language.clone())
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .configs
            .values()
            .flat_map(|config| config.extensions.iter().copied())
            .collect();
        extensions.sort_unstable();
        extensions
    }

    pub fn create_parser(&self, language: &Language) -> Option<Parser> {
        let config = self.configs.get(language)?;
        let mut parser = Parser::new();
        parser.set_language(&config.grammar).ok()?;
        Some(parser)
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

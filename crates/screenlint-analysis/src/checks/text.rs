//! Language detection, spelling and text similarity

use screenlint_core::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Share of known words a language needs to count as a candidate
const MIN_COVERAGE: f64 = 0.5;

/// Language detection and spelling
pub trait TextAnalyzer: Send + Sync {
    /// Candidate languages of `text`, most likely first
    fn detect_languages(&self, text: &str) -> Vec<String>;

    /// Words of `text` that none of `languages` knows
    ///
    /// Languages this analyzer has no data for are ignored.
    fn misspellings(&self, text: &str, languages: &[String]) -> Vec<String>;

    /// Spelling passes; text with no candidate language never passes
    fn is_spelling_correct(&self, text: &str, languages: &[String]) -> bool {
        !languages.is_empty() && self.misspellings(text, languages).is_empty()
    }
}

/// Lowercased alphabetic words of two or more letters
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Text worth translating: at least two characters and some letters
pub fn is_translatable(text: &str) -> bool {
    let text = text.trim();
    text.chars().count() > 1 && text.chars().any(char::is_alphabetic)
}

/// All letters uppercase (and at least one letter)
pub fn is_upper_case(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
        && text
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase)
}

/// Normalized Levenshtein similarity in `[0, 1]`, case and whitespace insensitive
pub fn similarity(a: &str, b: &str) -> f64 {
    let normalize = |s: &str| -> Vec<char> {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
            .chars()
            .collect()
    };
    let (a, b) = (normalize(a), normalize(b));
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    1.0 - previous[b.len()] as f64 / longest as f64
}

/// Word-list analyzer
///
/// Each locale has a set of known words. Detection ranks locales by the share of
/// words of the text they know; regional codes (`en-GB`) fall back to the base
/// language list.
#[derive(Debug, Clone, Default)]
pub struct DictionaryTextAnalyzer {
    dictionaries: HashMap<String, HashSet<String>>,
}

impl DictionaryTextAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_words<'a>(
        mut self,
        locale: &str,
        words: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.dictionaries
            .entry(locale.to_string())
            .or_default()
            .extend(words.into_iter().map(str::to_lowercase));
        self
    }

    /// Load every `<locale>.txt` in `dir`, one word per line
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut analyzer = Self::new();
        for entry in WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(path)?;
            analyzer = analyzer.with_words(
                locale,
                content.lines().map(str::trim).filter(|l| !l.is_empty()),
            );
        }
        info!("Loaded {} dictionaries from {}", analyzer.dictionaries.len(), dir.display());
        Ok(analyzer)
    }

    pub fn locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.dictionaries.keys().cloned().collect();
        locales.sort();
        locales
    }

    fn dictionary(&self, locale: &str) -> Option<&HashSet<String>> {
        self.dictionaries.get(locale).or_else(|| {
            let base = locale.split(['-', '_']).next()?;
            self.dictionaries.get(base)
        })
    }
}

impl TextAnalyzer for DictionaryTextAnalyzer {
    fn detect_languages(&self, text: &str) -> Vec<String> {
        let words = words(text);
        if words.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(String, f64)> = self
            .dictionaries
            .iter()
            .map(|(locale, dict)| {
                let known = words.iter().filter(|w| dict.contains(*w)).count();
                (locale.clone(), known as f64 / words.len() as f64)
            })
            .filter(|(_, coverage)| *coverage >= MIN_COVERAGE)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        debug!("Language candidates: {:?}", ranked);
        ranked.into_iter().map(|(locale, _)| locale).collect()
    }

    fn misspellings(&self, text: &str, languages: &[String]) -> Vec<String> {
        let dictionaries: Vec<&HashSet<String>> = languages
            .iter()
            .filter_map(|l| self.dictionary(l))
            .collect();
        if dictionaries.is_empty() {
            return Vec::new();
        }

        let mut misspelled: Vec<String> = Vec::new();
        for word in words(text) {
            if !dictionaries.iter().any(|d| d.contains(&word)) && !misspelled.contains(&word) {
                misspelled.push(word);
            }
        }
        misspelled
    }
}

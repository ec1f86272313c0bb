//! Dictionary keyword extraction for ad-hoc crawls.
//!
//! Matches a fixed vocabulary of technology terms, plus any caller-supplied
//! hint keywords, against normalized page text. Deterministic: hits are
//! reported in vocabulary order, hints first, capped.

use std::collections::HashSet;

/// Maximum keywords returned per page.
const MAX_KEYWORDS: usize = 50;

/// Built-in vocabulary, grouped for maintainability. Multi-word terms are
/// matched as phrases.
const VOCABULARY: &[&[&str]] = &[
    // languages
    &[
        "python", "javascript", "typescript", "java", "c++", "c#", "ruby", "php", "go", "rust",
        "swift", "kotlin", "scala", "sql", "html", "css", "bash",
    ],
    // frameworks
    &[
        "react", "angular", "vue", "svelte", "django", "flask", "fastapi", "express", "spring",
        "rails", "laravel", "graphql", "grpc", "rest api",
    ],
    // databases
    &[
        "postgresql", "mysql", "mongodb", "redis", "elasticsearch", "sqlite", "cassandra",
        "dynamodb",
    ],
    // cloud and operations
    &[
        "aws", "azure", "gcp", "kubernetes", "docker", "terraform", "jenkins", "github actions",
        "prometheus", "grafana", "serverless",
    ],
    // data and machine learning
    &[
        "machine learning", "deep learning", "tensorflow", "pytorch", "pandas", "numpy", "spark",
        "kafka", "airflow", "nlp", "computer vision", "llm",
    ],
];

/// Extract keywords from page text: hint matches first, then vocabulary
/// matches, deduplicated, at most [`MAX_KEYWORDS`].
pub fn extract_keywords(text: &str, hints: &[String]) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    // Pad with spaces so phrase containment respects word boundaries.
    // '+' and '#' survive for terms like c++ and c#; punctuation becomes
    // whitespace so "PostgreSQL." still matches.
    let haystack = format!(
        " {} ",
        text.to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || "+#".contains(c) { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut seen = HashSet::new();
    let mut found = Vec::new();

    let hint_terms = hints.iter().map(|h| h.to_lowercase());
    let vocab_terms = VOCABULARY
        .iter()
        .flat_map(|group| group.iter().map(|t| t.to_string()));

    for term in hint_terms.chain(vocab_terms) {
        if found.len() >= MAX_KEYWORDS {
            break;
        }
        if term.is_empty() || !seen.insert(term.clone()) {
            continue;
        }
        if haystack.contains(&format!(" {term} ")) {
            found.push(term);
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_vocabulary_terms() {
        let text = "We build services in Rust and Python, backed by PostgreSQL.";
        let found = extract_keywords(text, &[]);
        assert!(found.contains(&"rust".to_string()));
        assert!(found.contains(&"python".to_string()));
        assert!(found.contains(&"postgresql".to_string()));
    }

    #[test]
    fn matches_multi_word_phrases() {
        let text = "Experience with machine learning pipelines and GitHub Actions required.";
        let found = extract_keywords(text, &[]);
        assert!(found.contains(&"machine learning".to_string()));
        assert!(found.contains(&"github actions".to_string()));
    }

    #[test]
    fn respects_word_boundaries() {
        // "got" must not match "go"; "rustic" must not match "rust".
        let found = extract_keywords("we got rustic furniture", &[]);
        assert!(found.is_empty());
    }

    #[test]
    fn hints_come_first_and_are_case_insensitive() {
        let text = "Distributed crawling with Rust and RabbitMQ.";
        let found = extract_keywords(text, &["RabbitMQ".to_string()]);
        assert_eq!(found[0], "rabbitmq");
        assert!(found.contains(&"rust".to_string()));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extract_keywords("", &["rust".to_string()]).is_empty());
    }

    #[test]
    fn is_deterministic() {
        let text = "python rust docker kubernetes postgresql";
        assert_eq!(extract_keywords(text, &[]), extract_keywords(text, &[]));
    }
}

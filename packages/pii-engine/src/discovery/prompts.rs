//! Prompt construction for the discovery oracle.

use inference_client::{ChatRequest, Message};

use super::chunk::Chunk;
use crate::config::DiscoveryConfig;
use crate::types::{Candidate, Category};

const SYSTEM_PREAMBLE: &str = r#"You are a data-protection assistant. Find every value in the text that identifies a real person, directly or indirectly.

Use exactly these categories:"#;

const SYSTEM_RULES: &str = r#"Rules:
- Copy each value exactly as it appears in the text.
- Hints list values an automatic scanner already spotted; keep the real ones, fix their category if needed, and ignore false positives.
- Do not report generic words, roles, job titles, public institutions or placeholders.
- Answer with ONLY a JSON array, no prose: [{"value": "...", "category": "CATEGORY"}]
- If nothing is found, answer []"#;

/// System prompt with the category taxonomy.
pub fn system_prompt() -> String {
    let taxonomy: Vec<String> = Category::ALL
        .iter()
        .map(|c| format!("- {}: {}", c.code(), c.definition()))
        .collect();

    format!("{}\n{}\n\n{}", SYSTEM_PREAMBLE, taxonomy.join("\n"), SYSTEM_RULES)
}

/// Candidates whose value occurs in the chunk, most confident first.
pub fn select_hints<'a>(chunk: &str, candidates: &'a [Candidate], max_hints: usize) -> Vec<&'a Candidate> {
    let haystack = chunk.to_lowercase();
    let mut hints: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| haystack.contains(&c.value.to_lowercase()))
        .collect();

    // Stable: equal tiers keep scan order.
    hints.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    hints.truncate(max_hints);
    hints
}

/// User prompt: hint list followed by the chunk text.
pub fn user_prompt(chunk: &Chunk, hints: &[&Candidate]) -> String {
    let mut prompt = String::new();

    if !hints.is_empty() {
        prompt.push_str("Hints:\n");
        for hint in hints {
            prompt.push_str(&format!("- {} ({})\n", hint.value, hint.category.code()));
        }
        prompt.push('\n');
    }

    prompt.push_str("Text:\n<<<\n");
    prompt.push_str(&chunk.text);
    prompt.push_str("\n>>>");
    prompt
}

/// Full chat request for one chunk.
pub fn build_request(
    model: &str,
    chunk: &Chunk,
    hints: &[&Candidate],
    config: &DiscoveryConfig,
) -> ChatRequest {
    ChatRequest::new(model)
        .message(Message::system(system_prompt()))
        .message(Message::user(user_prompt(chunk, hints)))
        .temperature(config.temperature)
        .max_output_tokens(config.max_output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceTier, Span};

    fn candidate(value: &str, category: Category, confidence: ConfidenceTier) -> Candidate {
        Candidate {
            value: value.to_string(),
            category,
            confidence,
            span: Span { offset: 0, length: value.len() },
            context: String::new(),
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk { index: 0, offset: 0, text: text.to_string() }
    }

    #[test]
    fn test_system_prompt_lists_every_category() {
        let prompt = system_prompt();
        for category in Category::ALL {
            assert!(prompt.contains(category.code()));
        }
        assert!(prompt.contains("JSON array"));
    }

    #[test]
    fn test_hints_filtered_sorted_and_capped() {
        let candidates = vec![
            candidate("Tribunale Ordinario", Category::FullName, ConfidenceTier::Low),
            candidate("mario@example.com", Category::Email, ConfidenceTier::High),
            candidate("Luigi Bianchi", Category::FullName, ConfidenceTier::Medium),
            candidate("Napoli", Category::Birthplace, ConfidenceTier::Medium),
        ];
        let text = "Il TRIBUNALE ORDINARIO ha sentito Luigi Bianchi, MARIO@example.com";

        let hints = select_hints(text, &candidates, 10);
        let values: Vec<_> = hints.iter().map(|h| h.value.as_str()).collect();
        assert_eq!(values, vec!["mario@example.com", "Luigi Bianchi", "Tribunale Ordinario"]);

        let capped = select_hints(text, &candidates, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].value, "mario@example.com");
    }

    #[test]
    fn test_request_shape() {
        let candidates = vec![candidate("Mario Rossi", Category::FullName, ConfidenceTier::High)];
        let chunk = chunk("Il sig. Mario Rossi");
        let hints = select_hints(&chunk.text, &candidates, 5);
        let request = build_request("llama3.1:8b", &chunk, &hints, &DiscoveryConfig::default());

        assert_eq!(request.model, "llama3.1:8b");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[1].content.contains("- Mario Rossi (FULL_NAME)"));
        assert!(request.messages[1].content.contains("Il sig. Mario Rossi"));
        assert_eq!(request.options.temperature, Some(0.1));
        assert_eq!(request.options.max_output_tokens, Some(1_024));
    }

    #[test]
    fn test_no_hint_section_without_hints() {
        let prompt = user_prompt(&chunk("testo"), &[]);
        assert!(!prompt.contains("Hints"));
        assert!(prompt.ends_with(">>>"));
    }
}

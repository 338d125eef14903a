//! Prompt assembly helpers.
//!
//! Pure string work, kept separate from the database access so the exact
//! prompt shapes can be pinned down in tests.

use sentiric_agent_core::Turn;

/// Used when the relational store cannot deliver a system prompt.
pub const FALLBACK_SYSTEM_PROMPT: &str =
    "Aşağıdaki diyaloğa devam et. Cevapların kısa olsun.";

/// Used when the relational store cannot deliver a welcome prompt.
pub const FALLBACK_WELCOME_PROMPT: &str = "Merhaba, hoş geldiniz.";

/// Used when the relational store cannot deliver the RAG prompt template.
pub const FALLBACK_RAG_PROMPT: &str =
    "Aşağıdaki bilgileri kullanarak soruyu kısaca yanıtla.\n{context}\nSoru: {query}";

const HISTORY_HEADER: &str = "\n\n--- CONVERSATION HISTORY ---\n";

/// Substitute the caller's display name into a welcome template.
pub fn render_welcome(template: &str, user_name: Option<&str>) -> String {
    match user_name {
        Some(name) => template.replace("{user_name}", name),
        None => template.to_string(),
    }
}

/// Default prompt: system prompt plus the transcript so far, ending with a
/// bare `Assistant:` line for the model to complete.
pub fn assemble_history_prompt(system_prompt: &str, conversation: &[Turn]) -> String {
    let mut prompt = String::from(system_prompt);
    prompt.push_str(HISTORY_HEADER);
    for turn in conversation {
        match turn {
            Turn::User(text) => {
                prompt.push_str("User: ");
                prompt.push_str(text);
                prompt.push('\n');
            }
            Turn::Ai(text) => {
                prompt.push_str("Assistant: ");
                prompt.push_str(text);
                prompt.push('\n');
            }
        }
    }
    prompt.push_str("Assistant:");
    prompt
}

/// RAG prompt: template with `{context}` and `{query}` substituted.
pub fn assemble_rag_prompt(template: &str, context: &str, query: &str) -> String {
    template.replace("{context}", context).replace("{query}", query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_substitutes_user_name() {
        let rendered = render_welcome("Greet {user_name} warmly.", Some("Ada"));
        assert_eq!(rendered, "Greet Ada warmly.");
        let untouched = render_welcome("Greet the guest.", None);
        assert_eq!(untouched, "Greet the guest.");
    }

    #[test]
    fn history_prompt_has_header_lines_and_trailing_assistant() {
        let conversation = vec![Turn::ai("Hello!"), Turn::user("What are your hours?")];
        let prompt = assemble_history_prompt("Be brief.", &conversation);
        assert_eq!(
            prompt,
            "Be brief.\n\n--- CONVERSATION HISTORY ---\nAssistant: Hello!\nUser: What are your hours?\nAssistant:"
        );
    }

    #[test]
    fn rag_prompt_substitutes_both_placeholders() {
        let prompt = assemble_rag_prompt("ctx={context} q={query}", "facts", "hours?");
        assert_eq!(prompt, "ctx=facts q=hours?");
    }
}

//! System prompt derived from an agent's record.

/// Build the system prompt for an agent.
///
/// A non-blank persona is appended under an `Agent persona:` heading.
pub fn build_system_prompt(name: &str, persona: &str) -> String {
    let name = match name.trim() {
        "" => "Switchyard",
        trimmed => trimmed,
    };
    let base = format!(
        "You are {name}, a persistent agent with one continuous brain. \
         Use memory/message tools when helpful, but only on demand. \
         You can create, update, and delete semantic memories autonomously. \
         When searching old chat content, use message search tools."
    );

    let persona = persona.trim();
    if persona.is_empty() {
        return base;
    }
    format!("{base}\n\nAgent persona:\n{persona}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_persona_gives_base_prompt() {
        let prompt = build_system_prompt("Ada", "   ");
        assert!(prompt.starts_with("You are Ada, a persistent agent"));
        assert!(!prompt.contains("Agent persona:"));
    }

    #[test]
    fn persona_is_appended_trimmed() {
        let prompt = build_system_prompt("Ada", "\n  Terse and precise.  \n");
        assert!(prompt.ends_with("\n\nAgent persona:\nTerse and precise."));
    }

    #[test]
    fn blank_name_falls_back() {
        assert!(build_system_prompt("", "").starts_with("You are Switchyard,"));
    }
}

//! Prompt templates.
//!
//! A deployment serves one model family, and every family expects its
//! conversation encoded in a specific literal grammar. [`TemplateVariant`]
//! selects that grammar once at startup; [`TemplateVariant::render`] is a
//! total, deterministic function over the message list and never truncates.

use strum::{Display, EnumString};
use tracing::debug;

use crate::types::{ChatMessage, Role};

/// Beginning-of-sequence marker emitted literally by the bracket template.
pub const BOS: &str = "<s>";

/// Persona used by the turn-delimited template when no system message exists.
pub const DEFAULT_PERSONA: &str = "You are an AI programming assistant, utilizing the \
     DeepSeek Coder model to generate code and provide coding assistance.";

const CONVERSATION_OPEN: &str = "<｜begin▁of▁conversation｜>";
const SYSTEM_TAG: &str = "<｜system｜>";
const USER_TAG: &str = "<｜user｜>";
const ASSISTANT_TAG: &str = "<｜assistant｜>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum TemplateVariant {
    /// `<s>[INST] {system}\n\n{user} [/INST]`, built from the last system
    /// message and the last user message only.
    InstructionBracket,
    /// Full conversation with `<｜role｜>` tags per turn.
    TurnDelimited,
}

impl TemplateVariant {
    /// Render `messages` into a single prompt string.
    pub fn render(self, messages: &[ChatMessage]) -> String {
        let prompt = match self {
            TemplateVariant::InstructionBracket => render_instruction_bracket(messages),
            TemplateVariant::TurnDelimited => render_turn_delimited(messages),
        };
        debug!(template = %self, prompt = %prompt, "formatted prompt");
        prompt
    }
}

fn render_instruction_bracket(messages: &[ChatMessage]) -> String {
    let last_content = |role: Role| {
        messages
            .iter()
            .rev()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    };

    let user = last_content(Role::User).unwrap_or_default();
    match last_content(Role::System) {
        Some(system) if !system.is_empty() => format!("{BOS}[INST] {system}\n\n{user} [/INST]"),
        _ => format!("{BOS}[INST] {user} [/INST]"),
    }
}

fn render_turn_delimited(messages: &[ChatMessage]) -> String {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or(DEFAULT_PERSONA);

    let mut out = format!("{CONVERSATION_OPEN}\n{SYSTEM_TAG}\n{system}\n");
    for msg in messages {
        let tag = match msg.role {
            Role::User => USER_TAG,
            Role::Assistant => ASSISTANT_TAG,
            Role::System | Role::Other => continue,
        };
        out.push_str(tag);
        out.push('\n');
        out.push_str(&msg.content);
        out.push('\n');
    }

    if messages.last().is_some_and(|m| m.role == Role::User) {
        out.push_str(ASSISTANT_TAG);
        out.push('\n');
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    fn msg(role: Role, content: &str) -> ChatMessage {
        ChatMessage::new(role, content)
    }

    #[test]
    fn bracket_with_system_message() {
        let prompt = TemplateVariant::InstructionBracket
            .render(&[msg(Role::System, "S"), msg(Role::User, "U")]);
        assert_eq!(prompt, "<s>[INST] S\n\nU [/INST]");
    }

    #[test]
    fn bracket_without_system_message() {
        let prompt = TemplateVariant::InstructionBracket.render(&[msg(Role::User, "U")]);
        assert_eq!(prompt, "<s>[INST] U [/INST]");
    }

    #[test]
    fn bracket_keeps_only_last_system_and_last_user() {
        let prompt = TemplateVariant::InstructionBracket.render(&[
            msg(Role::System, "old rules"),
            msg(Role::User, "first question"),
            msg(Role::Assistant, "first answer"),
            msg(Role::System, "new rules"),
            msg(Role::User, "second question"),
        ]);
        assert_eq!(prompt, "<s>[INST] new rules\n\nsecond question [/INST]");
    }

    #[test]
    fn bracket_without_user_substitutes_empty_content() {
        let prompt = TemplateVariant::InstructionBracket.render(&[msg(Role::System, "S")]);
        assert_eq!(prompt, "<s>[INST] S\n\n [/INST]");
    }

    #[test]
    fn turn_delimited_ending_with_user_opens_assistant_turn() {
        let prompt = TemplateVariant::TurnDelimited.render(&[
            msg(Role::System, "be brief"),
            msg(Role::User, "hello"),
        ]);
        assert_eq!(
            prompt,
            "<｜begin▁of▁conversation｜>\n<｜system｜>\nbe brief\n<｜user｜>\nhello\n<｜assistant｜>\n"
        );
        assert!(prompt.ends_with("<｜assistant｜>\n"));
    }

    #[test]
    fn turn_delimited_ending_with_assistant_has_no_open_turn() {
        let prompt = TemplateVariant::TurnDelimited.render(&[
            msg(Role::User, "hello"),
            msg(Role::Assistant, "hi there"),
        ]);
        assert!(prompt.ends_with("<｜assistant｜>\nhi there\n"));
        assert_eq!(prompt.matches(ASSISTANT_TAG).count(), 1);
    }

    #[test]
    fn turn_delimited_uses_first_system_or_default_persona() {
        let with_two = TemplateVariant::TurnDelimited.render(&[
            msg(Role::System, "first"),
            msg(Role::System, "second"),
            msg(Role::User, "q"),
        ]);
        assert!(with_two.contains("<｜system｜>\nfirst\n"));
        assert!(!with_two.contains("second"));

        let without = TemplateVariant::TurnDelimited.render(&[msg(Role::User, "q")]);
        assert!(without.contains(DEFAULT_PERSONA));
    }

    #[test]
    fn other_roles_are_left_out_of_both_templates() {
        let messages = [
            msg(Role::Other, "tool output"),
            msg(Role::User, "hi"),
            msg(Role::Other, "trailing note"),
        ];
        assert_eq!(
            TemplateVariant::InstructionBracket.render(&messages),
            "<s>[INST] hi [/INST]"
        );

        let prompt = TemplateVariant::TurnDelimited.render(&messages);
        assert!(!prompt.contains("tool output"));
        assert!(!prompt.contains("trailing note"));
        // The last message is not from the user, so no open assistant turn.
        assert!(prompt.ends_with("<｜user｜>\nhi\n"));
    }

    #[test]
    fn render_is_deterministic() {
        let messages = vec![
            msg(Role::System, "S"),
            msg(Role::User, "a"),
            msg(Role::Assistant, "b"),
            msg(Role::User, "c"),
        ];
        for variant in [TemplateVariant::InstructionBracket, TemplateVariant::TurnDelimited] {
            assert_eq!(variant.render(&messages), variant.render(&messages));
            assert!(!variant.render(&messages).is_empty());
        }
    }

    #[test]
    fn variant_parses_from_kebab_case() {
        assert_eq!(
            "turn-delimited".parse::<TemplateVariant>().ok(),
            Some(TemplateVariant::TurnDelimited)
        );
        assert_eq!(TemplateVariant::InstructionBracket.to_string(), "instruction-bracket");
    }
}

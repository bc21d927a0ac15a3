use crate::models::chat::{ ChatMessage, Role };

pub const USER_LABEL: &str = "ユーザー";
pub const ASSISTANT_LABEL: &str = "アシスタント";

/// Longest history turn carried into the prompt, in characters. Longer turns
/// are cut and marked with an ellipsis.
pub const TURN_CHAR_LIMIT: usize = 1000;

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
    }
}

fn clip_turn(content: &str) -> String {
    if content.chars().count() <= TURN_CHAR_LIMIT {
        return content.to_string();
    }
    let mut clipped: String = content.chars().take(TURN_CHAR_LIMIT).collect();
    clipped.push_str("...");
    clipped
}

/// Flattens a request into the single text prompt the model receives: an
/// optional system prompt, the last `window` history turns as labeled lines,
/// the new message under the user label, and an open assistant label for the
/// model to continue from. Turns with blank content are skipped.
pub fn build_prompt(
    message: &str,
    history: &[ChatMessage],
    system_prompt: Option<&str>,
    window: usize
) -> String {
    let mut prompt = String::new();

    if let Some(system) = system_prompt {
        if !system.is_empty() {
            prompt.push_str(system);
            prompt.push_str("\n\n");
        }
    }

    let start = history.len().saturating_sub(window);
    for msg in &history[start..] {
        if msg.content.trim().is_empty() {
            continue;
        }
        prompt.push_str(&format!("{}: {}\n", role_label(msg.role), clip_turn(&msg.content)));
    }

    prompt.push_str(&format!("{}: {}\n{}:", USER_LABEL, message, ASSISTANT_LABEL));
    prompt
}

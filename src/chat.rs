use crate::error::ChatError;
use crate::messages::{convert_to_gemini, AdaptedTurn, ChatTurn, GeminiRole, SYSTEM_MARKER};
use anyhow::Result;
use log::debug;

/// Free-form text generation against a named model
#[allow(async_fn_in_trait)]
pub trait TextGenerator {
    async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String>;
}

impl<T: TextGenerator + ?Sized> TextGenerator for &T {
    async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        (**self).generate(model, prompt, temperature).await
    }
}

/// How a converted conversation is turned into one prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStrategy {
    /// One message, sent verbatim
    Single,
    /// Folded system instruction plus the following message. Anything after
    /// the second message is not sent.
    SystemPlusOne,
    /// Every message rendered as a labelled line
    General,
}

/// Pick the prompt strategy for a converted conversation
pub fn classify(turns: &[AdaptedTurn]) -> PromptStrategy {
    match turns {
        [_] => PromptStrategy::Single,
        [first, _, ..] if first.text().contains(SYSTEM_MARKER) => PromptStrategy::SystemPlusOne,
        _ => PromptStrategy::General,
    }
}

/// Build the prompt text for a strategy
pub fn render(strategy: PromptStrategy, turns: &[AdaptedTurn]) -> String {
    match (strategy, turns) {
        (PromptStrategy::Single, [only, ..]) => only.text().to_string(),
        (PromptStrategy::SystemPlusOne, [system, user, ..]) => {
            format!("{}\n\nUser: {}", system.text(), user.text())
        }
        _ => render_conversation(turns),
    }
}

fn render_conversation(turns: &[AdaptedTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let label = match turn.role {
                GeminiRole::Model => "Assistant",
                GeminiRole::User => "User",
            };
            format!("{}: {}\n\n", label, turn.text())
        })
        .collect()
}

/// Send OpenAI-style messages to a Gemini model and return the response text.
///
/// The conversation is collapsed into a single prompt, see [`PromptStrategy`].
/// Errors from the generator are returned unchanged.
pub async fn call_gemini_chat<G: TextGenerator>(
    client: &G,
    model: &str,
    messages: &[ChatTurn],
    temperature: f32,
) -> Result<String> {
    if messages.is_empty() {
        return Err(ChatError::EmptyConversation.into());
    }

    let turns = convert_to_gemini(messages);
    let strategy = classify(&turns);
    debug!(
        "Dispatching {} messages to {} as {:?}",
        turns.len(),
        model,
        strategy
    );

    let prompt = render(strategy, &turns);
    client.generate(model, &prompt, temperature).await
}

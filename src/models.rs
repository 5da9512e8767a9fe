/// Gemini model used when an OpenAI model has no known equivalent
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// OpenAI model name to the closest Gemini model
const OPENAI_TO_GEMINI_MODELS: &[(&str, &str)] = &[
    ("gpt-4o-mini", "gemini-1.5-flash"),
    ("gpt-4o", "gemini-1.5-pro"),
    ("gpt-3.5-turbo", "gemini-1.5-flash"),
    ("gpt-4", "gemini-1.5-pro"),
];

/// Convert an OpenAI model name to the equivalent Gemini model
pub fn gemini_model_name(openai_model: &str) -> &'static str {
    OPENAI_TO_GEMINI_MODELS
        .iter()
        .find(|(openai, _)| *openai == openai_model)
        .map(|(_, gemini)| *gemini)
        .unwrap_or(DEFAULT_GEMINI_MODEL)
}

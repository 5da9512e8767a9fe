use crate::error::ChatError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Prefix put in front of system content, Gemini has no system role
pub const SYSTEM_PREFIX: &str = "System instruction: ";

/// Marker used by the dispatcher to recognise a folded system turn
pub const SYSTEM_MARKER: &str = "System instruction:";

/// Speaker of an OpenAI-style chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl FromStr for Role {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(ChatError::UnknownRole(other.to_string())),
        }
    }
}

/// One OpenAI-style chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ChatTurn {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Gemini-side speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeminiRole {
    User,
    Model,
}

/// A chat message in Gemini's `{role, parts}` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdaptedTurn {
    pub role: GeminiRole,
    pub parts: Vec<String>,
}

impl AdaptedTurn {
    fn single(role: GeminiRole, text: String) -> Self {
        AdaptedTurn {
            role,
            parts: vec![text],
        }
    }

    /// Text of the first part, or an empty string when there are no parts
    pub fn text(&self) -> &str {
        self.parts.first().map(String::as_str).unwrap_or_default()
    }
}

/// Convert OpenAI chat messages into Gemini messages.
///
/// System messages become user messages carrying [`SYSTEM_PREFIX`],
/// assistant messages become model messages, user messages are unchanged.
pub fn convert_to_gemini(turns: &[ChatTurn]) -> Vec<AdaptedTurn> {
    turns
        .iter()
        .map(|turn| match turn.role {
            Role::System => AdaptedTurn::single(
                GeminiRole::User,
                format!("{}{}", SYSTEM_PREFIX, turn.content),
            ),
            Role::Assistant => AdaptedTurn::single(GeminiRole::Model, turn.content.clone()),
            Role::User => AdaptedTurn::single(GeminiRole::User, turn.content.clone()),
        })
        .collect()
}

/// Parse a JSON array of OpenAI-style messages.
///
/// A missing or null `content` is read as an empty string. Unknown roles are
/// rejected with [`ChatError::UnknownRole`].
pub fn parse_openai_messages(json: &str) -> Result<Vec<ChatTurn>, ChatError> {
    #[derive(Deserialize)]
    struct RawMessage {
        role: String,
        #[serde(default)]
        content: Option<String>,
    }

    let raw: Vec<RawMessage> = serde_json::from_str(json)?;

    raw.into_iter()
        .map(|message| -> Result<ChatTurn, ChatError> {
            Ok(ChatTurn {
                role: message.role.parse()?,
                content: message.content.unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_maps_roles_in_order() {
        let turns = vec![
            ChatTurn::system("Be brief"),
            ChatTurn::user("Hi"),
            ChatTurn::assistant("Hello!"),
            ChatTurn::user("Bye"),
        ];

        let adapted = convert_to_gemini(&turns);

        let roles: Vec<GeminiRole> = adapted.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                GeminiRole::User,
                GeminiRole::User,
                GeminiRole::Model,
                GeminiRole::User
            ]
        );
        assert!(adapted.iter().all(|t| t.parts.len() == 1));
        assert_eq!(adapted[1].text(), "Hi");
        assert_eq!(adapted[2].text(), "Hello!");
    }

    #[test]
    fn test_system_turn_gets_prefix() {
        let adapted = convert_to_gemini(&[ChatTurn::system("  keep spacing ")]);
        assert_eq!(adapted[0].text(), "System instruction:   keep spacing ");
        assert!(adapted[0].text().starts_with(SYSTEM_PREFIX));
    }

    #[test]
    fn test_convert_empty() {
        assert!(convert_to_gemini(&[]).is_empty());
    }

    #[test]
    fn test_parse_openai_messages() {
        let json = r#"[
            {"role": "system", "content": "Be brief"},
            {"role": "user", "content": "What is 2+2?"},
            {"role": "assistant"}
        ]"#;

        let turns = parse_openai_messages(json).unwrap();
        assert_eq!(
            turns,
            vec![
                ChatTurn::system("Be brief"),
                ChatTurn::user("What is 2+2?"),
                ChatTurn::assistant(""),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        let json = r#"[{"role": "user", "content": "hi"}, {"role": "tool", "content": "42"}]"#;

        match parse_openai_messages(json) {
            Err(ChatError::UnknownRole(role)) => assert_eq!(role, "tool"),
            other => panic!("expected UnknownRole, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_openai_messages("{not json"),
            Err(ChatError::InvalidMessages(_))
        ));
    }

    #[test]
    fn test_role_from_str_is_case_sensitive() {
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("User".parse::<Role>().is_err());
    }
}

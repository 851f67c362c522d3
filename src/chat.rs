use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Content of the most recent `user` message, scanning from the end.
    pub fn latest_user_prompt(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .map(Message::text)
    }

    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl Message {
    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::to_text)
            .unwrap_or_default()
    }
}

/// Either a plain string or the array-of-parts form OpenAI clients also send.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::ChatRequest;
    use serde_json::json;

    fn request(value: serde_json::Value) -> ChatRequest {
        serde_json::from_value(value).expect("valid chat request")
    }

    #[test]
    fn picks_latest_user_message() {
        let req = request(json!({
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "first" },
                { "role": "assistant", "content": "ok" },
                { "role": "user", "content": "second" },
                { "role": "assistant", "content": "trailing" }
            ]
        }));
        assert_eq!(req.latest_user_prompt().as_deref(), Some("second"));
        // The scan must leave the history in its original order.
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[4].role, "assistant");
    }

    #[test]
    fn no_user_message_yields_none() {
        let req = request(json!({
            "messages": [{ "role": "system", "content": "only system" }]
        }));
        assert!(req.latest_user_prompt().is_none());
        assert!(request(json!({ "messages": [] })).latest_user_prompt().is_none());
    }

    #[test]
    fn joins_text_parts_and_skips_others() {
        let req = request(json!({
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "look at" },
                    { "type": "image_url", "image_url": { "url": "http://x" } },
                    { "type": "text", "text": "this" }
                ]
            }]
        }));
        assert_eq!(req.latest_user_prompt().as_deref(), Some("look at\nthis"));
    }

    #[test]
    fn null_content_is_empty_and_extra_fields_are_ignored() {
        let req = request(json!({
            "model": "fast",
            "temperature": 0.2,
            "stream": true,
            "messages": [{ "role": "user", "content": null }]
        }));
        assert_eq!(req.latest_user_prompt().as_deref(), Some(""));
        assert!(req.is_stream());
        assert_eq!(req.model.as_deref(), Some("fast"));
    }
}

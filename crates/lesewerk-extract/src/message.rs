// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Chat messages and the field-extraction prompt.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in an OpenAI-style chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Builds the conversation sent to the language model for field extraction.
pub trait ExtractionMessage: Send + Sync {
    /// Messages asking for `fields`, given the document `content`.
    ///
    /// With `content == None` the model is asked for an empty JSON template.
    fn build(&self, fields: &[String], content: Option<&str>) -> Vec<ChatMessage>;
}

/// System prompt demanding JSON only, plus the document text as the user turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractionMessage;

impl DefaultExtractionMessage {
    fn system_prompt(fields: &[String]) -> String {
        let format_example = json!({
            "single_value_field": "<value>",
            "list_or_table_field": [
                {"value": "<value1>", "details": {"percentage": "60%", "date": "2024-01-01"}},
                {"value": "<value2>", "details": {"percentage": "40%", "date": "2024-01-02"}}
            ]
        });
        let example = serde_json::to_string_pretty(&format_example).unwrap_or_default();

        format!(
            "You are a professional data extraction system.\n\
             Extract the following fields from the document: {}.\n\
             Return ONLY valid JSON format with the extracted values.\n\
             Use null for missing fields.\n\
             \n\
             Special instructions:\n\
             1. If a field contains multiple values (like in a table or list), return it as a list of objects\n\
             2. For table data, include relevant details like percentages, dates in a 'details' object\n\
             3. For simple single values, return them directly\n\
             \n\
             Example format:\n\
             {}",
            fields.join(", "),
            example
        )
    }
}

impl ExtractionMessage for DefaultExtractionMessage {
    fn build(&self, fields: &[String], content: Option<&str>) -> Vec<ChatMessage> {
        let user_prompt = match content {
            Some(content) => format!("DOCUMENT CONTENT:\n{}", content),
            None => {
                "Please provide a JSON template with null values for the requested fields."
                    .to_string()
            }
        };

        vec![
            ChatMessage::system(Self::system_prompt(fields)),
            ChatMessage::user(user_prompt),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<String> {
        vec!["invoice_number".into(), "total".into(), "line_items".into()]
    }

    #[test]
    fn system_prompt_lists_fields_and_demands_json() {
        let messages = DefaultExtractionMessage.build(&fields(), Some("Invoice 42"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        let system = &messages[0].content;
        assert!(system.contains("invoice_number, total, line_items"));
        assert!(system.contains("Return ONLY valid JSON"));
        assert!(system.contains("Use null for missing fields"));
        assert!(system.contains("\"list_or_table_field\""));
    }

    #[test]
    fn user_prompt_carries_document() {
        let messages = DefaultExtractionMessage.build(&fields(), Some("Invoice 42\nTotal 10"));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "DOCUMENT CONTENT:\nInvoice 42\nTotal 10");
    }

    #[test]
    fn missing_content_asks_for_template() {
        let messages = DefaultExtractionMessage.build(&fields(), None);
        assert!(messages[1].content.contains("JSON template with null values"));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("ok")).unwrap();
        assert_eq!(json, json!({"role": "assistant", "content": "ok"}));
    }
}

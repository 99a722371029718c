//! Dialogflow CX webhook wire types.

use serde::{Deserialize, Serialize};

/// Incoming fulfillment request. Only the fields the webhook reads are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub fulfillment_info: FulfillmentInfo,
    /// The user's utterance.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FulfillmentInfo {
    #[serde(default)]
    pub tag: Option<String>,
}

impl WebhookRequest {
    pub fn tag(&self) -> &str {
        self.fulfillment_info.tag.as_deref().unwrap_or("")
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Which backend action a tag selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTag {
    BigQuery,
    DataStore,
    Unknown,
}

impl WebhookTag {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "bq_webhook" => WebhookTag::BigQuery,
            "ds_webhook" => WebhookTag::DataStore,
            _ => WebhookTag::Unknown,
        }
    }
}

/// `{"fulfillment_response": {"messages": [{"text": {"text": [..]}}]}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub fulfillment_response: FulfillmentResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentResponse {
    pub messages: Vec<ResponseMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub text: MessageText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageText {
    pub text: Vec<String>,
}

impl WebhookResponse {
    /// Response carrying a single text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            fulfillment_response: FulfillmentResponse {
                messages: vec![ResponseMessage {
                    text: MessageText {
                        text: vec![text.into()],
                    },
                }],
            },
        }
    }

    /// First text of the first message, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.fulfillment_response
            .messages
            .first()
            .and_then(|m| m.text.text.first())
            .map(String::as_str)
    }
}

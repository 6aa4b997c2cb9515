use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Server,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Server => "server",
            SenderType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => SenderType::User,
            "server" => SenderType::Server,
            _ => SenderType::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub archived: bool,
    #[serde(default)]
    pub action: Vec<NotificationAction>,
    pub sender: String,
    pub sender_type: SenderType,
    /// Unix ms.
    pub date: i64,
}

//! 聊天机器人占位实体
//!
//! 症状、疾病、药品与会话尚无数据来源，接口仅返回空集合

use serde::Serialize;

/// 发送消息的固定回复
pub const DEMO_REPLY: &str = "This is a demo response from the AI.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEnded {
    pub success: bool,
}

/// 列表类接口的返回体
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub items: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Listing {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            query: None,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session: serde_json::Value,
    pub messages: Vec<serde_json::Value>,
}

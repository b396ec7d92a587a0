//! 聊天机器人接口骨架
//!
//! 会话不落库，列表均为空；症状分析与推荐逻辑尚未接入

use chrono::Utc;
use serde_json::{json, Value};

use crate::domain::chat::{ChatReply, Listing, SessionDetail, SessionEnded, SessionStarted, DEMO_REPLY};

fn clock() -> String {
    Utc::now().format("%H:%M").to_string()
}

/// 聊天界面所需的初始数据
pub fn interface() -> Value {
    json!({ "current_time": clock() })
}

pub fn start_session() -> SessionStarted {
    SessionStarted {
        session_id: uuid::Uuid::new_v4().to_string(),
    }
}

pub fn end_session(_session_id: &str) -> SessionEnded {
    SessionEnded { success: true }
}

/// 任意消息（包括空消息）都返回固定回复
pub fn send_message(_session_id: &str) -> ChatReply {
    ChatReply {
        message: DEMO_REPLY.to_string(),
        timestamp: clock(),
    }
}

pub fn list() -> Listing {
    Listing::empty()
}

pub fn detail(_id: &str) -> Value {
    json!({})
}

pub fn search_medicines(query: Option<String>) -> Listing {
    Listing {
        query: Some(query.unwrap_or_default()),
        ..Listing::empty()
    }
}

pub fn recommendations(session_id: &str) -> Listing {
    Listing {
        session_id: Some(session_id.to_string()),
        ..Listing::empty()
    }
}

pub fn session_detail(_session_id: &str) -> SessionDetail {
    SessionDetail {
        session: json!({}),
        messages: Vec::new(),
    }
}

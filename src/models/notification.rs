use crate::{
    error::{AppError, Result},
    models::{realtime::RelatedObject, user::User},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Like,
    Comment,
    Reply,
    Mention,
    Follow,
    GroupJoinRequest,
    GroupJoinApproved,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Like => "like",
            NotificationType::Comment => "comment",
            NotificationType::Reply => "reply",
            NotificationType::Mention => "mention",
            NotificationType::Follow => "follow",
            NotificationType::GroupJoinRequest => "group_join_request",
            NotificationType::GroupJoinApproved => "group_join_approved",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "like" => Ok(NotificationType::Like),
            "comment" => Ok(NotificationType::Comment),
            "reply" => Ok(NotificationType::Reply),
            "mention" => Ok(NotificationType::Mention),
            "follow" => Ok(NotificationType::Follow),
            "group_join_request" => Ok(NotificationType::GroupJoinRequest),
            "group_join_approved" => Ok(NotificationType::GroupJoinApproved),
            other => Err(AppError::Parse(format!(
                "Unknown notification type: {}",
                other
            ))),
        }
    }
}

/// 多态引用的对象种类
/// 与存储中的 action_kind / target_kind 列一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Post,
    Comment,
    Like,
    Follow,
    Group,
    JoinRequest,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Post => "post",
            ObjectKind::Comment => "comment",
            ObjectKind::Like => "like",
            ObjectKind::Follow => "follow",
            ObjectKind::Group => "group",
            ObjectKind::JoinRequest => "join_request",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "post" => Ok(ObjectKind::Post),
            "comment" => Ok(ObjectKind::Comment),
            "like" => Ok(ObjectKind::Like),
            "follow" => Ok(ObjectKind::Follow),
            "group" => Ok(ObjectKind::Group),
            "join_request" => Ok(ObjectKind::JoinRequest),
            other => Err(AppError::Parse(format!("Unknown object kind: {}", other))),
        }
    }
}

/// 待写入的通知
/// 去重键为 (recipient_id, actor.id, action.kind, action.id)
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub actor: User,
    pub verb: String,
    pub notification_type: NotificationType,
    pub action: RelatedObject,
    pub target: Option<RelatedObject>,
}

/// 已落库的通知记录
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub actor: User,
    pub verb: String,
    pub notification_type: NotificationType,
    pub action: RelatedObject,
    pub target: Option<RelatedObject>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Notification {
    /// 由插入成功的 NewNotification 和数据库返回的 id/时间戳组装
    pub fn from_new(new: NewNotification, id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            recipient_id: new.recipient_id,
            actor: new.actor,
            verb: new.verb,
            notification_type: new.notification_type,
            action: new.action,
            target: new.target,
            created_at,
            is_read: false,
        }
    }
}

use crate::{
    error::Result,
    models::{
        content::{Comment, Follow, Group, GroupJoinRequest, Like, LikedObject, Post},
        notification::{Notification, NotificationType, ObjectKind},
        user::User,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 上下文摘要的最大长度（字符数）
const SNIPPET_MAX_CHARS: usize = 75;

/// display_text 的最大长度
const DISPLAY_TEXT_MAX_CHARS: usize = 50;

/// 推送主题
/// 每个连接固定加入自己的私有主题和全局主题
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    User(i64),
    Global,
}

impl Topic {
    pub fn name(&self) -> String {
        match self {
            Topic::User(id) => format!("user:{}", id),
            Topic::Global => "global".to_string(),
        }
    }
}

/// 多态关联对象的线上摘要
/// target 和 action_object 在载荷中都使用这个形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedObject {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub id: i64,
    pub display_text: String,
    /// 评论指向其所属帖子，其余对象指向自身，供前端跳转
    pub object_id: i64,
    pub slug: Option<String>,
    /// 原始正文，仅用于派生摘要，不进入线上载荷
    #[serde(skip)]
    pub content: Option<String>,
}

impl RelatedObject {
    pub fn from_post(post: &Post) -> Self {
        Self {
            kind: ObjectKind::Post,
            id: post.id,
            display_text: display_text(&post.content),
            object_id: post.id,
            slug: post.slug.clone(),
            content: Some(post.content.clone()),
        }
    }

    pub fn from_comment(comment: &Comment, post: &Post) -> Self {
        Self {
            kind: ObjectKind::Comment,
            id: comment.id,
            display_text: display_text(&comment.content),
            object_id: post.id,
            slug: None,
            content: Some(comment.content.clone()),
        }
    }

    pub fn from_like(like: &Like) -> Self {
        let post_id = match &like.target {
            LikedObject::Post(post) => post.id,
            LikedObject::Comment { post, .. } => post.id,
        };
        Self {
            kind: ObjectKind::Like,
            id: like.id,
            display_text: format!("like by {}", like.user.username),
            object_id: post_id,
            slug: None,
            content: None,
        }
    }

    pub fn from_follow(follow: &Follow) -> Self {
        Self {
            kind: ObjectKind::Follow,
            id: follow.id,
            display_text: format!("{} follows {}", follow.follower.username, follow.following.username),
            object_id: follow.id,
            slug: None,
            content: None,
        }
    }

    pub fn from_group(group: &Group) -> Self {
        Self {
            kind: ObjectKind::Group,
            id: group.id,
            display_text: group.name.clone(),
            object_id: group.id,
            slug: group.slug.clone(),
            content: None,
        }
    }

    pub fn from_join_request(request: &GroupJoinRequest) -> Self {
        Self {
            kind: ObjectKind::JoinRequest,
            id: request.id,
            display_text: format!("join request from {}", request.user.username),
            object_id: request.group.id,
            slug: None,
            content: None,
        }
    }

    /// 关联对象已被删除时的占位摘要
    pub fn missing(kind: ObjectKind, id: i64) -> Self {
        Self {
            kind,
            id,
            display_text: "(deleted)".to_string(),
            object_id: id,
            slug: None,
            content: None,
        }
    }
}

/// 推送给客户端的通知载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: i64,
    pub actor: User,
    pub verb: String,
    pub notification_type: NotificationType,
    pub target: Option<RelatedObject>,
    pub action_object: RelatedObject,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub context_snippet: Option<String>,
}

impl From<&Notification> for NotificationPayload {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            actor: notification.actor.clone(),
            verb: notification.verb.clone(),
            notification_type: notification.notification_type,
            target: notification.target.clone(),
            action_object: notification.action.clone(),
            timestamp: notification.created_at,
            is_read: notification.is_read,
            context_snippet: context_snippet(notification),
        }
    }
}

/// 派生通知的上下文摘要
///
/// 评论/回复/提及取触发它的新内容（action_object），
/// 点赞取被赞对象（target），关注和小组类通知没有摘要。
/// 关联内容缺失时返回 None，绝不报错。
pub fn context_snippet(notification: &Notification) -> Option<String> {
    let source = match notification.notification_type {
        NotificationType::Comment | NotificationType::Reply | NotificationType::Mention => {
            notification.action.content.as_deref()
        }
        NotificationType::Like => notification
            .target
            .as_ref()
            .and_then(|t| t.content.as_deref()),
        _ => None,
    };

    let content = source?.trim();
    if content.is_empty() {
        return None;
    }

    if content.chars().count() > SNIPPET_MAX_CHARS {
        let truncated: String = content.chars().take(SNIPPET_MAX_CHARS).collect();
        Some(format!("\"{}...\"", truncated))
    } else {
        Some(format!("\"{}\"", content))
    }
}

pub(crate) fn display_text(text: &str) -> String {
    if text.chars().count() > DISPLAY_TEXT_MAX_CHARS {
        text.chars().take(DISPLAY_TEXT_MAX_CHARS).collect()
    } else {
        text.to_string()
    }
}

/// 线上消息信封：{"type": ..., "payload": {...}}
/// type 是客户端分发 UI 处理的判别字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveMessage {
    #[serde(rename = "type")]
    pub message_type: LiveMessageType,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveMessageType {
    NewNotification,
    NewPost,
    PostDeleted,
}

impl LiveMessage {
    /// 载荷序列化失败时返回错误，由调用方记录并放弃本次推送，
    /// 绝不向客户端发送 null 载荷
    pub fn new_notification(payload: &NotificationPayload) -> Result<Self> {
        Ok(Self {
            message_type: LiveMessageType::NewNotification,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// 完整的帖子载荷，关注者无需回查接口即可渲染
    pub fn new_post(post: &Post) -> Self {
        Self {
            message_type: LiveMessageType::NewPost,
            payload: json!({
                "id": post.id,
                "author": post.author,
                "content": post.content,
                "slug": post.slug,
            }),
        }
    }

    pub fn post_deleted(post_id: i64) -> Self {
        Self {
            message_type: LiveMessageType::PostDeleted,
            payload: json!({ "post_id": post_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::NewNotification;

    fn notification(
        notification_type: NotificationType,
        verb: &str,
        action: RelatedObject,
        target: Option<RelatedObject>,
    ) -> Notification {
        Notification::from_new(
            NewNotification {
                recipient_id: 1,
                actor: User::new(2, "alice"),
                verb: verb.to_string(),
                notification_type,
                action,
                target,
            },
            10,
            Utc::now(),
        )
    }

    fn post_with_content(content: &str) -> Post {
        Post {
            id: 7,
            author: User::new(1, "bob"),
            content: content.to_string(),
            slug: Some("a-post".to_string()),
        }
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::User(42).name(), "user:42");
        assert_eq!(Topic::Global.name(), "global");
    }

    #[test]
    fn test_snippet_for_comment_uses_action_object() {
        let post = post_with_content("original post");
        let comment = Comment {
            id: 3,
            author: User::new(2, "alice"),
            content: "nice work".to_string(),
            parent: None,
        };
        let n = notification(
            NotificationType::Comment,
            "commented on your post",
            RelatedObject::from_comment(&comment, &post),
            Some(RelatedObject::from_comment(&comment, &post)),
        );
        assert_eq!(context_snippet(&n), Some("\"nice work\"".to_string()));
    }

    #[test]
    fn test_snippet_for_like_uses_target() {
        let post = post_with_content("liked content");
        let like = Like {
            id: 5,
            user: User::new(2, "alice"),
            target: LikedObject::Post(post.clone()),
        };
        let n = notification(
            NotificationType::Like,
            "liked your post",
            RelatedObject::from_like(&like),
            Some(RelatedObject::from_post(&post)),
        );
        assert_eq!(context_snippet(&n), Some("\"liked content\"".to_string()));
    }

    #[test]
    fn test_snippet_truncated_at_75_chars() {
        let long = "x".repeat(90);
        let post = post_with_content(&long);
        let comment = Comment {
            id: 3,
            author: User::new(2, "alice"),
            content: long.clone(),
            parent: None,
        };
        let n = notification(
            NotificationType::Mention,
            "mentioned you in a comment",
            RelatedObject::from_comment(&comment, &post),
            Some(RelatedObject::from_post(&post)),
        );
        let snippet = context_snippet(&n).unwrap();
        assert_eq!(snippet, format!("\"{}...\"", "x".repeat(75)));
    }

    #[test]
    fn test_snippet_none_for_follow() {
        let follow = Follow {
            id: 9,
            follower: User::new(2, "alice"),
            following: User::new(1, "bob"),
        };
        let n = notification(
            NotificationType::Follow,
            "started following you",
            RelatedObject::from_follow(&follow),
            None,
        );
        assert_eq!(context_snippet(&n), None);
    }

    #[test]
    fn test_snippet_none_when_content_missing() {
        let n = notification(
            NotificationType::Mention,
            "mentioned you in a post",
            RelatedObject::missing(ObjectKind::Post, 7),
            None,
        );
        assert_eq!(context_snippet(&n), None);
    }

    #[test]
    fn test_live_message_envelope() {
        let msg = LiveMessage::post_deleted(33);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "post_deleted");
        assert_eq!(value["payload"]["post_id"], 33);

        let msg = LiveMessage::new_post(&post_with_content("fresh off the press"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "new_post");
        assert_eq!(value["payload"]["id"], 7);
        assert_eq!(value["payload"]["content"], "fresh off the press");
        assert_eq!(value["payload"]["author"]["username"], "bob");
        assert_eq!(value["payload"]["slug"], "a-post");
    }

    #[test]
    fn test_new_notification_envelope_carries_full_payload() {
        let follow = Follow {
            id: 9,
            follower: User::new(2, "alice"),
            following: User::new(1, "bob"),
        };
        let n = notification(
            NotificationType::Follow,
            "started following you",
            RelatedObject::from_follow(&follow),
            None,
        );

        let msg = LiveMessage::new_notification(&NotificationPayload::from(&n)).unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "new_notification");
        assert_eq!(value["payload"]["verb"], "started following you");
        assert_eq!(value["payload"]["actor"]["username"], "alice");
        assert!(!value["payload"].is_null());
    }

    #[test]
    fn test_related_object_wire_shape_skips_content() {
        let post = post_with_content("hello world");
        let value = serde_json::to_value(RelatedObject::from_post(&post)).unwrap();
        assert_eq!(value["type"], "post");
        assert_eq!(value["id"], 7);
        assert_eq!(value["object_id"], 7);
        assert_eq!(value["slug"], "a-post");
        assert!(value.get("content").is_none());
    }

    #[test]
    fn test_comment_related_object_points_at_owning_post() {
        let post = post_with_content("parent post");
        let comment = Comment {
            id: 21,
            author: User::new(2, "alice"),
            content: "hi".to_string(),
            parent: None,
        };
        let related = RelatedObject::from_comment(&comment, &post);
        assert_eq!(related.id, 21);
        assert_eq!(related.object_id, 7);
    }
}

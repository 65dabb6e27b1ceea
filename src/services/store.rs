use crate::{
    error::Result,
    models::{
        notification::{NewNotification, Notification, NotificationType, ObjectKind},
        realtime::{display_text, RelatedObject},
        user::User,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;

/// 通知存储的抽象
///
/// 工厂和路由层只依赖这个 trait，生产环境走 Postgres，
/// 测试走内存实现。所有写入都在调用返回前落库。
#[async_trait]
pub trait Store: Send + Sync {
    /// 插入一条通知，带去重
    ///
    /// 去重键为 (recipient, actor, action_kind, action_id)；
    /// 已存在时返回 None，不报错。只有返回 Some 的记录才会被推送。
    async fn insert_notification(&self, new: NewNotification) -> Result<Option<Notification>>;

    /// 按用户名批量解析用户，未知用户名静默丢弃
    async fn resolve_usernames(&self, handles: &HashSet<String>) -> Result<Vec<User>>;

    /// 不透明令牌换用户，未知令牌返回 None
    async fn user_by_token(&self, token: &str) -> Result<Option<User>>;

    /// 某个用户收到的通知，按时间倒序
    async fn list_notifications(&self, recipient_id: i64, limit: i64) -> Result<Vec<Notification>>;

    async fn unread_count(&self, recipient_id: i64) -> Result<i64>;

    /// 标记单条已读，幂等；记录不属于该用户时返回 false
    async fn mark_read(&self, recipient_id: i64, notification_id: i64) -> Result<bool>;

    /// 全部标记已读，返回改动条数
    async fn mark_all_read(&self, recipient_id: i64) -> Result<u64>;
}

/// Postgres 实现
///
/// notifications 表归本服务所有（见 migrations/），其余表
/// （users、auth_tokens、posts、comments、likes、groups 等）
/// 归上游业务层所有，这里只读。
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    recipient_id: i64,
    verb: String,
    notification_type: String,
    action_kind: String,
    action_id: i64,
    target_kind: Option<String>,
    target_id: Option<i64>,
    created_at: DateTime<Utc>,
    is_read: bool,
    actor_id: i64,
    username: String,
    first_name: String,
    last_name: String,
    picture: Option<String>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 多态引用解析：kind -> 对应表的查询
    /// 对象已被删除时返回 None，由调用方降级为占位摘要
    async fn resolve_reference(
        &self,
        kind: ObjectKind,
        id: i64,
    ) -> Result<Option<RelatedObject>> {
        let related = match kind {
            ObjectKind::Post => {
                sqlx::query_as::<_, (String, Option<String>)>(
                    "SELECT content, slug FROM posts WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(|(content, slug)| RelatedObject {
                    kind,
                    id,
                    display_text: display_text(&content),
                    object_id: id,
                    slug,
                    content: Some(content),
                })
            }
            ObjectKind::Comment => {
                sqlx::query_as::<_, (String, i64)>(
                    "SELECT content, post_id FROM comments WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(|(content, post_id)| RelatedObject {
                    kind,
                    id,
                    display_text: display_text(&content),
                    object_id: post_id,
                    slug: None,
                    content: Some(content),
                })
            }
            ObjectKind::Like => {
                sqlx::query_as::<_, (String, i64)>(
                    r#"
                        SELECT u.username, l.post_id
                        FROM likes l
                        JOIN users u ON u.id = l.user_id
                        WHERE l.id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(|(username, post_id)| RelatedObject {
                    kind,
                    id,
                    display_text: format!("like by {}", username),
                    object_id: post_id,
                    slug: None,
                    content: None,
                })
            }
            ObjectKind::Follow => {
                sqlx::query_as::<_, (i64,)>("SELECT id FROM follows WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(|_| RelatedObject {
                        kind,
                        id,
                        display_text: "follow".to_string(),
                        object_id: id,
                        slug: None,
                        content: None,
                    })
            }
            ObjectKind::Group => {
                sqlx::query_as::<_, (String, Option<String>)>(
                    "SELECT name, slug FROM groups WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(|(name, slug)| RelatedObject {
                    kind,
                    id,
                    display_text: name,
                    object_id: id,
                    slug,
                    content: None,
                })
            }
            ObjectKind::JoinRequest => {
                sqlx::query_as::<_, (i64, String)>(
                    r#"
                        SELECT r.group_id, u.username
                        FROM group_join_requests r
                        JOIN users u ON u.id = r.user_id
                        WHERE r.id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(|(group_id, username)| RelatedObject {
                    kind,
                    id,
                    display_text: format!("join request from {}", username),
                    object_id: group_id,
                    slug: None,
                    content: None,
                })
            }
        };

        Ok(related)
    }

    async fn row_to_notification(&self, row: NotificationRow) -> Result<Notification> {
        let notification_type = NotificationType::from_str(&row.notification_type)?;
        let action_kind = ObjectKind::from_str(&row.action_kind)?;

        let action = self
            .resolve_reference(action_kind, row.action_id)
            .await?
            .unwrap_or_else(|| RelatedObject::missing(action_kind, row.action_id));

        let target = match (row.target_kind.as_deref(), row.target_id) {
            (Some(kind), Some(id)) => {
                let kind = ObjectKind::from_str(kind)?;
                Some(
                    self.resolve_reference(kind, id)
                        .await?
                        .unwrap_or_else(|| RelatedObject::missing(kind, id)),
                )
            }
            _ => None,
        };

        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            actor: User {
                id: row.actor_id,
                username: row.username,
                first_name: row.first_name,
                last_name: row.last_name,
                picture: row.picture,
            },
            verb: row.verb,
            notification_type,
            action,
            target,
            created_at: row.created_at,
            is_read: row.is_read,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_notification(&self, new: NewNotification) -> Result<Option<Notification>> {
        // 唯一索引 + ON CONFLICT DO NOTHING 是去重的唯一权威，
        // 没有插入前的存在性检查，因此并发触发也只会落一条
        let inserted = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            r#"
                INSERT INTO notifications
                    (recipient_id, actor_id, verb, notification_type,
                     action_kind, action_id, target_kind, target_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (recipient_id, actor_id, action_kind, action_id) DO NOTHING
                RETURNING id, created_at
            "#,
        )
        .bind(new.recipient_id)
        .bind(new.actor.id)
        .bind(&new.verb)
        .bind(new.notification_type.as_str())
        .bind(new.action.kind.as_str())
        .bind(new.action.id)
        .bind(new.target.as_ref().map(|t| t.kind.as_str()))
        .bind(new.target.as_ref().map(|t| t.id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.map(|(id, created_at)| Notification::from_new(new, id, created_at)))
    }

    async fn resolve_usernames(&self, handles: &HashSet<String>) -> Result<Vec<User>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let handles: Vec<String> = handles.iter().cloned().collect();
        let users = sqlx::query_as::<_, User>(
            r#"
                SELECT id, username, first_name, last_name, picture
                FROM users
                WHERE username = ANY($1)
            "#,
        )
        .bind(&handles)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn user_by_token(&self, token: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
                SELECT u.id, u.username, u.first_name, u.last_name, u.picture
                FROM auth_tokens t
                JOIN users u ON u.id = t.user_id
                WHERE t.key = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn list_notifications(&self, recipient_id: i64, limit: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
                SELECT n.id, n.recipient_id, n.verb, n.notification_type,
                       n.action_kind, n.action_id, n.target_kind, n.target_id,
                       n.created_at, n.is_read,
                       u.id AS actor_id, u.username, u.first_name, u.last_name, u.picture
                FROM notifications n
                JOIN users u ON u.id = n.actor_id
                WHERE n.recipient_id = $1
                ORDER BY n.created_at DESC, n.id DESC
                LIMIT $2
            "#,
        )
        .bind(recipient_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut notifications = Vec::with_capacity(rows.len());
        for row in rows {
            notifications.push(self.row_to_notification(row).await?);
        }
        Ok(notifications)
    }

    async fn unread_count(&self, recipient_id: i64) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_read(&self, recipient_id: i64, notification_id: i64) -> Result<bool> {
        let updated = sqlx::query_as::<_, (i64,)>(
            r#"
                UPDATE notifications SET is_read = TRUE
                WHERE id = $1 AND recipient_id = $2
                RETURNING id
            "#,
        )
        .bind(notification_id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated.is_some())
    }

    async fn mark_all_read(&self, recipient_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

use crate::{
    error::Result,
    models::{
        content::{Comment, Follow, GroupJoinRequest, Like, LikedObject, Post},
        notification::{NewNotification, NotificationType},
        realtime::{LiveMessage, NotificationPayload, RelatedObject},
        user::User,
    },
    services::{realtime::EventRouter, store::Store},
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// 通知工厂
///
/// 把已提交的领域事件转换为零或多条通知记录的唯一入口，
/// 统一处理去重和自我通知抑制。每个事件种类一个显式入口，
/// 由上游业务层在对应的变更提交之后调用。
///
/// 先落库后推送：只有插入成功（非重复）的记录才会交给
/// 事件路由器，推送永远不在存储事务内部。
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn Store>,
    router: Arc<EventRouter>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>, router: Arc<EventRouter>) -> Self {
        Self { store, router }
    }

    /// 点赞已创建
    /// 接收者为被赞对象的作者，自赞不通知
    pub async fn like_created(&self, like: &Like) -> Result<()> {
        let (recipient, verb, target) = match &like.target {
            LikedObject::Post(post) => (
                post.author.clone(),
                "liked your post",
                RelatedObject::from_post(post),
            ),
            LikedObject::Comment { comment, post } => (
                comment.author.clone(),
                if comment.is_reply() {
                    "liked your reply"
                } else {
                    "liked your comment"
                },
                RelatedObject::from_comment(comment, post),
            ),
        };

        if recipient.id == like.user.id {
            debug!("Suppressed self-like notification for user {}", recipient.id);
            return Ok(());
        }

        self.deliver(NewNotification {
            recipient_id: recipient.id,
            actor: like.user.clone(),
            verb: verb.to_string(),
            notification_type: NotificationType::Like,
            action: RelatedObject::from_like(like),
            target: Some(target),
        })
        .await
    }

    /// 关注已创建
    /// 自我关注应当在上游就被拒绝，这里再拦一道
    pub async fn follow_created(&self, follow: &Follow) -> Result<()> {
        if follow.following.id == follow.follower.id {
            debug!("Suppressed self-follow notification for user {}", follow.follower.id);
            return Ok(());
        }

        self.deliver(NewNotification {
            recipient_id: follow.following.id,
            actor: follow.follower.clone(),
            verb: "started following you".to_string(),
            notification_type: NotificationType::Follow,
            action: RelatedObject::from_follow(follow),
            target: None,
        })
        .await
    }

    /// 评论或回复已创建
    ///
    /// 有父评论则通知父评论作者（回复），否则通知帖子作者（评论）。
    /// 正文中的 @提及 额外产生提及通知，但排除作者本人和
    /// 已经收到评论/回复通知的主接收者，避免同一事件重复打扰。
    pub async fn comment_created(&self, comment: &Comment, post: &Post) -> Result<()> {
        let (recipient, verb, notification_type) = match &comment.parent {
            Some(parent) => (
                parent.author.clone(),
                "replied to your comment",
                NotificationType::Reply,
            ),
            None => (
                post.author.clone(),
                "commented on your post",
                NotificationType::Comment,
            ),
        };

        let primary_recipient_id = recipient.id;
        let action = RelatedObject::from_comment(comment, post);

        if recipient.id != comment.author.id {
            self.deliver(NewNotification {
                recipient_id: recipient.id,
                actor: comment.author.clone(),
                verb: verb.to_string(),
                notification_type,
                action: action.clone(),
                target: Some(action.clone()),
            })
            .await?;
        } else {
            debug!("Suppressed self-comment notification for user {}", recipient.id);
        }

        let mention_verb = if comment.is_reply() {
            "mentioned you in a reply"
        } else {
            "mentioned you in a comment"
        };

        // 提及通知的 target 永远是所属帖子，便于前端给出帖子级上下文
        self.mention_notifications(
            &comment.author,
            &comment.content,
            mention_verb,
            action,
            RelatedObject::from_post(post),
            &[primary_recipient_id],
        )
        .await
    }

    /// 帖子已创建
    ///
    /// 给每个关注者的私有主题推送一条带完整帖子的 new_post，
    /// 正文中的 @提及 产生提及通知。关注者集合在发布时刻
    /// 已经是有界的已知集合，由上游一并传入。
    pub async fn post_created(&self, post: &Post, follower_ids: &[i64]) -> Result<()> {
        let delivered = self
            .router
            .fan_out(follower_ids, &LiveMessage::new_post(post));
        info!(
            "Live post {} announced to {} follower sessions",
            post.id, delivered
        );

        let action = RelatedObject::from_post(post);
        self.mention_notifications(
            &post.author,
            &post.content,
            "mentioned you in a post",
            action.clone(),
            action,
            &[],
        )
        .await
    }

    /// 帖子已删除
    /// 推送给作者和所有关注者各自的私有主题，保证界面一致性
    pub async fn post_deleted(
        &self,
        post_id: i64,
        author_id: i64,
        follower_ids: &[i64],
    ) -> Result<()> {
        let mut recipients: Vec<i64> = follower_ids.to_vec();
        recipients.push(author_id);

        let delivered = self
            .router
            .fan_out(&recipients, &LiveMessage::post_deleted(post_id));
        info!(
            "Post {} deletion announced to {} sessions across {} users",
            post_id,
            delivered,
            recipients.len()
        );
        Ok(())
    }

    /// 加入申请已创建（或从拒绝/通过回到待定）
    /// 接收者为小组创建者；创建者自己的申请不通知
    pub async fn join_request_pending(&self, request: &GroupJoinRequest) -> Result<()> {
        if request.user.id == request.group.creator.id {
            debug!("Suppressed join request notification for group owner {}", request.user.id);
            return Ok(());
        }

        self.deliver(NewNotification {
            recipient_id: request.group.creator.id,
            actor: request.user.clone(),
            verb: "sent a request to join".to_string(),
            notification_type: NotificationType::GroupJoinRequest,
            action: RelatedObject::from_join_request(request),
            target: Some(RelatedObject::from_group(&request.group)),
        })
        .await
    }

    /// 加入申请已通过
    /// 接收者为申请人，动作方为小组创建者
    pub async fn join_request_approved(&self, request: &GroupJoinRequest) -> Result<()> {
        if request.user.id == request.group.creator.id {
            return Ok(());
        }

        self.deliver(NewNotification {
            recipient_id: request.user.id,
            actor: request.group.creator.clone(),
            verb: "approved your request to join the group".to_string(),
            notification_type: NotificationType::GroupJoinApproved,
            action: RelatedObject::from_join_request(request),
            target: Some(RelatedObject::from_group(&request.group)),
        })
        .await
    }

    /// 解析正文中的提及并为每个解析成功的用户投递提及通知
    /// 排除动作方本人和 excluded 里的用户；未知用户名静默丢弃
    async fn mention_notifications(
        &self,
        actor: &User,
        text: &str,
        verb: &str,
        action: RelatedObject,
        target: RelatedObject,
        excluded: &[i64],
    ) -> Result<()> {
        let handles = crate::utils::mentions::extract_mentions(text);
        if handles.is_empty() {
            return Ok(());
        }

        let mentioned = self.store.resolve_usernames(&handles).await?;
        for user in mentioned {
            if user.id == actor.id || excluded.contains(&user.id) {
                continue;
            }

            self.deliver(NewNotification {
                recipient_id: user.id,
                actor: actor.clone(),
                verb: verb.to_string(),
                notification_type: NotificationType::Mention,
                action: action.clone(),
                target: Some(target.clone()),
            })
            .await?;
        }

        Ok(())
    }

    /// 落库然后推送
    /// 重复事件（去重键已存在）既不落库也不推送
    async fn deliver(&self, new: NewNotification) -> Result<()> {
        match self.store.insert_notification(new).await? {
            Some(notification) => {
                info!(
                    "Notification ({}) created for user {}",
                    notification.notification_type.as_str(),
                    notification.recipient_id
                );

                let payload = NotificationPayload::from(&notification);
                match LiveMessage::new_notification(&payload) {
                    Ok(message) => {
                        let delivered = self
                            .router
                            .publish_to_user(notification.recipient_id, &message);
                        debug!(
                            "Notification {} pushed to {} live sessions",
                            notification.id, delivered
                        );
                    }
                    // 记录已经落库，客户端下次拉取列表时会补齐
                    Err(e) => error!(
                        "Failed to serialize payload for notification {}: {}",
                        notification.id, e
                    ),
                }
            }
            None => {
                debug!("Duplicate notification suppressed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::CommentRef;
    use crate::services::store::memory::MemoryStore;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct Fixture {
        store: Arc<MemoryStore>,
        router: Arc<EventRouter>,
        service: NotificationService,
    }

    fn fixture_with_users(users: Vec<User>) -> Fixture {
        let store = Arc::new(MemoryStore::with_users(users));
        let router = Arc::new(EventRouter::new());
        let service = NotificationService::new(store.clone(), router.clone());
        Fixture {
            store,
            router,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_users(vec![
            User::new(1, "alice"),
            User::new(2, "bob"),
            User::new(3, "carol"),
        ])
    }

    fn subscribe(fixture: &Fixture, user_id: i64) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        fixture
            .router
            .join(&format!("user:{}", user_id), &format!("sess_{}", user_id), tx);
        rx
    }

    fn post_by(author: User, content: &str) -> Post {
        Post {
            id: 100,
            author,
            content: content.to_string(),
            slug: None,
        }
    }

    fn comment_by(author: User, content: &str, parent: Option<CommentRef>) -> Comment {
        Comment {
            id: 200,
            author,
            content: content.to_string(),
            parent,
        }
    }

    #[tokio::test]
    async fn test_liking_own_post_creates_nothing() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let like = Like {
            id: 1,
            user: alice.clone(),
            target: LikedObject::Post(post_by(alice, "my own post")),
        };

        f.service.like_created(&like).await.unwrap();
        assert_eq!(f.store.notification_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_like_event_yields_one_notification() {
        let f = fixture();
        let like = Like {
            id: 1,
            user: User::new(1, "alice"),
            target: LikedObject::Post(post_by(User::new(2, "bob"), "a post")),
        };

        f.service.like_created(&like).await.unwrap();
        f.service.like_created(&like).await.unwrap();
        assert_eq!(f.store.notification_count(), 1);
    }

    #[tokio::test]
    async fn test_like_verbs_for_post_comment_and_reply() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let bob = User::new(2, "bob");
        let post = post_by(bob.clone(), "a post");

        let like_post = Like {
            id: 1,
            user: alice.clone(),
            target: LikedObject::Post(post.clone()),
        };
        f.service.like_created(&like_post).await.unwrap();
        assert_eq!(f.store.last_notification().unwrap().verb, "liked your post");

        let like_comment = Like {
            id: 2,
            user: alice.clone(),
            target: LikedObject::Comment {
                comment: comment_by(bob.clone(), "a comment", None),
                post: post.clone(),
            },
        };
        f.service.like_created(&like_comment).await.unwrap();
        assert_eq!(f.store.last_notification().unwrap().verb, "liked your comment");

        let like_reply = Like {
            id: 3,
            user: alice,
            target: LikedObject::Comment {
                comment: comment_by(
                    bob,
                    "a reply",
                    Some(CommentRef {
                        id: 9,
                        author: User::new(3, "carol"),
                    }),
                ),
                post,
            },
        };
        f.service.like_created(&like_reply).await.unwrap();
        let n = f.store.last_notification().unwrap();
        assert_eq!(n.verb, "liked your reply");
        assert_eq!(n.notification_type, NotificationType::Like);
    }

    #[tokio::test]
    async fn test_comment_notifies_post_author_and_reply_notifies_parent_author() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let bob = User::new(2, "bob");
        let carol = User::new(3, "carol");
        let post = post_by(bob.clone(), "bob's post");

        let comment = comment_by(alice.clone(), "top level", None);
        f.service.comment_created(&comment, &post).await.unwrap();
        let n = f.store.last_notification().unwrap();
        assert_eq!(n.recipient_id, bob.id);
        assert_eq!(n.verb, "commented on your post");
        assert_eq!(n.notification_type, NotificationType::Comment);

        let reply = Comment {
            id: 201,
            author: alice,
            content: "a reply".to_string(),
            parent: Some(CommentRef {
                id: 200,
                author: carol.clone(),
            }),
        };
        f.service.comment_created(&reply, &post).await.unwrap();
        let n = f.store.last_notification().unwrap();
        assert_eq!(n.recipient_id, carol.id);
        assert_eq!(n.verb, "replied to your comment");
        assert_eq!(n.notification_type, NotificationType::Reply);
    }

    #[tokio::test]
    async fn test_replying_to_own_comment_creates_nothing() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let post = post_by(User::new(2, "bob"), "a post");
        let reply = comment_by(
            alice.clone(),
            "replying to myself",
            Some(CommentRef {
                id: 5,
                author: alice,
            }),
        );

        f.service.comment_created(&reply, &post).await.unwrap();
        assert_eq!(f.store.notification_count(), 0);
    }

    #[tokio::test]
    async fn test_post_mention_notifies_mentioned_user_with_post_target() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let post = post_by(alice, "hey @bob check this out");

        f.service.post_created(&post, &[]).await.unwrap();

        assert_eq!(f.store.notification_count(), 1);
        let n = f.store.last_notification().unwrap();
        assert_eq!(n.recipient_id, 2);
        assert_eq!(n.verb, "mentioned you in a post");
        assert_eq!(n.notification_type, NotificationType::Mention);
        let target = n.target.unwrap();
        assert_eq!(target.kind.as_str(), "post");
        assert_eq!(target.id, post.id);
    }

    #[tokio::test]
    async fn test_self_mention_and_unknown_handle_are_dropped() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let post = post_by(alice, "@alice and @nobody-here");

        f.service.post_created(&post, &[]).await.unwrap();
        assert_eq!(f.store.notification_count(), 0);
    }

    #[tokio::test]
    async fn test_mentioned_primary_recipient_is_not_double_notified() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let bob = User::new(2, "bob");
        let post = post_by(bob, "bob's post");

        // bob 已经收到评论通知，正文里的 @bob 不再额外产生提及
        let comment = comment_by(alice, "nice one @bob, also cc @carol", None);
        f.service.comment_created(&comment, &post).await.unwrap();

        assert_eq!(f.store.notification_count(), 2);
        let notifications = f.store.list_notifications(2, 50).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_type, NotificationType::Comment);

        let carol_notifications = f.store.list_notifications(3, 50).await.unwrap();
        assert_eq!(carol_notifications.len(), 1);
        assert_eq!(carol_notifications[0].verb, "mentioned you in a comment");
    }

    #[tokio::test]
    async fn test_reply_mention_verb_and_comment_mention_dedup_key() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let bob = User::new(2, "bob");
        let post = post_by(bob.clone(), "a post");
        let reply = Comment {
            id: 300,
            author: alice,
            content: "@carol look".to_string(),
            parent: Some(CommentRef { id: 200, author: bob }),
        };

        f.service.comment_created(&reply, &post).await.unwrap();

        let carol_notifications = f.store.list_notifications(3, 50).await.unwrap();
        assert_eq!(carol_notifications.len(), 1);
        assert_eq!(carol_notifications[0].verb, "mentioned you in a reply");
        // 提及的 target 是所属帖子而不是回复本身
        assert_eq!(carol_notifications[0].target.as_ref().unwrap().id, post.id);
    }

    #[tokio::test]
    async fn test_follow_pushes_live_notification_to_recipient_topic() {
        let f = fixture();
        let mut rx = subscribe(&f, 2);

        let follow = Follow {
            id: 7,
            follower: User::new(1, "alice"),
            following: User::new(2, "bob"),
        };
        f.service.follow_created(&follow).await.unwrap();

        let text = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "new_notification");
        assert_eq!(value["payload"]["verb"], "started following you");
        assert_eq!(value["payload"]["actor"]["username"], "alice");
        assert_eq!(value["payload"]["context_snippet"], serde_json::Value::Null);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_self_follow_creates_nothing() {
        let f = fixture();
        let alice = User::new(1, "alice");
        let follow = Follow {
            id: 7,
            follower: alice.clone(),
            following: alice,
        };
        f.service.follow_created(&follow).await.unwrap();
        assert_eq!(f.store.notification_count(), 0);
    }

    #[tokio::test]
    async fn test_comment_push_carries_context_snippet() {
        let f = fixture();
        let mut rx = subscribe(&f, 2);
        let post = post_by(User::new(2, "bob"), "a post");
        let comment = comment_by(User::new(1, "alice"), "what a great idea", None);

        f.service.comment_created(&comment, &post).await.unwrap();

        let text = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["payload"]["context_snippet"], "\"what a great idea\"");
        assert_eq!(value["payload"]["notification_type"], "comment");
    }

    #[tokio::test]
    async fn test_post_deleted_reaches_author_and_each_follower_once() {
        let f = fixture();
        let mut rx_author = subscribe(&f, 1);
        let mut rx_f1 = subscribe(&f, 2);
        let mut rx_f2 = subscribe(&f, 3);

        f.service.post_deleted(55, 1, &[2, 3]).await.unwrap();

        for rx in [&mut rx_author, &mut rx_f1, &mut rx_f2] {
            let text = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "post_deleted");
            assert_eq!(value["payload"]["post_id"], 55);
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_new_post_fan_out_skips_offline_followers() {
        let f = fixture();
        let mut rx_online = subscribe(&f, 2);
        let post = post_by(User::new(1, "alice"), "no mentions");

        f.service.post_created(&post, &[2, 3]).await.unwrap();

        let text = rx_online.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "new_post");
        assert_eq!(value["payload"]["id"], post.id);
        assert_eq!(value["payload"]["content"], "no mentions");
        assert_eq!(value["payload"]["author"]["username"], "alice");
    }

    fn join_request(requester: User, creator: User) -> GroupJoinRequest {
        GroupJoinRequest {
            id: 11,
            group: crate::models::content::Group {
                id: 77,
                name: "rustaceans".to_string(),
                creator,
                slug: Some("rustaceans".to_string()),
            },
            user: requester,
        }
    }

    #[tokio::test]
    async fn test_join_request_notifies_group_creator() {
        let f = fixture();
        let request = join_request(User::new(1, "alice"), User::new(2, "bob"));

        f.service.join_request_pending(&request).await.unwrap();

        let n = f.store.last_notification().unwrap();
        assert_eq!(n.recipient_id, 2);
        assert_eq!(n.verb, "sent a request to join");
        assert_eq!(n.notification_type, NotificationType::GroupJoinRequest);
        assert_eq!(n.target.as_ref().unwrap().kind.as_str(), "group");

        // 同一申请回到待定状态不会重复通知
        f.service.join_request_pending(&request).await.unwrap();
        assert_eq!(f.store.notification_count(), 1);
    }

    #[tokio::test]
    async fn test_join_request_by_owner_creates_nothing() {
        let f = fixture();
        let owner = User::new(2, "bob");
        let request = join_request(owner.clone(), owner);

        f.service.join_request_pending(&request).await.unwrap();
        assert_eq!(f.store.notification_count(), 0);
    }

    #[tokio::test]
    async fn test_join_request_approval_notifies_requester() {
        let f = fixture();
        let request = join_request(User::new(1, "alice"), User::new(2, "bob"));

        f.service.join_request_approved(&request).await.unwrap();

        let n = f.store.last_notification().unwrap();
        assert_eq!(n.recipient_id, 1);
        assert_eq!(n.actor.id, 2);
        assert_eq!(n.verb, "approved your request to join the group");
        assert_eq!(n.notification_type, NotificationType::GroupJoinApproved);
    }
}

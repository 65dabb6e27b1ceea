use crate::models::user::User;
use serde::{Deserialize, Serialize};

/// 上游业务层传入的领域对象
/// 所有实例在进入本服务之前都已经提交到数据库

/// 动态帖子
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author: User,
    pub content: String,
    pub slug: Option<String>,
}

/// 父评论的轻量引用，只保留路由通知所需的字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRef {
    pub id: i64,
    pub author: User,
}

/// 评论或回复，parent 存在时为回复
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author: User,
    pub content: String,
    pub parent: Option<CommentRef>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent.is_some()
    }
}

/// 被点赞的对象：帖子或评论（评论附带其所属帖子）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LikedObject {
    Post(Post),
    Comment { comment: Comment, post: Post },
}

/// 点赞事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: i64,
    pub user: User,
    pub target: LikedObject,
}

/// 关注关系
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub id: i64,
    pub follower: User,
    pub following: User,
}

/// 小组
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub creator: User,
    pub slug: Option<String>,
}

/// 小组加入申请
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupJoinRequest {
    pub id: i64,
    pub group: Group,
    pub user: User,
}

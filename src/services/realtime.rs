use crate::models::realtime::{LiveMessage, Topic};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// 会话的出站队列发送端，消息为已序列化的 JSON 文本
pub type SessionSender = mpsc::UnboundedSender<String>;

/// 事件路由器（发布/订阅层)
///
/// 维护 主题 -> {会话 -> 发送端} 的注册表，把生产者
/// （通知工厂、帖子删除处理）和消费者（在线连接）解耦。
/// 没有订阅者的发布直接丢弃：实时通道只是尽力而为的加速器，
/// 权威数据始终以通知列表接口为准。
pub struct EventRouter {
    topics: RwLock<HashMap<String, HashMap<String, SessionSender>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// 订阅主题，重复订阅只会覆盖发送端
    pub fn join(&self, topic: &str, session_id: &str, sender: SessionSender) {
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(HashMap::new)
            .insert(session_id.to_string(), sender);
        debug!("Session {} joined topic: {}", session_id, topic);
    }

    /// 退订主题，幂等：从未订阅过也可以安全调用
    pub fn leave(&self, topic: &str, session_id: &str) {
        let mut topics = self.topics.write();
        if let Some(subscribers) = topics.get_mut(topic) {
            subscribers.remove(session_id);
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
        debug!("Session {} left topic: {}", session_id, topic);
    }

    /// 发布消息到主题，返回成功投递的订阅者数量
    ///
    /// 在读锁下快照订阅者集合，锁外逐个发送，
    /// 并发的退订最多导致漏发给正在离开的会话。
    /// 单个订阅者发送失败只影响它自己，不会传播给生产者。
    pub fn publish(&self, topic: &str, message: &LiveMessage) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize live message: {}", e);
                return 0;
            }
        };

        let subscribers: Vec<(String, SessionSender)> = {
            let topics = self.topics.read();
            match topics.get(topic) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|(id, tx)| (id.clone(), tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (session_id, tx) in subscribers {
            if tx.send(text.clone()).is_err() {
                // 会话已经在断开路径上，忽略即可
                warn!("Dropped delivery to closed session {} on {}", session_id, topic);
            } else {
                delivered += 1;
            }
        }

        debug!("Published to topic {} ({} delivered)", topic, delivered);
        delivered
    }

    /// 发布到某个用户的私有主题
    pub fn publish_to_user(&self, user_id: i64, message: &LiveMessage) -> usize {
        self.publish(&Topic::User(user_id).name(), message)
    }

    /// 逐个发布到一组用户的私有主题
    /// （关注者在发布时刻是有界的已知集合，不走广播主题）
    pub fn fan_out(&self, user_ids: &[i64], message: &LiveMessage) -> usize {
        user_ids
            .iter()
            .map(|id| self.publish_to_user(*id, message))
            .sum()
    }

    /// 主题当前的订阅者数量
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

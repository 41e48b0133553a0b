// 图书变更事件
// 写接口成功后广播，实时看板的 WebSocket 连接订阅

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::Book;

// 慢订阅者落后超过这个数量会丢掉旧事件
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BookEvent {
    /// 连接建立时发送的当前全量数据
    Init { books: Vec<Book> },
    Added { book: Book },
    Updated { book: Book },
    Deleted { id: i64 },
}

#[derive(Clone)]
pub struct BookEvents {
    sender: broadcast::Sender<BookEvent>,
}

impl BookEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    /// 返回收到事件的订阅者数量，没有订阅者时为 0
    pub fn publish(&self, event: BookEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BookEvents {
    fn default() -> Self {
        Self::new()
    }
}

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    AppState,
    events::{BookEvent, BookEvents},
    store::BookStore,
};

/// 实时图书看板
///
/// 连接后先收到 `init` 全量数据，之后推送 `added` / `updated` / `deleted`。
/// 看板只读，修改走需要认证的 REST 接口。
pub async fn board(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = serve_board(socket, state.books.as_ref(), &state.events).await {
            tracing::debug!("Board connection closed with error: {}", e);
        }
    })
}

async fn snapshot(store: &dyn BookStore) -> Result<Message, axum::Error> {
    let books = store.all().await.map_err(axum::Error::new)?;
    encode(&BookEvent::Init { books })
}

fn encode(event: &BookEvent) -> Result<Message, axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    Ok(Message::Text(text.into()))
}

async fn serve_board(
    socket: WebSocket,
    store: &dyn BookStore,
    events: &BookEvents,
) -> Result<(), axum::Error> {
    // 先订阅再取快照，两者之间的变更不会丢
    let mut rx = events.subscribe();
    let (mut sink, mut stream) = socket.split();
    sink.send(snapshot(store).await?).await?;
    tracing::debug!("Board client connected, {} watching", events.subscriber_count());

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => sink.send(encode(&event)?).await?,
                // 落后太多时重新发一次全量
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Board client lagged by {} events, resending snapshot", skipped);
                    sink.send(snapshot(store).await?).await?;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            },
        }
    }

    Ok(())
}

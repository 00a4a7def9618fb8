//! Sends one stroke to a running relay, asks for its frame back and prints
//! the broadcast.
//!
//! `cargo run --example client -- ws://127.0.0.1:4321`

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tungstenite::Message;
use url::Url;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let target = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:4321".into());
    let url = Url::parse(&target)?;
    let (mut ws_stream, _) = connect_async(url).await?;

    let stroke = json!({
        "event": "clientStrokeToServer",
        "data": {"index": 0, "color": "#3366ff", "points": [[0, 0], [10, 10], [20, 5]]}
    });
    ws_stream.send(Message::Text(stroke.to_string())).await?;

    let request = json!({"event": "clientRequestFrame", "data": {"num": 0}});
    ws_stream.send(Message::Text(request.to_string())).await?;

    while let Some(msg) = ws_stream.next().await {
        if let Message::Text(text) = msg? {
            println!("{}", text);
            break;
        }
    }

    ws_stream.close(None).await?;
    Ok(())
}

use futures_util::{SinkExt, StreamExt};
use shared::{ClientMessage, PaddleSide, ServerMessage, UserInput};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Headless smoke test: connects, creates a tournament, prints what comes
/// back and wiggles the paddle if a match starts.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let token = std::env::args().nth(1).unwrap_or_else(|| "1:tester".to_string());
    let url = format!("ws://127.0.0.1:3000/?token={}", token);

    println!("Connecting to {}", url);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut source) = ws.split();
    println!("Connected");

    let create = ClientMessage::CreateTournament {
        name: "smoke test".to_string(),
    };
    sink.send(Message::Text(create.to_json()?)).await?;

    let mut playing = false;
    for i in 0..600 {
        let frame = match timeout(Duration::from_secs(1), source.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) => {
                println!("Server closed the connection");
                break;
            }
            Err(_) => continue,
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(frame) => {
                println!("Closed by server: {:?}", frame);
                break;
            }
            _ => continue,
        };

        match ServerMessage::from_json(&text) {
            Ok(ServerMessage::Game { data }) => {
                if !playing {
                    println!("Match is live");
                    playing = true;
                }
                println!(
                    "  ball=({:.1}, {:.1}) left={:.1} right={:.1} running={}",
                    data.ball.x,
                    data.ball.y,
                    data.paddle_left.y,
                    data.paddle_right.y,
                    data.is_running
                );
            }
            Ok(other) => println!("Received: {:?}", other),
            Err(e) => println!("Failed to parse {}: {}", text, e),
        }

        if playing && i % 20 == 0 {
            let cmd = if (i / 20) % 2 == 0 {
                UserInput::MoveUpStart
            } else {
                UserInput::MoveDownStart
            };
            let input = ClientMessage::Game {
                cmd,
                paddle: PaddleSide::Left,
            };
            sink.send(Message::Text(input.to_json()?)).await?;
        }
    }

    sink.close().await?;
    sleep(Duration::from_millis(100)).await;
    println!("Test client finished");
    Ok(())
}

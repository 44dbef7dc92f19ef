use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use easel_core::{ClientFrame, Color, Pixel, Position, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "easel")]
#[command(about = "Easel canvas sync server and debug client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poke a running server over its WebSocket endpoint
    Debug {
        /// Server URL (e.g., ws://localhost:4600)
        #[arg(short, long, default_value = "ws://localhost:4600")]
        url: String,

        /// Map identifier to operate on
        #[arg(short, long)]
        map: String,

        #[command(subcommand)]
        command: DebugCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum DebugCommands {
    /// Fetch and print the map's canvas
    Fetch,

    /// Place one pixel
    Put {
        x: i64,
        y: i64,
        #[arg(long, default_value_t = 1.0)]
        r: f64,
        #[arg(long, default_value_t = 1.0)]
        g: f64,
        #[arg(long, default_value_t = 1.0)]
        b: f64,
        #[arg(long, default_value_t = 1.0)]
        a: f64,
        #[arg(long, default_value = "easel-cli")]
        placed_by: String,
    },

    /// Remove the pixel at a position
    Erase {
        x: i64,
        y: i64,
        #[arg(long, default_value = "easel-cli")]
        placed_by: String,
    },
}

pub async fn run_debug_client(url: String, map: String, command: DebugCommands) -> Result<()> {
    let ws_url = format!("{}/ws", url.trim_end_matches('/'));
    debug!("connecting to {ws_url} for map {map}");

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&ws_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => return Err(anyhow!("connection to {ws_url} failed: {err}")),
        Err(_) => return Err(anyhow!("connection timeout - is the server running?")),
    };
    let (mut write, mut read) = ws_stream.split();

    let frame = match command {
        DebugCommands::Fetch => ClientFrame::RequestCanvasData {
            map_ident: map.clone(),
        },
        DebugCommands::Put {
            x,
            y,
            r,
            g,
            b,
            a,
            placed_by,
        } => ClientFrame::PixelUpdate {
            map_ident: map.clone(),
            pixel: pixel(x, y, Color { r, g, b, a }, placed_by, true),
        },
        DebugCommands::Erase { x, y, placed_by } => ClientFrame::PixelUpdate {
            map_ident: map.clone(),
            pixel: pixel(
                x,
                y,
                Color {
                    r: 0.0,
                    g: 0.0,
                    b: 0.0,
                    a: 0.0,
                },
                placed_by,
                false,
            ),
        },
    };

    write
        .send(Message::Text(serde_json::to_string(&frame)?.into()))
        .await?;

    let mut canvas = Vec::new();
    loop {
        let next = timeout(Duration::from_secs(10), read.next())
            .await
            .map_err(|_| anyhow!("timed out waiting for a response"))?;
        let Some(msg) = next else {
            return Err(anyhow!("server closed the connection"));
        };
        let Message::Text(text) = msg? else {
            continue;
        };
        let reply: ServerFrame = serde_json::from_str(&text)?;

        match reply {
            ServerFrame::CanvasData { pixels, .. } => {
                canvas = pixels;
                break;
            }
            ServerFrame::CanvasDataChunk {
                mut pixels,
                chunk_index,
                total_chunks,
                is_last_chunk,
                ..
            } => {
                debug!("chunk {}/{total_chunks}", chunk_index + 1);
                canvas.append(&mut pixels);
                if is_last_chunk {
                    break;
                }
            }
            ServerFrame::PixelUpdateAck { map_ident, pixel } => {
                println!(
                    "ack: ({}, {}) on {map_ident} ({})",
                    pixel.position.x,
                    pixel.position.y,
                    if pixel.is_active { "placed" } else { "erased" }
                );
                return Ok(());
            }
            ServerFrame::SaveCanvasAck {
                map_ident,
                pixel_count,
            } => {
                println!("ack: {pixel_count} pixels saved to {map_ident}");
                return Ok(());
            }
            ServerFrame::Error { message } => {
                return Err(anyhow!("server error: {message}"));
            }
        }
    }

    println!("{} pixels on {map}", canvas.len());
    for px in canvas {
        println!(
            "  ({:>5}, {:>5}) rgba({:.2}, {:.2}, {:.2}, {:.2}) by {} at {}",
            px.position.x, px.position.y, px.color.r, px.color.g, px.color.b, px.color.a,
            px.placed_by, px.placed_at
        );
    }
    Ok(())
}

fn pixel(x: i64, y: i64, color: Color, placed_by: String, is_active: bool) -> Pixel {
    Pixel {
        position: Position { x, y },
        color,
        placed_by,
        placed_at: now_millis(),
        is_active,
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

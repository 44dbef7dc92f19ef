//! Per-frame message routing.
//!
//! Every inbound frame walks the same staged pipeline: size ceiling, JSON
//! parse, `Type` extraction, dispatch, then per-operation validation. Each
//! stage fails into its own error kind and nothing past a failed stage
//! runs, so an adversarial frame can at most cost one linear parse. The
//! router is stateless across frames.

use std::sync::Arc;

use dashmap::DashMap;
use easel_core::{
    apply_update, dedup_by_position, plan_transfer, CanvasTransfer, MapIdent, Pixel, PixelUpdate,
    RequestCanvasData, SaveCanvas, ServerFrame, TYPE_FIELD,
};
use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, warn};

use crate::config::Config;
use crate::storage::{CanvasStore, StorageError};

/// Why one frame was rejected. Every variant becomes an `error` frame on
/// the same connection; none of them end the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("frame is not valid JSON")]
    Malformed(#[source] serde_json::Error),
    #[error("frame is missing a string Type field")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("{op}: invalid payload: {detail}")]
    Invalid { op: &'static str, detail: String },
    #[error("storage failure during {op}")]
    Storage {
        op: &'static str,
        #[source]
        source: StorageError,
    },
}

impl FrameError {
    /// What the client is told. Storage detail stays in the server log.
    pub fn client_message(&self) -> String {
        match self {
            FrameError::Storage { .. } => "storage unavailable, try again later".to_string(),
            other => other.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::TooLarge { .. } => "size_limit",
            FrameError::Malformed(_) => "malformed",
            FrameError::MissingType => "structure",
            FrameError::UnknownType(_) => "unknown_type",
            FrameError::Invalid { .. } => "validation",
            FrameError::Storage { .. } => "storage",
        }
    }
}

/// Routes parsed frames to the three canvas operations.
pub struct CanvasRouter {
    store: CanvasStore,
    max_frame_bytes: usize,
    chunk_size: usize,
    write_locks: Option<MapWriteLocks>,
}

impl CanvasRouter {
    pub fn new(store: CanvasStore, config: &Config) -> Self {
        Self {
            store,
            max_frame_bytes: config.max_frame_bytes,
            chunk_size: config.chunk_size,
            write_locks: config.serialize_writes.then(MapWriteLocks::new),
        }
    }

    /// Handles one raw inbound frame, turning any rejection into an
    /// `error` frame so the caller can forward it and move on.
    pub async fn handle_frame(&self, raw: &str) -> Vec<ServerFrame> {
        match self.process(raw).await {
            Ok(frames) => frames,
            Err(err) => {
                counter!("easel_frame_errors_total", 1, "kind" => err.kind());
                if !matches!(err, FrameError::Storage { .. }) {
                    warn!(kind = err.kind(), error = %err, "frame rejected");
                }
                vec![ServerFrame::Error {
                    message: err.client_message(),
                }]
            }
        }
    }

    async fn process(&self, raw: &str) -> Result<Vec<ServerFrame>, FrameError> {
        if raw.len() > self.max_frame_bytes {
            return Err(FrameError::TooLarge {
                size: raw.len(),
                limit: self.max_frame_bytes,
            });
        }

        let value: Value = serde_json::from_str(raw).map_err(FrameError::Malformed)?;
        let msg_type = value
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_string();

        counter!("easel_frames_total", 1, "type" => msg_type.clone());
        match msg_type.as_str() {
            "request_canvas_data" => self.request_canvas_data(value).await,
            "pixel_update" => self.pixel_update(value).await,
            "save_canvas" => self.save_canvas(value).await,
            _ => Err(FrameError::UnknownType(msg_type)),
        }
    }

    async fn request_canvas_data(&self, value: Value) -> Result<Vec<ServerFrame>, FrameError> {
        const OP: &str = "request_canvas_data";
        let req: RequestCanvasData = decode_payload(value, OP)?;
        let map_ident = parse_map_ident(&req.map_ident, OP)?;

        let pixels = self.load(&map_ident, OP).await?;
        let frames = match plan_transfer(pixels, self.chunk_size) {
            CanvasTransfer::Whole(pixels) => vec![ServerFrame::CanvasData {
                map_ident: map_ident.to_string(),
                pixels,
            }],
            CanvasTransfer::Chunked(parts) => {
                counter!("easel_chunked_transfers_total", 1);
                parts
                    .into_iter()
                    .map(|part| ServerFrame::CanvasDataChunk {
                        map_ident: map_ident.to_string(),
                        pixels: part.pixels,
                        chunk_index: part.chunk_index,
                        total_chunks: part.total_chunks,
                        is_last_chunk: part.is_last_chunk,
                    })
                    .collect()
            }
        };
        Ok(frames)
    }

    async fn pixel_update(&self, value: Value) -> Result<Vec<ServerFrame>, FrameError> {
        const OP: &str = "pixel_update";
        let req: PixelUpdate = decode_payload(value, OP)?;
        let map_ident = parse_map_ident(&req.map_ident, OP)?;
        req.pixel.validate().map_err(|err| FrameError::Invalid {
            op: OP,
            detail: err.to_string(),
        })?;

        let _guard = self.write_guard(&map_ident).await;
        let mut canvas = self.load(&map_ident, OP).await?;
        apply_update(&mut canvas, req.pixel.clone());
        self.save(&map_ident, &canvas, OP).await?;

        Ok(vec![ServerFrame::PixelUpdateAck {
            map_ident: map_ident.to_string(),
            pixel: req.pixel,
        }])
    }

    async fn save_canvas(&self, value: Value) -> Result<Vec<ServerFrame>, FrameError> {
        const OP: &str = "save_canvas";
        let req: SaveCanvas = decode_payload(value, OP)?;
        let map_ident = parse_map_ident(&req.map_ident, OP)?;
        for (index, pixel) in req.pixels.iter().enumerate() {
            pixel.validate().map_err(|err| FrameError::Invalid {
                op: OP,
                detail: format!("pixel {index}: {err}"),
            })?;
        }

        // The one-pixel-per-position invariant is enforced here, at the
        // store-write boundary, rather than trusting bulk submissions.
        let canvas = dedup_by_position(req.pixels);

        let _guard = self.write_guard(&map_ident).await;
        self.save(&map_ident, &canvas, OP).await?;

        Ok(vec![ServerFrame::SaveCanvasAck {
            map_ident: map_ident.to_string(),
            pixel_count: canvas.len(),
        }])
    }

    async fn load(&self, map_ident: &MapIdent, op: &'static str) -> Result<Vec<Pixel>, FrameError> {
        self.store.load(map_ident).await.map_err(|source| {
            error!(map = %map_ident, op, error = %source, "canvas load failed");
            FrameError::Storage { op, source }
        })
    }

    async fn save(
        &self,
        map_ident: &MapIdent,
        pixels: &[Pixel],
        op: &'static str,
    ) -> Result<(), FrameError> {
        self.store.save(map_ident, pixels).await.map_err(|source| {
            error!(map = %map_ident, op, error = %source, "canvas save failed");
            FrameError::Storage { op, source }
        })
    }

    async fn write_guard(&self, map_ident: &MapIdent) -> Option<OwnedMutexGuard<()>> {
        match &self.write_locks {
            Some(locks) => Some(locks.acquire(map_ident).await),
            None => None,
        }
    }
}

/// Per-map async mutexes, the opt-in single-writer seam. With the seam
/// off, two connections can interleave load/save on the same map and lose
/// one of the writes; the store offers no compare-and-swap to catch it.
struct MapWriteLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MapWriteLocks {
    fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    async fn acquire(&self, map_ident: &MapIdent) -> OwnedMutexGuard<()> {
        // Clone the Arc out first so no DashMap guard is held across the
        // lock await.
        let lock = self
            .locks
            .entry(map_ident.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    value: Value,
    op: &'static str,
) -> Result<T, FrameError> {
    serde_json::from_value(value).map_err(|err| FrameError::Invalid {
        op,
        detail: err.to_string(),
    })
}

fn parse_map_ident(raw: &str, op: &'static str) -> Result<MapIdent, FrameError> {
    MapIdent::parse(raw).map_err(|err| FrameError::Invalid {
        op,
        detail: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{Color, Position};
    use serde_json::json;

    fn router() -> CanvasRouter {
        CanvasRouter::new(CanvasStore::in_memory(), &Config::default())
    }

    fn router_with(config: Config) -> CanvasRouter {
        CanvasRouter::new(CanvasStore::in_memory(), &config)
    }

    fn pixel_json(x: i64, y: i64, placed_by: &str, active: bool) -> Value {
        json!({
            "Position": { "x": x, "y": y },
            "Color": { "r": 0.2, "g": 0.4, "b": 0.6, "a": 1.0 },
            "PlacedBy": placed_by,
            "PlacedAt": 1_700_000_000_000_i64,
            "IsActive": active,
        })
    }

    fn expect_error(frames: &[ServerFrame]) -> &str {
        match frames {
            [ServerFrame::Error { message }] => message,
            other => panic!("expected a single error frame, got {other:?}"),
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn oversized_frame_is_rejected_unparsed() {
        let router = router();
        let mut raw = String::from("{\"Type\":\"pixel_update\",\"Pad\":\"");
        raw.push_str(&"x".repeat(1_000_001));
        raw.push_str("\"}");
        let frames = router.handle_frame(&raw).await;
        assert!(expect_error(&frames).contains("byte limit"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn garbage_is_a_format_error() {
        let frames = router().handle_frame("not json at all {").await;
        assert!(expect_error(&frames).contains("not valid JSON"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn missing_type_is_a_structure_error() {
        let frames = router()
            .handle_frame(&json!({ "MapIdent": "m" }).to_string())
            .await;
        assert!(expect_error(&frames).contains("Type"));

        // A non-string Type is the same violation.
        let frames = router()
            .handle_frame(&json!({ "Type": 7 }).to_string())
            .await;
        assert!(expect_error(&frames).contains("Type"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn unknown_type_names_the_offender() {
        let frames = router()
            .handle_frame(&json!({ "Type": "bogus" }).to_string())
            .await;
        assert!(expect_error(&frames).contains("bogus"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn invalid_map_ident_short_circuits() {
        let frames = router()
            .handle_frame(
                &json!({ "Type": "request_canvas_data", "MapIdent": "no spaces" }).to_string(),
            )
            .await;
        assert!(expect_error(&frames).contains("forbidden character"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn empty_map_reads_as_empty_canvas() {
        let frames = router()
            .handle_frame(
                &json!({ "Type": "request_canvas_data", "MapIdent": "untouched" }).to_string(),
            )
            .await;
        match &frames[..] {
            [ServerFrame::CanvasData { map_ident, pixels }] => {
                assert_eq!(map_ident, "untouched");
                assert!(pixels.is_empty());
            }
            other => panic!("expected canvas_data, got {other:?}"),
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn update_then_read_round_trips() {
        let router = router();
        let frames = router
            .handle_frame(
                &json!({
                    "Type": "pixel_update",
                    "MapIdent": "plaza",
                    "Pixel": pixel_json(5, 5, "alice", true),
                })
                .to_string(),
            )
            .await;
        match &frames[..] {
            [ServerFrame::PixelUpdateAck { map_ident, pixel }] => {
                assert_eq!(map_ident, "plaza");
                assert_eq!(pixel.placed_by, "alice");
            }
            other => panic!("expected pixel_update_ack, got {other:?}"),
        }

        let frames = router
            .handle_frame(&json!({ "Type": "request_canvas_data", "MapIdent": "plaza" }).to_string())
            .await;
        match &frames[..] {
            [ServerFrame::CanvasData { pixels, .. }] => assert_eq!(pixels.len(), 1),
            other => panic!("expected canvas_data, got {other:?}"),
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn second_update_at_same_position_wins() {
        let router = router();
        for placer in ["first", "second"] {
            router
                .handle_frame(
                    &json!({
                        "Type": "pixel_update",
                        "MapIdent": "plaza",
                        "Pixel": pixel_json(1, 1, placer, true),
                    })
                    .to_string(),
                )
                .await;
        }
        let frames = router
            .handle_frame(&json!({ "Type": "request_canvas_data", "MapIdent": "plaza" }).to_string())
            .await;
        match &frames[..] {
            [ServerFrame::CanvasData { pixels, .. }] => {
                assert_eq!(pixels.len(), 1);
                assert_eq!(pixels[0].placed_by, "second");
            }
            other => panic!("expected canvas_data, got {other:?}"),
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn deleting_a_vacant_position_still_acks() {
        let frames = router()
            .handle_frame(
                &json!({
                    "Type": "pixel_update",
                    "MapIdent": "plaza",
                    "Pixel": pixel_json(404, 404, "eraser", false),
                })
                .to_string(),
            )
            .await;
        assert!(matches!(&frames[..], [ServerFrame::PixelUpdateAck { .. }]));
    }

    #[test_timeout::tokio_timeout_test]
    async fn pixel_with_empty_placer_never_reaches_the_store() {
        let router = router();
        let frames = router
            .handle_frame(
                &json!({
                    "Type": "pixel_update",
                    "MapIdent": "plaza",
                    "Pixel": pixel_json(1, 1, "", true),
                })
                .to_string(),
            )
            .await;
        assert!(expect_error(&frames).contains("PlacedBy"));

        let frames = router
            .handle_frame(&json!({ "Type": "request_canvas_data", "MapIdent": "plaza" }).to_string())
            .await;
        match &frames[..] {
            [ServerFrame::CanvasData { pixels, .. }] => assert!(pixels.is_empty()),
            other => panic!("expected canvas_data, got {other:?}"),
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn bulk_save_acks_deduplicated_count() {
        let router = router();
        let frames = router
            .handle_frame(
                &json!({
                    "Type": "save_canvas",
                    "MapIdent": "mural",
                    "Pixels": [
                        pixel_json(0, 0, "a", true),
                        pixel_json(0, 0, "b", true),
                        pixel_json(1, 1, "c", true),
                    ],
                })
                .to_string(),
            )
            .await;
        match &frames[..] {
            [ServerFrame::SaveCanvasAck { pixel_count, .. }] => assert_eq!(*pixel_count, 2),
            other => panic!("expected save_canvas_ack, got {other:?}"),
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn bulk_save_validates_every_pixel() {
        let frames = router()
            .handle_frame(
                &json!({
                    "Type": "save_canvas",
                    "MapIdent": "mural",
                    "Pixels": [pixel_json(0, 0, "ok", true), pixel_json(1, 1, " ", true)],
                })
                .to_string(),
            )
            .await;
        assert!(expect_error(&frames).contains("pixel 1"));
    }

    #[test_timeout::tokio_timeout_test]
    async fn large_canvas_reads_back_chunked() {
        let router = router();
        let pixels: Vec<Value> = (0..250).map(|i| pixel_json(i, 0, "bulk", true)).collect();
        router
            .handle_frame(
                &json!({ "Type": "save_canvas", "MapIdent": "big", "Pixels": pixels }).to_string(),
            )
            .await;

        let frames = router
            .handle_frame(&json!({ "Type": "request_canvas_data", "MapIdent": "big" }).to_string())
            .await;
        assert_eq!(frames.len(), 3);
        let mut seen = 0usize;
        for (i, frame) in frames.iter().enumerate() {
            match frame {
                ServerFrame::CanvasDataChunk {
                    pixels,
                    chunk_index,
                    total_chunks,
                    is_last_chunk,
                    ..
                } => {
                    assert_eq!(*chunk_index, i);
                    assert_eq!(*total_chunks, 3);
                    assert_eq!(*is_last_chunk, i == 2);
                    seen += pixels.len();
                }
                other => panic!("expected canvas_data_chunk, got {other:?}"),
            }
        }
        assert_eq!(seen, 250);
    }

    #[test_timeout::tokio_timeout_test]
    async fn storage_outage_yields_a_generic_error_frame() {
        let router = CanvasRouter::new(CanvasStore::failing(), &Config::default());

        let frames = router
            .handle_frame(&json!({ "Type": "request_canvas_data", "MapIdent": "down" }).to_string())
            .await;
        let message = expect_error(&frames);
        assert_eq!(message, "storage unavailable, try again later");
        // Backend detail stays in the server log.
        assert!(!message.contains("store offline"));
        assert!(!message.contains("redis"));

        // The write path fails the same way.
        let frames = router
            .handle_frame(
                &json!({
                    "Type": "pixel_update",
                    "MapIdent": "down",
                    "Pixel": pixel_json(0, 0, "writer", true),
                })
                .to_string(),
            )
            .await;
        assert_eq!(expect_error(&frames), "storage unavailable, try again later");
    }

    #[test_timeout::tokio_timeout_test]
    async fn map_id_alias_is_accepted() {
        let frames = router()
            .handle_frame(
                &json!({ "Type": "request_canvas_data", "MapId": "legacy" }).to_string(),
            )
            .await;
        assert!(matches!(&frames[..], [ServerFrame::CanvasData { .. }]));
    }

    #[test_timeout::tokio_timeout_test]
    async fn serialized_writes_keep_concurrent_updates() {
        let config = Config {
            serialize_writes: true,
            ..Config::default()
        };
        let router = Arc::new(router_with(config));

        let mut tasks = Vec::new();
        for i in 0..20i64 {
            let router = Arc::clone(&router);
            tasks.push(tokio::spawn(async move {
                router
                    .handle_frame(
                        &json!({
                            "Type": "pixel_update",
                            "MapIdent": "contended",
                            "Pixel": pixel_json(i, i, "racer", true),
                        })
                        .to_string(),
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let frames = router
            .handle_frame(
                &json!({ "Type": "request_canvas_data", "MapIdent": "contended" }).to_string(),
            )
            .await;
        match &frames[..] {
            [ServerFrame::CanvasData { pixels, .. }] => assert_eq!(pixels.len(), 20),
            other => panic!("expected canvas_data, got {other:?}"),
        }
    }
}

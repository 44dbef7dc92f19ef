//! Wire frames for the canvas sync protocol.
//!
//! Every frame is a JSON object with a string `Type` discriminator. Field
//! names are PascalCase on the wire; inbound frames additionally accept the
//! legacy aliases `MapId` (for `MapIdent`) and `LastModified` (for
//! `PlacedAt`). Outbound frames always use the canonical names.

use serde::{Deserialize, Serialize};

use crate::pixel::Pixel;

/// Name of the mandatory discriminator field.
pub const TYPE_FIELD: &str = "Type";

/// Payload of a `request_canvas_data` frame, minus the discriminator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestCanvasData {
    #[serde(alias = "MapId")]
    pub map_ident: String,
}

/// Payload of a `pixel_update` frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PixelUpdate {
    #[serde(alias = "MapId")]
    pub map_ident: String,
    pub pixel: Pixel,
}

/// Payload of a `save_canvas` frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaveCanvas {
    #[serde(alias = "MapId")]
    pub map_ident: String,
    pub pixels: Vec<Pixel>,
}

/// Frames a client sends to the server. The server side parses frames in
/// stages for finer-grained errors; this enum is the typed view used by
/// client code and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "PascalCase")]
    RequestCanvasData { map_ident: String },
    #[serde(rename_all = "PascalCase")]
    PixelUpdate { map_ident: String, pixel: Pixel },
    #[serde(rename_all = "PascalCase")]
    SaveCanvas {
        map_ident: String,
        pixels: Vec<Pixel>,
    },
}

/// Frames the server sends back on the same connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(rename_all = "PascalCase")]
    CanvasData {
        map_ident: String,
        pixels: Vec<Pixel>,
    },
    #[serde(rename_all = "PascalCase")]
    CanvasDataChunk {
        map_ident: String,
        pixels: Vec<Pixel>,
        chunk_index: usize,
        total_chunks: usize,
        is_last_chunk: bool,
    },
    #[serde(rename_all = "PascalCase")]
    PixelUpdateAck { map_ident: String, pixel: Pixel },
    #[serde(rename_all = "PascalCase")]
    SaveCanvasAck {
        map_ident: String,
        pixel_count: usize,
    },
    #[serde(rename_all = "PascalCase")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::{Color, Position};

    fn sample_pixel() -> Pixel {
        Pixel {
            position: Position { x: 4, y: 2 },
            color: Color {
                r: 1.0,
                g: 0.0,
                b: 0.25,
                a: 1.0,
            },
            placed_by: "tester".to_string(),
            placed_at: 1_700_000_000_000,
            is_active: true,
        }
    }

    #[test_timeout::timeout]
    fn error_frame_shape() {
        let frame = ServerFrame::Error {
            message: "boom".to_string(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["Type"], "error");
        assert_eq!(value["Message"], "boom");
    }

    #[test_timeout::timeout]
    fn canvas_data_uses_canonical_names() {
        let frame = ServerFrame::CanvasData {
            map_ident: "lobby".to_string(),
            pixels: vec![sample_pixel()],
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["Type"], "canvas_data");
        assert_eq!(value["MapIdent"], "lobby");
        let pixel = &value["Pixels"][0];
        assert_eq!(pixel["Position"]["x"], 4);
        assert_eq!(pixel["Color"]["a"], 1.0);
        assert_eq!(pixel["PlacedBy"], "tester");
        assert_eq!(pixel["PlacedAt"], 1_700_000_000_000_i64);
        assert_eq!(pixel["IsActive"], true);
    }

    #[test_timeout::timeout]
    fn chunk_frame_carries_sequencing_metadata() {
        let frame = ServerFrame::CanvasDataChunk {
            map_ident: "lobby".to_string(),
            pixels: vec![],
            chunk_index: 2,
            total_chunks: 3,
            is_last_chunk: true,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["Type"], "canvas_data_chunk");
        assert_eq!(value["ChunkIndex"], 2);
        assert_eq!(value["TotalChunks"], 3);
        assert_eq!(value["IsLastChunk"], true);
    }

    #[test_timeout::timeout]
    fn inbound_aliases_are_accepted() {
        let raw = serde_json::json!({
            "MapId": "legacy-map",
            "Pixel": {
                "Position": { "x": 1, "y": 2 },
                "Color": { "r": 0.0, "g": 0.0, "b": 0.0, "a": 1.0 },
                "PlacedBy": "old-client",
                "LastModified": 42,
                "IsActive": false
            }
        });
        let update: PixelUpdate = serde_json::from_value(raw).unwrap();
        assert_eq!(update.map_ident, "legacy-map");
        assert_eq!(update.pixel.placed_at, 42);
        assert!(!update.pixel.is_active);
    }

    #[test_timeout::timeout]
    fn missing_pixel_field_fails_whole_payload() {
        let raw = serde_json::json!({
            "MapIdent": "m",
            "Pixel": {
                "Position": { "x": 1, "y": 2 },
                "Color": { "r": 0.0, "g": 0.0, "b": 0.0, "a": 1.0 },
                "PlacedBy": "x",
                "PlacedAt": 42
            }
        });
        assert!(serde_json::from_value::<PixelUpdate>(raw).is_err());
    }

    #[test_timeout::timeout]
    fn client_frame_round_trips() {
        let frame = ClientFrame::SaveCanvas {
            map_ident: "m".to_string(),
            pixels: vec![sample_pixel()],
        };
        let text = serde_json::to_string(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["Type"], "save_canvas");
        assert_eq!(value["Pixels"][0]["PlacedBy"], "tester");
    }
}

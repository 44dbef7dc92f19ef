pub mod chunk;
pub mod merge;
pub mod pixel;
pub mod protocol;

pub use chunk::{plan_transfer, CanvasTransfer, ChunkPart, DEFAULT_CHUNK_SIZE};
pub use merge::{apply_update, dedup_by_position};
pub use pixel::{
    validate_map_ident, Color, InvalidMapIdent, InvalidPixel, MapIdent, Pixel, Position,
    MAX_MAP_IDENT_LEN,
};
pub use protocol::{
    ClientFrame, PixelUpdate, RequestCanvasData, SaveCanvas, ServerFrame, TYPE_FIELD,
};

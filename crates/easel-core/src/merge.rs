//! Reconciliation of incoming pixel changes against a loaded canvas.
//!
//! A canvas is an unindexed `Vec<Pixel>`, so every merge is a linear scan.
//! That is the accepted ceiling at expected per-map pixel counts.

use crate::pixel::Pixel;

/// Applies one incoming change to the canvas in place.
///
/// Active pixels replace the entry at the same position, or append when the
/// position is vacant. Inactive pixels remove the matching entry; deleting a
/// position that holds nothing is a no-op, not an error. Untouched entries
/// keep their relative order.
pub fn apply_update(canvas: &mut Vec<Pixel>, incoming: Pixel) {
    if incoming.is_active {
        match canvas
            .iter_mut()
            .find(|existing| existing.position == incoming.position)
        {
            Some(slot) => *slot = incoming,
            None => canvas.push(incoming),
        }
    } else {
        canvas.retain(|existing| existing.position != incoming.position);
    }
}

/// Collapses a bulk-submitted pixel list to at most one pixel per position.
///
/// The last occurrence of a position wins, mirroring arrival-order
/// last-write-wins of single updates. Inactive entries act as deletions and
/// are not carried into the result, so the output is always a valid
/// persisted canvas.
pub fn dedup_by_position(pixels: Vec<Pixel>) -> Vec<Pixel> {
    let mut canvas: Vec<Pixel> = Vec::with_capacity(pixels.len());
    for pixel in pixels {
        apply_update(&mut canvas, pixel);
    }
    canvas
}

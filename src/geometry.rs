use crate::landmarks::{
    Hand, INDEX_MCP, INDEX_TIP, Landmark, MIDDLE_MCP, MIDDLE_TIP, PINKY_MCP, PINKY_TIP, RING_MCP,
    RING_TIP,
};

/// Tip-to-MCP distances bounding the curl ramp.
#[derive(Debug, Clone, Copy)]
pub struct CurlBand {
    /// At or beyond this distance the finger counts as straight (curl 0).
    pub open: f32,
    /// At or below this distance the finger counts as fully bent (curl 1).
    pub closed: f32,
}

impl Default for CurlBand {
    fn default() -> Self {
        Self {
            open: 0.18,
            closed: 0.08,
        }
    }
}

pub fn distance3d(a: &Landmark, b: &Landmark) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

pub fn finger_curl(tip: &Landmark, mcp: &Landmark, band: CurlBand) -> f32 {
    let span = band.open - band.closed;
    if span <= f32::EPSILON {
        // degenerate band: hard step at `open`
        return if distance3d(tip, mcp) < band.open { 1.0 } else { 0.0 };
    }
    ((band.open - distance3d(tip, mcp)) / span).clamp(0.0, 1.0)
}

/// Mean bend of the four non-thumb fingers, in [0, 1].
pub fn curl(hand: &Hand, band: CurlBand) -> f32 {
    const FINGERS: [(usize, usize); 4] = [
        (INDEX_TIP, INDEX_MCP),
        (MIDDLE_TIP, MIDDLE_MCP),
        (RING_TIP, RING_MCP),
        (PINKY_TIP, PINKY_MCP),
    ];
    let sum: f32 = FINGERS
        .iter()
        .map(|&(tip, mcp)| finger_curl(hand.at(tip), hand.at(mcp), band))
        .sum();
    sum / FINGERS.len() as f32
}

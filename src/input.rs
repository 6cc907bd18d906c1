//! Landmark frames from the detector bridge.
//!
//! The bridge writes one JSON object per line; every connection gets a reader
//! thread that publishes into a single `FrameSlot`. Only the newest frame is
//! kept, so a slow pipeline skips frames instead of lagging behind.

use anyhow::{Result, anyhow};
use log::{debug, error, info};
use std::{
    fs,
    io::{BufRead, BufReader},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crate::landmarks::FrameObservation;

/// Single-slot, latest-wins handoff between reader and pipeline threads.
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<FrameObservation>>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is waiting.
    pub fn publish(&self, obs: FrameObservation) {
        let mut slot = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(obs);
        self.ready.notify_one();
    }

    /// Wait up to `timeout` for a frame and take it.
    pub fn take_timeout(&self, timeout: Duration) -> Option<FrameObservation> {
        let slot = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(slot, timeout, |s| s.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }
}

pub fn parse_frame_line(line: &str) -> Result<FrameObservation, serde_json::Error> {
    serde_json::from_str(line)
}

/// Start accepting bridge connections on `path`. Returns once bound.
pub fn spawn_frame_listener(
    path: PathBuf,
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    if path.exists() {
        let _ = fs::remove_file(&path);
    }
    let listener = UnixListener::bind(&path)?;
    listener.set_nonblocking(true)?;
    info!("frames: listening on {}", path.display());

    let handle = thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _)) => {
                    let slot = slot.clone();
                    thread::spawn(move || {
                        if let Err(e) = read_bridge(stream, &slot) {
                            error!("frames: bridge connection failed: {e}");
                        }
                    });
                }
                Err(_) => thread::sleep(Duration::from_millis(20)),
            }
        }
        let _ = fs::remove_file(&path);
    });
    Ok(handle)
}

fn read_bridge(stream: UnixStream, slot: &FrameSlot) -> Result<()> {
    stream.set_nonblocking(false)?;
    info!("frames: bridge connected");
    let mut frames = 0u64;
    for line in BufReader::new(stream).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_frame_line(&line) {
            Ok(obs) => {
                frames += 1;
                slot.publish(obs);
            }
            Err(e) => debug!("frames: skipping unparsable line: {e}"),
        }
    }
    info!("frames: bridge disconnected after {frames} frames");
    Ok(())
}

/// Parse a recorded stream: JSON lines, blanks and `#` comments ignored.
pub fn parse_recording(text: &str) -> Result<Vec<FrameObservation>> {
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let obs = parse_frame_line(line).map_err(|e| anyhow!("line {}: {e}", n + 1))?;
        out.push(obs);
    }
    Ok(out)
}

pub fn read_recording(path: &Path) -> Result<Vec<FrameObservation>> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    parse_recording(&text).map_err(|e| anyhow!("{}: {e}", path.display()))
}

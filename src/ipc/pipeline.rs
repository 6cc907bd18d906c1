use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender},
};
use std::{
    thread,
    time::{Duration, Instant},
};

use crate::actions::{Action, UinputSink};
use crate::config::Profile;
use crate::input::FrameSlot;
use crate::session::{SessionState, process_frame};

pub enum PipelineCmd {
    SetEnabled(bool),
}

/// Daemon-side handle on the pipeline thread. The thread owns the session
/// and the sink; everything else goes through here.
pub struct PipelineHandle {
    profile: Arc<Mutex<Profile>>,
    enabled: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    tx: Sender<PipelineCmd>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn start(profile: Profile, slot: Arc<FrameSlot>, stop: Arc<AtomicBool>) -> Result<Self> {
        let enabled = Arc::new(AtomicBool::new(profile.tuning.start_enabled));
        let frames = Arc::new(AtomicU64::new(0));
        let profile = Arc::new(Mutex::new(profile));
        let (tx, rx) = mpsc::channel();

        let ctx = PipelineCtx {
            profile: profile.clone(),
            slot,
            rx,
            enabled: enabled.clone(),
            frames: frames.clone(),
            stop,
        };
        let handle = thread::Builder::new()
            .name("handctl-pipeline".into())
            .spawn(move || {
                if let Err(e) = run_pipeline(ctx) {
                    error!("pipeline failed: {e}");
                }
            })?;

        Ok(Self {
            profile,
            enabled,
            frames,
            tx,
            thread: Some(handle),
        })
    }

    /// Picked up at the next frame boundary.
    pub fn update_profile(&self, new_profile: Profile) {
        let mut p = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        *p = new_profile;
    }

    pub fn set_enabled(&self, enabled: bool) {
        // reflect it right away so `status` agrees with the reply
        self.enabled.store(enabled, Ordering::Relaxed);
        let _ = self.tx.send(PipelineCmd::SetEnabled(enabled));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn join(mut self) {
        if let Some(h) = self.thread.take() {
            let _ = h.join();
        }
    }
}

struct PipelineCtx {
    profile: Arc<Mutex<Profile>>,
    slot: Arc<FrameSlot>,
    rx: Receiver<PipelineCmd>,
    enabled: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
}

fn screen_of(p: &Profile) -> (u32, u32) {
    (p.pointer.screen_width, p.pointer.screen_height)
}

fn open_sink(screen: (u32, u32)) -> UinputSink {
    UinputSink::new(screen).unwrap_or_else(|e| {
        warn!("uinput unavailable ({e}); running in NO-OP mode");
        UinputSink::noop()
    })
}

fn run_pipeline(ctx: PipelineCtx) -> Result<()> {
    let (mut session, mut screen) = {
        let p = ctx.profile.lock().unwrap_or_else(PoisonError::into_inner);
        (SessionState::new(&p), screen_of(&p))
    };
    let mut sink = open_sink(screen);
    let started = Instant::now();
    info!(
        "pipeline: running, control {}",
        if session.enabled { "enabled" } else { "disabled" }
    );

    while !ctx.stop.load(Ordering::Relaxed) {
        drain_commands(&ctx.rx, &mut session, &ctx.enabled);

        let Some(obs) = ctx.slot.take_timeout(Duration::from_millis(10)) else {
            continue;
        };
        ctx.frames.fetch_add(1, Ordering::Relaxed);

        let result = {
            let p = ctx.profile.lock().unwrap_or_else(PoisonError::into_inner);
            // absolute axes are sized at device creation
            if screen_of(&p) != screen {
                screen = screen_of(&p);
                info!("pipeline: screen is now {}x{}; recreating sink", screen.0, screen.1);
                sink = open_sink(screen);
            }
            process_frame(&mut session, &p, &obs, started.elapsed())
        };

        match result {
            Ok(out) => {
                if let Some(en) = out.toggled {
                    ctx.enabled.store(en, Ordering::Relaxed);
                }
                if !out.readings.is_empty() {
                    debug!("frame: {:?}", out.readings);
                }
                apply_actions(&out.actions, &mut sink);
            }
            Err(e) => debug!("frame ignored: {e}"),
        }
    }
    info!("pipeline: stopped");
    Ok(())
}

/// The shared flag is written only when a command lands, so a value stored
/// by `PipelineHandle::set_enabled` is never overwritten by a stale one.
fn drain_commands(rx: &Receiver<PipelineCmd>, session: &mut SessionState, enabled: &AtomicBool) {
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            PipelineCmd::SetEnabled(en) => {
                if en != session.enabled {
                    info!("control {}", if en { "enabled" } else { "disabled" });
                }
                session.set_enabled(en);
                enabled.store(session.enabled, Ordering::Relaxed);
            }
        }
    }
}

fn apply_actions(actions: &[Action], sink: &mut UinputSink) {
    for a in actions {
        if let Err(e) = sink.apply(a) {
            error!("dispatch failed for {a:?}: {e}");
        }
    }
}

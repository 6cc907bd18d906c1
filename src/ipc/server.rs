use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    ffi::OsStr,
    fs,
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
    },
    thread,
    time::Duration,
};

use super::dispatch::dispatch_request;
use super::pipeline::PipelineHandle;
use super::runtime::{frames_socket_path, socket_path};
use crate::config::DaemonConfigState;
use crate::input::{FrameSlot, spawn_frame_listener};

enum IpcMsg {
    Request {
        req: serde_json::Value,
        reply: Sender<serde_json::Value>,
    },
    ProfileChanged(PathBuf),
}

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);

    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&stop))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&stop))?;

    // frames in, pipeline thread
    let slot = Arc::new(FrameSlot::new());
    let frames_thread = spawn_frame_listener(frames_socket_path()?, slot.clone(), stop.clone())?;
    let pipeline = PipelineHandle::start(cfg.profile.clone(), slot, stop.clone())?;

    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let _watcher = match watch_profiles(&cfg.profiles_dir, tx_req.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile watch disabled: {e}");
            None
        }
    };

    // accept loop
    listener.set_nonblocking(true)?;
    let mut clients: Vec<thread::JoinHandle<()>> = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            clients.push(thread::spawn(move || {
                if let Err(e) = handle_client(stream, tx) {
                    error!("ipc client error: {e}");
                }
            }));
        }
        clients.retain(|h| !h.is_finished());

        let mut reload_pending = false;
        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Request { req, reply } => {
                    let resp = dispatch_request(&req, &mut cfg, &pipeline, &stop);
                    let _ = reply.send(resp);
                }
                IpcMsg::ProfileChanged(path) => {
                    let active = format!("{}.toml", cfg.active_name);
                    if path.file_name() == Some(OsStr::new(&active)) {
                        reload_pending = true;
                    }
                }
            }
        }
        // editors fire several events per save; reload once
        if reload_pending {
            match cfg.reload() {
                Ok(()) => {
                    pipeline.update_profile(cfg.profile.clone());
                    info!("profile '{}' changed on disk; reloaded", cfg.active_name);
                }
                Err(e) => error!("reload after edit failed, keeping last good profile: {e}"),
            }
        }

        thread::sleep(Duration::from_millis(5));
    }

    info!("daemon: shutting down");
    for h in clients {
        let _ = h.join();
    }
    pipeline.join();
    let _ = frames_thread.join();
    let _ = fs::remove_file(&sock);
    Ok(())
}

fn watch_profiles(dir: &Path, tx: Sender<IpcMsg>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
                for p in ev.paths {
                    let _ = tx.send(IpcMsg::ProfileChanged(p));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("profile watch error: {e}"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn handle_client(mut stream: UnixStream, tx_req: Sender<IpcMsg>) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;

    let (reply_tx, reply_rx) = mpsc::channel();
    tx_req
        .send(IpcMsg::Request {
            req,
            reply: reply_tx,
        })
        .map_err(|_| anyhow!("daemon is shutting down"))?;
    let resp = reply_rx
        .recv_timeout(Duration::from_secs(2))
        .unwrap_or_else(|_| serde_json::json!({"ok": false, "error": "daemon did not answer"}));

    writeln!(stream, "{resp}")?;
    Ok(())
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

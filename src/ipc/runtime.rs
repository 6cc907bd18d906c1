use anyhow::Result;
use std::{fs, path::PathBuf};

use crate::config::home_dir;

/// ~/.local/run, created on first use.
pub fn runtime_dir() -> Result<PathBuf> {
    let dir = home_dir()?.join(".local").join("run");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("handctl.sock"))
}

/// Where the detector bridge streams landmark frames.
pub fn frames_socket_path() -> Result<PathBuf> {
    Ok(runtime_dir()?.join("handctl-frames.sock"))
}

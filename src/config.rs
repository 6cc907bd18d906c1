use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::bindings::{BindingTable, default_bindings};
use crate::geometry::CurlBand;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

/// Pose-classifier distances, all in normalized image units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub pinch_distance: f32,
    pub ok_distance: f32,
    pub finger_closed_distance: f32,
    pub thumb_closed_distance: f32,
    pub thumb_up_margin: f32,
    pub curl_open: f32,
    pub curl_closed: f32,
    pub toggle_separation: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        let band = CurlBand::default();
        Self {
            pinch_distance: 0.03,
            ok_distance: 0.04,
            finger_closed_distance: 0.13,
            thumb_closed_distance: 0.15,
            thumb_up_margin: 0.02,
            curl_open: band.open,
            curl_closed: band.closed,
            toggle_separation: 0.4,
        }
    }
}

impl Thresholds {
    pub fn curl_band(&self) -> CurlBand {
        CurlBand {
            open: self.curl_open,
            closed: self.curl_closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub smoothing: f32,
    pub sensitivity: f32,
    pub movement_threshold: f32,
    /// seconds
    pub click_cooldown: f32,
    pub scroll_cooldown: f32,
    pub toggle_cooldown: f32,
    pub scroll_speed: i32,
    /// scale scroll amount by how open the hand is
    pub variable_scroll: bool,
    pub min_confidence: f32,
    pub start_enabled: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            smoothing: 0.85,
            sensitivity: 3.0,
            movement_threshold: 0.001,
            click_cooldown: 0.5,
            scroll_cooldown: 0.1,
            toggle_cooldown: 1.0,
            scroll_speed: 12,
            variable_scroll: false,
            min_confidence: 0.0,
            start_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerMode {
    #[default]
    Relative,
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pointer {
    pub mode: PointerMode,
    pub screen_width: u32,
    pub screen_height: u32,
    /// flip x for a selfie-view camera
    pub mirror_x: bool,
    pub jitter_px: f32,
    pub stationary_px: f32,
}

impl Default for Pointer {
    fn default() -> Self {
        Self {
            mode: PointerMode::Relative,
            screen_width: 1920,
            screen_height: 1080,
            mirror_x: false,
            jitter_px: 1.0,
            stationary_px: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub tuning: Tuning,
    #[serde(default)]
    pub pointer: Pointer,

    // Accept nested/dotted tables and flatten them into "right.pointing" -> "move"
    #[serde(
        default = "default_bindings",
        deserialize_with = "deserialize_bindings_flat"
    )]
    pub bindings: HashMap<String, String>,

    #[serde(skip)]
    pub table: BindingTable,
}

impl Default for Profile {
    fn default() -> Self {
        let bindings = default_bindings();
        let table = BindingTable::compile(&bindings).unwrap_or_default();
        Self {
            meta: Meta::default(),
            thresholds: Thresholds::default(),
            tuning: Tuning::default(),
            pointer: Pointer::default(),
            bindings,
            table,
        }
    }
}

impl Profile {
    /// Parse, clamp and compile a profile from TOML text.
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let mut profile: Profile = toml::from_str(txt)?;
        profile.sanitize();
        profile.table = BindingTable::compile(&profile.bindings)?;
        Ok(profile)
    }

    pub fn sanitize(&mut self) {
        sanitize_thresholds(&mut self.thresholds);
        sanitize_tuning(&mut self.tuning);
        sanitize_pointer(&mut self.pointer);
    }

    /// Set one knob by name ("smoothing" or "tuning.smoothing"). Values are
    /// clamped like a profile load.
    pub fn set_knob(&mut self, key: &str, raw: &str) -> Result<()> {
        let (section, field) = self.locate(key)?;
        let value: serde_json::Value = serde_json::from_str(raw.trim())
            .unwrap_or_else(|_| serde_json::Value::String(raw.trim().to_string()));
        match section {
            "thresholds" => self.thresholds = patch(&self.thresholds, field, value)?,
            "tuning" => self.tuning = patch(&self.tuning, field, value)?,
            "pointer" => self.pointer = patch(&self.pointer, field, value)?,
            other => return Err(anyhow!("unknown section: {other}")),
        }
        self.sanitize();
        Ok(())
    }

    pub fn get_knob(&self, key: &str) -> Result<serde_json::Value> {
        let (section, field) = self.locate(key)?;
        let obj = match section {
            "thresholds" => as_json(&self.thresholds)?,
            "tuning" => as_json(&self.tuning)?,
            _ => as_json(&self.pointer)?,
        };
        obj.get(field)
            .cloned()
            .ok_or_else(|| anyhow!("unknown setting: {key}"))
    }

    /// All knobs, grouped by section.
    pub fn knobs(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "thresholds": as_json(&self.thresholds)?,
            "tuning": as_json(&self.tuning)?,
            "pointer": as_json(&self.pointer)?,
        }))
    }

    fn locate<'k>(&self, key: &'k str) -> Result<(&'static str, &'k str)> {
        const SECTIONS: [&str; 3] = ["tuning", "thresholds", "pointer"];
        if let Some((section, field)) = key.split_once('.') {
            let section = SECTIONS
                .into_iter()
                .find(|s| *s == section)
                .ok_or_else(|| anyhow!("unknown section: {section}"))?;
            return Ok((section, field));
        }
        for section in SECTIONS {
            let obj = match section {
                "thresholds" => as_json(&self.thresholds)?,
                "tuning" => as_json(&self.tuning)?,
                _ => as_json(&self.pointer)?,
            };
            if obj.get(key).is_some() {
                return Ok((section, key));
            }
        }
        Err(anyhow!("unknown setting: {key}"))
    }
}

// goes through text so f32 fields read back as written (0.85, not 0.8500000238)
fn as_json<T: Serialize>(v: &T) -> Result<serde_json::Value> {
    Ok(serde_json::from_str(&serde_json::to_string(v)?)?)
}

fn patch<T>(current: &T, field: &str, value: serde_json::Value) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let mut obj = as_json(current)?;
    let map = obj
        .as_object_mut()
        .ok_or_else(|| anyhow!("settings section is not an object"))?;
    let Some(current_value) = map.get(field) else {
        return Err(anyhow!("unknown setting: {field}"));
    };
    let value = fit_integer(current_value, value);
    map.insert(field.to_string(), value);
    serde_json::from_value(obj).map_err(|e| anyhow!("bad value for {field}: {e}"))
}

/// Integer settings are all positive and at most i32-sized; pull an
/// out-of-range integer into that span so `sanitize` clamps it instead of
/// the deserializer rejecting it.
fn fit_integer(current: &serde_json::Value, value: serde_json::Value) -> serde_json::Value {
    if !(current.is_i64() || current.is_u64()) {
        return value;
    }
    let n = match (value.as_i64(), value.as_u64()) {
        (Some(n), _) => n,
        (None, Some(_)) => i64::MAX,
        (None, None) => return value,
    };
    serde_json::Value::from(n.clamp(0, i64::from(i32::MAX)))
}

fn clamp_f32(name: &str, v: &mut f32, default: f32, lo: f32, hi: f32) {
    if !v.is_finite() {
        warn!("{name}={v} is not a number; using {default}");
        *v = default;
    } else if *v < lo || *v > hi {
        let c = v.clamp(lo, hi);
        warn!("{name}={v} out of range [{lo}, {hi}]; clamped to {c}");
        *v = c;
    }
}

fn sanitize_thresholds(t: &mut Thresholds) {
    let d = Thresholds::default();
    clamp_f32("thresholds.pinch_distance", &mut t.pinch_distance, d.pinch_distance, 0.0, 0.5);
    clamp_f32("thresholds.ok_distance", &mut t.ok_distance, d.ok_distance, 0.0, 0.5);
    clamp_f32(
        "thresholds.finger_closed_distance",
        &mut t.finger_closed_distance,
        d.finger_closed_distance,
        0.0,
        0.5,
    );
    clamp_f32(
        "thresholds.thumb_closed_distance",
        &mut t.thumb_closed_distance,
        d.thumb_closed_distance,
        0.0,
        0.5,
    );
    clamp_f32("thresholds.thumb_up_margin", &mut t.thumb_up_margin, d.thumb_up_margin, 0.0, 0.2);
    clamp_f32("thresholds.curl_open", &mut t.curl_open, d.curl_open, 0.0, 0.5);
    clamp_f32("thresholds.curl_closed", &mut t.curl_closed, d.curl_closed, 0.0, 0.5);
    if t.curl_closed > t.curl_open {
        warn!(
            "thresholds.curl_closed ({}) exceeds curl_open ({}); using defaults",
            t.curl_closed, t.curl_open
        );
        t.curl_open = d.curl_open;
        t.curl_closed = d.curl_closed;
    }
    clamp_f32(
        "thresholds.toggle_separation",
        &mut t.toggle_separation,
        d.toggle_separation,
        0.0,
        1.0,
    );
}

fn sanitize_tuning(t: &mut Tuning) {
    let d = Tuning::default();
    // smoothing must stay below 1 or the filter never moves
    clamp_f32("tuning.smoothing", &mut t.smoothing, d.smoothing, 0.0, 0.99);
    clamp_f32("tuning.sensitivity", &mut t.sensitivity, d.sensitivity, 0.1, 15.0);
    clamp_f32(
        "tuning.movement_threshold",
        &mut t.movement_threshold,
        d.movement_threshold,
        0.0,
        0.05,
    );
    clamp_f32("tuning.click_cooldown", &mut t.click_cooldown, d.click_cooldown, 0.0, 5.0);
    clamp_f32("tuning.scroll_cooldown", &mut t.scroll_cooldown, d.scroll_cooldown, 0.0, 5.0);
    clamp_f32("tuning.toggle_cooldown", &mut t.toggle_cooldown, d.toggle_cooldown, 0.0, 10.0);
    if !(1..=100).contains(&t.scroll_speed) {
        let c = t.scroll_speed.clamp(1, 100);
        warn!("tuning.scroll_speed={} out of range [1, 100]; clamped to {c}", t.scroll_speed);
        t.scroll_speed = c;
    }
    clamp_f32("tuning.min_confidence", &mut t.min_confidence, d.min_confidence, 0.0, 1.0);
}

fn sanitize_pointer(p: &mut Pointer) {
    let d = Pointer::default();
    for (name, v) in [
        ("pointer.screen_width", &mut p.screen_width),
        ("pointer.screen_height", &mut p.screen_height),
    ] {
        if !(1..=32768).contains(&*v) {
            let c = (*v).clamp(1, 32768);
            warn!("{name}={v} out of range [1, 32768]; clamped to {c}");
            *v = c;
        }
    }
    clamp_f32("pointer.jitter_px", &mut p.jitter_px, d.jitter_px, 0.0, 100.0);
    clamp_f32("pointer.stationary_px", &mut p.stationary_px, d.stationary_px, 0.0, 100.0);
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn home_dir() -> Result<PathBuf> {
    UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .ok_or_else(|| anyhow!("cannot determine home directory"))
}

fn config_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(".config").join("handctl"))
}

fn profiles_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("profiles"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = profiles_dir()?;
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile_from(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// On error the current profile stays in place.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile_from(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile_from(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    pub fn active_path(&self) -> PathBuf {
        self.profile_path(&self.active_name)
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "bindings": self.profile.table.len(),
            "pointer_mode": self.profile.pointer.mode,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input",
                "detector": "stream landmark frames as JSON lines to ~/.local/run/handctl-frames.sock"
            }
        })
    }
}

/// Read a named profile without touching daemon state (used by `replay`).
pub fn load_named_profile(name: &str) -> Result<Profile> {
    load_profile_from(&profiles_dir()?, name)
}

fn load_profile_from(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml_str(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

fn check_in_input_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("input:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}

use anyhow::{Result, anyhow};
use log::warn;
use pico_args::Arguments;
use std::{
    env,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use crate::actions::{MouseButton, UinputSink};
use crate::config::{self, Profile};
use crate::input;
use crate::ipc;
use crate::session::{SessionState, process_frame};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some(op @ ("stop" | "status" | "reload" | "list" | "doctor" | "enable" | "disable"
        | "toggle")) => {
            let op = if op == "stop" { "shutdown" } else { op };
            let r = ipc::client_request(serde_json::json!({ "op": op }))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("get") => {
            let key: Option<String> = pargs.free_from_str().ok();
            let r = ipc::client_request(serde_json::json!({"op":"get","key":key}))?;
            print_response(&r);
            Ok(())
        }

        Some("set") => {
            let usage = || anyhow!("usage: handctl set <key> <value>");
            let key: String = pargs.free_from_str().map_err(|_| usage())?;
            let value: String = pargs.free_from_str().map_err(|_| usage())?;
            let r = ipc::client_request(serde_json::json!({"op":"set","key":key,"value":value}))?;
            print_response(&r);
            Ok(())
        }

        Some("emit") => {
            // usage:
            //   handctl emit click right
            //   handctl emit scroll 3
            //   handctl emit key SUPER+TAB
            //   handctl emit move 40 -10
            let what: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl emit <click|scroll|key|move> ..."))?;
            let pointer = config::Pointer::default();
            let mut sink = UinputSink::new((pointer.screen_width, pointer.screen_height))?;
            match what.as_str() {
                "click" => {
                    let btn: MouseButton = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit click <left|right|middle>"))?;
                    sink.click_mouse(btn)?;
                    println!("ok: clicked {btn}");
                }
                "scroll" => {
                    let steps: i32 = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit scroll <steps>"))?;
                    sink.scroll_vertical(steps)?;
                    println!("ok: scrolled vertical {steps}");
                }
                "key" => {
                    let chord: String = pargs
                        .free_from_str()
                        .map_err(|_| anyhow!("usage: handctl emit key SUPER+TAB"))?;
                    sink.key_chord(&chord)?;
                    println!("ok: sent key chord {chord}");
                }
                "move" => {
                    let usage = || anyhow!("usage: handctl emit move <dx> <dy>");
                    let dx: i32 = pargs.free_from_str().map_err(|_| usage())?;
                    let dy: i32 = pargs.free_from_str().map_err(|_| usage())?;
                    sink.move_relative(dx, dy)?;
                    println!("ok: moved pointer by ({dx}, {dy})");
                }
                other => return Err(anyhow!("unknown emit kind: {other}")),
            }
            Ok(())
        }

        Some("replay") => {
            let profile_name: Option<String> = pargs.opt_value_from_str("--profile")?;
            let file: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl replay <file.jsonl> [--profile <name>]"))?;
            let profile = match profile_name {
                Some(name) => config::load_named_profile(&name)?,
                None => Profile::default(),
            };
            replay(&file, &profile)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Frames without `t_ms` are spaced at ~30 fps.
const REPLAY_FRAME_MS: u64 = 33;

fn replay(file: &Path, profile: &Profile) -> Result<()> {
    let frames = input::read_recording(file)?;
    let mut session = SessionState::new(profile);
    for (i, obs) in frames.iter().enumerate() {
        let t_ms = obs.t_ms.unwrap_or(i as u64 * REPLAY_FRAME_MS);
        let line = match process_frame(&mut session, profile, obs, Duration::from_millis(t_ms)) {
            Ok(out) => serde_json::json!({
                "frame": i,
                "t_ms": t_ms,
                "enabled": session.enabled,
                "readings": out.readings,
                "actions": out.actions,
                "toggled": out.toggled,
            }),
            Err(e) => {
                warn!("frame {i}: {e}");
                serde_json::json!({"frame": i, "t_ms": t_ms, "error": e.to_string()})
            }
        };
        println!("{line}");
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl — hand-gesture pointer control daemon

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl start                           Start the daemon
  handctl stop                            Stop the daemon
  handctl status                          Show daemon state
  handctl reload                          Reload active profile
  handctl use <name>                      Switch active profile
  handctl list                            List profiles
  handctl doctor                          Diagnose permissions and setup
  handctl enable | disable | toggle       Turn gesture control on or off
  handctl get [key]                       Show one setting, or all of them
  handctl set <key> <value>               Change a setting until the next reload
  handctl emit click <left|right|middle>  Emit a mouse click
  handctl emit scroll <steps>             Emit vertical scroll (+/- steps)
  handctl emit key SUPER+TAB              Emit a key or chord
  handctl emit move <dx> <dy>             Move the pointer
  handctl replay <file.jsonl> [--profile <name>]
                                          Run recorded frames, print what would fire

TIPS:
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
  - Detector frames: ~/.local/run/handctl-frames.sock (JSON lines)
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: handctl start\nStarts the background daemon."),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows enabled flag, active profile, frame count and sockets."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handctl list\nLists available profiles and the active one."),
        "doctor" => println!("usage: handctl doctor\nChecks uinput access and profile setup."),
        "enable" | "disable" | "toggle" => println!(
            "usage: handctl {cmd}\nTurns gesture control on/off (same as two fists held apart)."
        ),
        "get" => println!(
            "usage: handctl get [key]\nKeys: smoothing, sensitivity, click_cooldown, pointer.mode, ..."
        ),
        "set" => println!(
            "usage: handctl set <key> <value>\nOut-of-range values are clamped. Not written to the profile file."
        ),
        "emit" => println!(
            "usage:\n  handctl emit click <left|right|middle>\n  handctl emit scroll <steps>\n  handctl emit key SUPER+TAB\n  handctl emit move <dx> <dy>"
        ),
        "replay" => println!(
            "usage: handctl replay <file.jsonl> [--profile <name>]\nPrints one JSON line per frame; nothing is injected."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

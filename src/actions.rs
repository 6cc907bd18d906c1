use anyhow::{Result, anyhow};
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(format!("unknown mouse button: {other}")),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            other => Err(format!("unknown scroll direction: {other}")),
        }
    }
}

/// One instruction for the injection sink, applied in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    MoveAbsolute { x: i32, y: i32 },
    MoveRelative { dx: i32, dy: i32 },
    Click { button: MouseButton, count: u32 },
    Scroll { amount: u32, direction: ScrollDirection },
    Hotkey { chord: String },
}

pub struct UinputSink {
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    /// `screen` sizes the absolute axes used by `MoveAbsolute`.
    pub fn new(screen: (u32, u32)) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create(screen)?;
            return Ok(Self {
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            let _ = screen;
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self { linux: None })
        }
    }

    pub fn noop() -> Self {
        Self { linux: None }
    }

    pub fn apply(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::MoveRelative { dx, dy } => self.move_relative(*dx, *dy),
            Action::MoveAbsolute { x, y } => self.move_absolute(*x, *y),
            Action::Click { button, count } => {
                for _ in 0..*count {
                    self.click_mouse(*button)?;
                }
                Ok(())
            }
            Action::Scroll { amount, direction } => {
                let steps = i32::try_from(*amount).unwrap_or(i32::MAX);
                match direction {
                    ScrollDirection::Up => self.scroll_vertical(steps),
                    ScrollDirection::Down => self.scroll_vertical(-steps),
                }
            }
            Action::Hotkey { chord } => self.key_chord(chord),
        }
    }

    pub fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.move_relative(dx, dy)?;
        }
        Ok(())
    }

    pub fn move_absolute(&mut self, x: i32, y: i32) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.move_absolute(x, y)?;
        }
        Ok(())
    }

    pub fn scroll_vertical(&mut self, steps: i32) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.scroll_vertical(steps)?;
        }
        Ok(())
    }

    pub fn click_mouse(&mut self, which: MouseButton) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.click(which)?;
        }
        Ok(())
    }

    /// Send a chord like "SUPER+TAB" or single "ESC"
    pub fn key_chord(&mut self, chord: &str) -> Result<()> {
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            let keys = parse_chord(chord)?;
            // press in order
            for k in &keys {
                dev.key_send(*k, 1)?;
            }
            dev.sync()?;
            // release in reverse
            for k in keys.iter().rev() {
                dev.key_send(*k, 0)?;
            }
            dev.sync()?;
        }
        Ok(())
    }
}

/// Validates a chord without touching a device; profiles call this on load.
pub fn check_chord(chord: &str) -> Result<()> {
    if chord.trim().is_empty() {
        return Err(anyhow!("empty key chord"));
    }
    for tok in chord.split('+') {
        key_token(&tok.trim().to_ascii_uppercase())?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyToken {
    Ctrl,
    Alt,
    Shift,
    Super,
    Tab,
    Minus,
    Equal,
    Esc,
    Enter,
    Space,
    Left,
    Right,
    Up,
    Down,
}

fn key_token(tok: &str) -> Result<KeyToken> {
    let k = match tok {
        "CTRL" | "CONTROL" => KeyToken::Ctrl,
        "ALT" => KeyToken::Alt,
        "SHIFT" => KeyToken::Shift,
        "SUPER" | "META" | "WIN" => KeyToken::Super,
        "TAB" => KeyToken::Tab,
        "MINUS" | "-" => KeyToken::Minus,
        "EQUAL" | "=" => KeyToken::Equal,
        "ESC" | "ESCAPE" => KeyToken::Esc,
        "ENTER" | "RETURN" => KeyToken::Enter,
        "SPACE" => KeyToken::Space,
        "LEFT" => KeyToken::Left,
        "RIGHT" => KeyToken::Right,
        "UP" => KeyToken::Up,
        "DOWN" => KeyToken::Down,
        other => return Err(anyhow!("unsupported key token: {other}")),
    };
    Ok(k)
}

#[cfg(target_os = "linux")]
fn parse_chord(chord: &str) -> Result<Vec<uinput::event::keyboard::Key>> {
    chord
        .split('+')
        .map(|s| key_token(&s.trim().to_ascii_uppercase()).map(map_key))
        .collect()
}

#[cfg(target_os = "linux")]
fn map_key(tok: KeyToken) -> uinput::event::keyboard::Key {
    use uinput::event::keyboard::Key as K;
    match tok {
        KeyToken::Ctrl => K::LeftControl,
        KeyToken::Alt => K::LeftAlt,
        KeyToken::Shift => K::LeftShift,
        KeyToken::Super => K::LeftMeta,
        KeyToken::Tab => K::Tab,
        KeyToken::Minus => K::Minus,
        KeyToken::Equal => K::Equal,
        KeyToken::Esc => K::Esc,
        KeyToken::Enter => K::Enter,
        KeyToken::Space => K::Space,
        KeyToken::Left => K::Left,
        KeyToken::Right => K::Right,
        KeyToken::Up => K::Up,
        KeyToken::Down => K::Down,
    }
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create(screen: (u32, u32)) -> Result<Self> {
        use uinput::event::{absolute, controller::Mouse, keyboard, relative};

        let max_x = i32::try_from(screen.0.saturating_sub(1)).unwrap_or(i32::MAX);
        let max_y = i32::try_from(screen.1.saturating_sub(1)).unwrap_or(i32::MAX);

        let mut builder = uinput::default()?
            .name("handctl virtual pointer")?
            // relative axes + wheel
            .event(relative::Position::X)?
            .event(relative::Position::Y)?
            .event(relative::Wheel::Vertical)?
            .event(relative::Wheel::Horizontal)?
            // absolute axes sized to the screen
            .event(absolute::Position::X)?
            .min(0)
            .max(max_x)
            .event(absolute::Position::Y)?
            .min(0)
            .max(max_y)
            // mouse buttons
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .event(Mouse::Middle)?;
        // keys for our chords
        for key in [
            keyboard::Key::LeftControl,
            keyboard::Key::LeftAlt,
            keyboard::Key::LeftShift,
            keyboard::Key::LeftMeta,
            keyboard::Key::Tab,
            keyboard::Key::Minus,
            keyboard::Key::Equal,
            keyboard::Key::Esc,
            keyboard::Key::Enter,
            keyboard::Key::Space,
            keyboard::Key::Left,
            keyboard::Key::Right,
            keyboard::Key::Up,
            keyboard::Key::Down,
        ] {
            builder = builder.event(key)?;
        }
        let dev = builder.create()?;

        info!("uinput: created virtual device ({}x{})", screen.0, screen.1);
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: uinput::event::keyboard::Key, val: i32) -> Result<()> {
        self.dev.send(key, val)?;
        Ok(())
    }

    fn click(&mut self, which: MouseButton) -> Result<()> {
        use uinput::event::controller::Mouse;
        let button = match which {
            MouseButton::Left => Mouse::Left,
            MouseButton::Right => Mouse::Right,
            MouseButton::Middle => Mouse::Middle,
        };
        self.dev.send(button, 1)?;
        self.sync()?;
        self.dev.send(button, 0)?;
        self.sync()?;
        Ok(())
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        use uinput::event::relative::Position;
        if dx != 0 {
            self.dev.send(Position::X, dx)?;
        }
        if dy != 0 {
            self.dev.send(Position::Y, dy)?;
        }
        self.sync()
    }

    fn move_absolute(&mut self, x: i32, y: i32) -> Result<()> {
        use uinput::event::absolute::Position;
        self.dev.send(Position::X, x)?;
        self.dev.send(Position::Y, y)?;
        self.sync()
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<()> {
        use uinput::event::relative::Wheel;
        self.dev.send(Wheel::Vertical, steps)?;
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_validation() {
        assert!(check_chord("SUPER+TAB").is_ok());
        assert!(check_chord("ctrl + equal").is_ok());
        assert!(check_chord("CTRL+Q").is_err());
        assert!(check_chord("  ").is_err());
    }

    #[test]
    fn test_button_and_direction_parse() {
        assert_eq!("Right".parse::<MouseButton>(), Ok(MouseButton::Right));
        assert!("side".parse::<MouseButton>().is_err());
        assert_eq!("down".parse::<ScrollDirection>(), Ok(ScrollDirection::Down));
    }

    #[test]
    fn test_noop_sink_accepts_every_action() {
        let mut sink = UinputSink::noop();
        for a in [
            Action::MoveRelative { dx: 5, dy: -3 },
            Action::MoveAbsolute { x: 10, y: 20 },
            Action::Click {
                button: MouseButton::Left,
                count: 2,
            },
            Action::Scroll {
                amount: 3,
                direction: ScrollDirection::Up,
            },
            Action::Hotkey {
                chord: "SUPER+TAB".into(),
            },
        ] {
            assert!(sink.apply(&a).is_ok(), "{a:?}");
        }
    }

    #[test]
    fn test_action_json_shape() {
        let v = serde_json::to_value(Action::Scroll {
            amount: 12,
            direction: ScrollDirection::Down,
        })
        .expect("serialize action");
        assert_eq!(
            v,
            serde_json::json!({"kind": "scroll", "amount": 12, "direction": "down"})
        );
    }
}

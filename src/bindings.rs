//! Profile binding strings, compiled once per load.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::str::FromStr;

use crate::actions::{MouseButton, ScrollDirection, check_chord};
use crate::gestures::Gesture;
use crate::tracker::Role;

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// hand drives the motion filter
    Move,
    Click { button: MouseButton, count: u32 },
    Hotkey(String),
    Scroll(ScrollDirection),
    None,
}

impl FromStr for Binding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "move" {
            return Ok(Binding::Move);
        }
        if s == "none" || s.is_empty() {
            return Ok(Binding::None);
        }
        if let Some(rest) = s.strip_prefix("mouse:") {
            // mouse:left or mouse:left@2
            let (btn, count) = match rest.split_once('@') {
                Some((b, n)) => {
                    let n: u32 = n
                        .trim()
                        .parse()
                        .map_err(|_| anyhow!("bad click count in '{s}'"))?;
                    (b, n)
                }
                None => (rest, 1),
            };
            if count == 0 {
                return Err(anyhow!("click count must be at least 1 in '{s}'"));
            }
            let button = btn.parse::<MouseButton>().map_err(|e| anyhow!(e))?;
            return Ok(Binding::Click { button, count });
        }
        if let Some(rest) = s.strip_prefix("scroll:") {
            let dir = rest.parse::<ScrollDirection>().map_err(|e| anyhow!(e))?;
            return Ok(Binding::Scroll(dir));
        }
        if let Some(rest) = s.strip_prefix("key:") {
            let chord = rest.trim();
            check_chord(chord)?;
            return Ok(Binding::Hotkey(chord.to_ascii_uppercase()));
        }
        Err(anyhow!("invalid action '{s}'"))
    }
}

static UNBOUND: Binding = Binding::None;

/// (role, gesture) → binding. Missing pairs are unbound.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    map: HashMap<(Role, Gesture), Binding>,
}

impl BindingTable {
    /// `flat` maps "right.pointing" style keys to action strings.
    pub fn compile(flat: &HashMap<String, String>) -> Result<Self> {
        let mut map = HashMap::new();
        for (k, v) in flat {
            let (role, gesture) = k
                .split_once('.')
                .ok_or_else(|| anyhow!("binding key '{k}' must look like <left|right>.<gesture>"))?;
            let role: Role = role.parse().map_err(|e: String| anyhow!("binding '{k}': {e}"))?;
            let gesture: Gesture = gesture
                .parse()
                .map_err(|e: String| anyhow!("binding '{k}': {e}"))?;
            let binding: Binding = v.parse().map_err(|e| anyhow!("binding '{k}': {e}"))?;
            if binding != Binding::None {
                map.insert((role, gesture), binding);
            }
        }
        Ok(Self { map })
    }

    pub fn get(&self, role: Role, gesture: Gesture) -> &Binding {
        self.map.get(&(role, gesture)).unwrap_or(&UNBOUND)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// Built-in bindings, flat form.
pub fn default_bindings() -> HashMap<String, String> {
    [
        ("right.pointing", "move"),
        ("right.open_palm", "scroll:down"),
        ("right.victory", "key:SUPER+TAB"),
        ("left.pointing", "mouse:left"),
        ("left.victory", "mouse:right"),
        ("left.open_palm", "scroll:up"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_binding_strings() {
        assert_eq!("move".parse::<Binding>().unwrap(), Binding::Move);
        assert_eq!(
            "mouse:right".parse::<Binding>().unwrap(),
            Binding::Click {
                button: MouseButton::Right,
                count: 1
            }
        );
        assert_eq!(
            "mouse:left@2".parse::<Binding>().unwrap(),
            Binding::Click {
                button: MouseButton::Left,
                count: 2
            }
        );
        assert_eq!(
            "scroll:up".parse::<Binding>().unwrap(),
            Binding::Scroll(ScrollDirection::Up)
        );
        assert_eq!(
            "key:super+tab".parse::<Binding>().unwrap(),
            Binding::Hotkey("SUPER+TAB".into())
        );
        assert_eq!("none".parse::<Binding>().unwrap(), Binding::None);
    }

    #[test]
    fn test_rejects_bad_bindings() {
        for bad in ["mouse:side", "mouse:left@0", "scroll:sideways", "key:CTRL+Q", "cmd:ls", "toggle"] {
            assert!(bad.parse::<Binding>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_default_table() {
        let t = BindingTable::compile(&default_bindings()).unwrap();
        assert_eq!(t.len(), 6);
        assert_eq!(t.get(Role::Right, Gesture::Pointing), &Binding::Move);
        assert_eq!(
            t.get(Role::Left, Gesture::OpenPalm),
            &Binding::Scroll(ScrollDirection::Up)
        );
        assert_eq!(t.get(Role::Left, Gesture::Fist), &Binding::None);
    }

    #[test]
    fn test_bad_keys_fail_compile() {
        assert!(BindingTable::compile(&flat(&[("both.fist", "move")])).is_err());
        assert!(BindingTable::compile(&flat(&[("right.wave", "move")])).is_err());
        assert!(BindingTable::compile(&flat(&[("right", "move")])).is_err());
    }

    #[test]
    fn test_none_is_dropped() {
        let t = BindingTable::compile(&flat(&[("right.fist", "none")])).unwrap();
        assert_eq!(t.len(), 0);
    }
}

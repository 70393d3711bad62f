//! Background mode: open the overlay whenever a global key chord is pressed.

use anyhow::{Context, Result, bail};
use glance_core::Glance;
use rdev::{EventType, Key};
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;

/// A modifier set plus one letter key, e.g. `ctrl+alt+x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hotkey {
    ctrl: bool,
    alt: bool,
    shift: bool,
    meta: bool,
    key: Key,
    letter: char,
}

impl FromStr for Hotkey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mut ctrl, mut alt, mut shift, mut meta) = (false, false, false, false);
        let mut letter = None;

        for part in s.split('+').map(|p| p.trim().to_ascii_lowercase()) {
            match part.as_str() {
                "ctrl" | "control" => ctrl = true,
                "alt" | "option" => alt = true,
                "shift" => shift = true,
                "meta" | "cmd" | "super" | "win" => meta = true,
                key if key.len() == 1 && letter.is_none() => {
                    letter = key.chars().next();
                }
                other => return Err(format!("unexpected '{}' in hotkey", other)),
            }
        }

        let letter = letter.ok_or("hotkey needs one letter key, e.g. ctrl+alt+x")?;
        let key = letter_key(letter).ok_or_else(|| format!("'{}' is not a letter key", letter))?;
        if !(ctrl || alt || shift || meta) {
            return Err("hotkey needs at least one modifier".to_string());
        }

        Ok(Self {
            ctrl,
            alt,
            shift,
            meta,
            key,
            letter,
        })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (held, name) in [
            (self.ctrl, "ctrl+"),
            (self.alt, "alt+"),
            (self.shift, "shift+"),
            (self.meta, "meta+"),
        ] {
            if held {
                f.write_str(name)?;
            }
        }
        write!(f, "{}", self.letter)
    }
}

fn letter_key(c: char) -> Option<Key> {
    Some(match c {
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        _ => return None,
    })
}

/// Follows key events and reports each fresh press of the chord.
///
/// Modifiers must match exactly. Auto-repeat of a held chord fires once.
#[derive(Debug)]
pub struct ChordTracker {
    hotkey: Hotkey,
    // [left, right] of each modifier
    ctrl: [bool; 2],
    alt: [bool; 2],
    shift: [bool; 2],
    meta: [bool; 2],
    key_down: bool,
}

impl ChordTracker {
    pub fn new(hotkey: Hotkey) -> Self {
        Self {
            hotkey,
            ctrl: [false; 2],
            alt: [false; 2],
            shift: [false; 2],
            meta: [false; 2],
            key_down: false,
        }
    }

    /// Returns `true` when `event` completes the chord.
    pub fn on_event(&mut self, event: &EventType) -> bool {
        match event {
            &EventType::KeyPress(key) => {
                if self.set_modifier(key, true) {
                    return false;
                }
                if key != self.hotkey.key {
                    return false;
                }
                let fresh = !self.key_down;
                self.key_down = true;
                fresh && self.modifiers_match()
            }
            &EventType::KeyRelease(key) => {
                if !self.set_modifier(key, false) && key == self.hotkey.key {
                    self.key_down = false;
                }
                false
            }
            _ => false,
        }
    }

    fn set_modifier(&mut self, key: Key, down: bool) -> bool {
        let (slot, side) = match key {
            Key::ControlLeft => (&mut self.ctrl, 0),
            Key::ControlRight => (&mut self.ctrl, 1),
            Key::Alt => (&mut self.alt, 0),
            Key::AltGr => (&mut self.alt, 1),
            Key::ShiftLeft => (&mut self.shift, 0),
            Key::ShiftRight => (&mut self.shift, 1),
            Key::MetaLeft => (&mut self.meta, 0),
            Key::MetaRight => (&mut self.meta, 1),
            _ => return false,
        };
        slot[side] = down;
        true
    }

    fn modifiers_match(&self) -> bool {
        let held = |m: [bool; 2]| m[0] || m[1];
        held(self.ctrl) == self.hotkey.ctrl
            && held(self.alt) == self.hotkey.alt
            && held(self.shift) == self.hotkey.shift
            && held(self.meta) == self.hotkey.meta
    }
}

/// Listens for `hotkey` and opens the overlay on every press, until the
/// listener dies.
pub fn run(app: &Glance, hotkey: Hotkey) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut tracker = ChordTracker::new(hotkey);

    thread::Builder::new()
        .name("hotkey-listener".to_string())
        .spawn(move || {
            let outcome = rdev::listen(move |event| {
                if tracker.on_event(&event.event_type) {
                    log::debug!("Hotkey pressed");
                    let _ = tx.send(());
                }
            });
            if let Err(e) = outcome {
                log::error!("Global hotkey listener failed: {:?}", e);
            }
        })
        .context("Failed to start hotkey listener")?;

    println!("Glance is running. Press {} to select a region, Ctrl+C to quit.", hotkey);

    while rx.recv().is_ok() {
        if let Err(e) = app.run_interactive() {
            log::error!("Overlay failed: {}", e);
        }
        // Presses made while the overlay was open
        while rx.try_recv().is_ok() {}
    }

    bail!("Global hotkey listener stopped (on macOS, grant Accessibility access)")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(key: Key) -> EventType {
        EventType::KeyPress(key)
    }

    fn release(key: Key) -> EventType {
        EventType::KeyRelease(key)
    }

    #[test]
    fn parses_and_prints_hotkeys() {
        let hotkey: Hotkey = "Ctrl + Alt + X".parse().unwrap();
        assert_eq!(hotkey.to_string(), "ctrl+alt+x");
        assert_eq!("cmd+shift+a".parse::<Hotkey>().unwrap().to_string(), "shift+meta+a");

        assert!("x".parse::<Hotkey>().is_err());
        assert!("ctrl+alt".parse::<Hotkey>().is_err());
        assert!("ctrl+1".parse::<Hotkey>().is_err());
        assert!("ctrl+x+y".parse::<Hotkey>().is_err());
        assert!("hyper+x".parse::<Hotkey>().is_err());
    }

    #[test]
    fn fires_once_per_press_of_the_chord() {
        let mut tracker = ChordTracker::new("ctrl+alt+x".parse().unwrap());

        assert!(!tracker.on_event(&press(Key::ControlLeft)));
        assert!(!tracker.on_event(&press(Key::Alt)));
        assert!(tracker.on_event(&press(Key::KeyX)));
        // auto-repeat
        assert!(!tracker.on_event(&press(Key::KeyX)));

        assert!(!tracker.on_event(&release(Key::KeyX)));
        assert!(tracker.on_event(&press(Key::KeyX)));
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let mut tracker = ChordTracker::new("ctrl+alt+x".parse().unwrap());

        assert!(!tracker.on_event(&press(Key::KeyX)));
        tracker.on_event(&release(Key::KeyX));

        tracker.on_event(&press(Key::ControlRight));
        assert!(!tracker.on_event(&press(Key::KeyX)), "alt missing");
        tracker.on_event(&release(Key::KeyX));

        tracker.on_event(&press(Key::AltGr));
        tracker.on_event(&press(Key::ShiftLeft));
        assert!(!tracker.on_event(&press(Key::KeyX)), "extra shift");
        tracker.on_event(&release(Key::KeyX));

        tracker.on_event(&release(Key::ShiftLeft));
        assert!(tracker.on_event(&press(Key::KeyX)));
    }
}

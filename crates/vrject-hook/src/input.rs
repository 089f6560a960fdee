//! Hotkey sampling and synthesized mouse motion.
//!
//! Mouse events go through `SendInput` into the global input stream; any
//! focused application sees them, which is exactly what head-driven
//! mouse-look needs.

use vrject_core::input::EdgeDetector;

use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_MOVE, MOUSEINPUT,
    VIRTUAL_KEY, VK_CONTROL, VK_DOWN, VK_UP,
};

fn key_down(key: VIRTUAL_KEY) -> bool {
    (unsafe { GetAsyncKeyState(key.0 as i32) } as u16 & 0x8000) != 0
}

/// Ctrl+Up / Ctrl+Down separation adjustment, edge-triggered.
#[derive(Debug, Default)]
pub struct Hotkeys {
    increase: EdgeDetector,
    decrease: EdgeDetector,
}

impl Hotkeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample current key levels; returns (increase, decrease) edges.
    pub fn poll(&mut self) -> (bool, bool) {
        let modifier = key_down(VK_CONTROL);
        let increase = self.increase.update(modifier && key_down(VK_UP));
        let decrease = self.decrease.update(modifier && key_down(VK_DOWN));
        (increase, decrease)
    }
}

/// Emit one relative horizontal pointer-motion event.
pub fn send_mouse_motion(dx: i32) {
    let input = INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy: 0,
                mouseData: 0,
                dwFlags: MOUSEEVENTF_MOVE,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };

    unsafe {
        SendInput(&[input], std::mem::size_of::<INPUT>() as i32);
    }
}

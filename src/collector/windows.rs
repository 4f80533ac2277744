//! Windows implementation of event collection using Windows Hooks.
//!
//! This module observes mouse button and keyboard events at the system level
//! using the low-level hook API (SetWindowsHookEx). Hooks are passive: every
//! event is handed on to the next hook unchanged.

use crate::collector::types::{
    ClickEvent, InputEvent, Key, KeyEvent, MouseButton, Point, Transition,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
    HHOOK, KBDLLHOOKSTRUCT, MSG, MSLLHOOKSTRUCT, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN,
    WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_QUIT,
    WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP,
    WINDOWS_HOOK_ID,
};

type HookProc = unsafe extern "system" fn(i32, WPARAM, LPARAM) -> LRESULT;

/// Configuration for which event sources to capture.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub capture_keyboard: bool,
    pub capture_mouse: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_mouse: true,
        }
    }
}

/// The Windows event collector using Windows Hooks.
pub struct WindowsCollector {
    config: CollectorConfig,
    sender: Sender<InputEvent>,
    receiver: Receiver<InputEvent>,
    running: Arc<AtomicBool>,
    /// Id of the hook thread, 0 until its message queue exists
    hook_thread_id: Arc<AtomicU32>,
    thread_handle: Option<JoinHandle<()>>,
}

impl WindowsCollector {
    /// Create a new Windows collector with the given configuration.
    pub fn new(config: CollectorConfig) -> Self {
        // Bounded so a stalled consumer cannot grow memory without limit
        let (sender, receiver) = bounded(10_000);

        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            hook_thread_id: Arc::new(AtomicU32::new(0)),
            thread_handle: None,
        }
    }

    /// Start capturing events in a background thread.
    ///
    /// Returns an error if the collector is already running.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let thread_id = self.hook_thread_id.clone();
        let config = self.config.clone();

        let handle = thread::spawn(move || {
            if let Err(e) = run_hook_loop(sender, thread_id, config) {
                tracing::error!("hook loop failed: {e}");
            }
            running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing events.
    ///
    /// GetMessageW blocks, so the hook thread is woken with WM_QUIT. The
    /// post is repeated until the thread exits because its message queue
    /// may not exist yet when stop is called right after start.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            while !handle.is_finished() {
                let id = self.hook_thread_id.load(Ordering::SeqCst);
                if id != 0 {
                    unsafe {
                        let _ = PostThreadMessageW(id, WM_QUIT, WPARAM(0), LPARAM(0));
                    }
                }
                thread::sleep(Duration::from_millis(10));
            }
            let _ = handle.join();
            self.hook_thread_id.store(0, Ordering::SeqCst);
        }
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for input events.
    pub fn receiver(&self) -> &Receiver<InputEvent> {
        &self.receiver
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<InputEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for WindowsCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    HookInstallationFailed,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::HookInstallationFailed => {
                write!(f, "Failed to install Windows hook")
            }
        }
    }
}

impl std::error::Error for CollectorError {}

// Hook procedures are plain functions invoked on the installing thread,
// so the sender lives in that thread's local storage.
thread_local! {
    static EVENT_SENDER: std::cell::RefCell<Option<Sender<InputEvent>>> = const { std::cell::RefCell::new(None) };
}

fn send_event(event: InputEvent) {
    EVENT_SENDER.with(|sender| {
        if let Some(ref s) = *sender.borrow() {
            let _ = s.try_send(event);
        }
    });
}

/// Low-level keyboard hook callback.
unsafe extern "system" fn keyboard_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code >= 0 {
        let kb_struct = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
        let message = w_param.0 as u32;

        if matches!(message, WM_KEYDOWN | WM_KEYUP | WM_SYSKEYDOWN | WM_SYSKEYUP) {
            let is_key_down = matches!(message, WM_KEYDOWN | WM_SYSKEYDOWN);
            let key = Key::from_windows_vk(kb_struct.vkCode);
            send_event(InputEvent::Key(KeyEvent::new(key, is_key_down)));
        }
    }

    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

/// Low-level mouse hook callback.
unsafe extern "system" fn mouse_hook_proc(
    n_code: i32,
    w_param: WPARAM,
    l_param: LPARAM,
) -> LRESULT {
    if n_code >= 0 {
        let mouse_struct = &*(l_param.0 as *const MSLLHOOKSTRUCT);

        let button = match w_param.0 as u32 {
            WM_LBUTTONDOWN => Some((MouseButton::Left, Transition::Down)),
            WM_LBUTTONUP => Some((MouseButton::Left, Transition::Up)),
            WM_RBUTTONDOWN => Some((MouseButton::Right, Transition::Down)),
            WM_RBUTTONUP => Some((MouseButton::Right, Transition::Up)),
            WM_MBUTTONDOWN => Some((MouseButton::Middle, Transition::Down)),
            WM_MBUTTONUP => Some((MouseButton::Middle, Transition::Up)),
            WM_XBUTTONDOWN => Some((MouseButton::Other, Transition::Down)),
            WM_XBUTTONUP => Some((MouseButton::Other, Transition::Up)),
            // Movement and wheel are not needed
            _ => None,
        };

        if let Some((button, transition)) = button {
            let position = Point::new(mouse_struct.pt.x as f64, mouse_struct.pt.y as f64);
            send_event(InputEvent::Click(ClickEvent::new(
                button,
                transition,
                Some(position),
            )));
        }
    }

    CallNextHookEx(HHOOK::default(), n_code, w_param, l_param)
}

/// Run the Windows hook message loop.
fn run_hook_loop(
    sender: Sender<InputEvent>,
    thread_id: Arc<AtomicU32>,
    config: CollectorConfig,
) -> Result<(), CollectorError> {
    EVENT_SENDER.with(|s| {
        *s.borrow_mut() = Some(sender);
    });

    unsafe {
        let mut hooks: Vec<HHOOK> = Vec::new();

        let mut procs: Vec<(WINDOWS_HOOK_ID, HookProc)> = Vec::new();
        if config.capture_keyboard {
            procs.push((WH_KEYBOARD_LL, keyboard_hook_proc));
        }
        if config.capture_mouse {
            procs.push((WH_MOUSE_LL, mouse_hook_proc));
        }

        for (kind, proc_fn) in procs {
            match SetWindowsHookExW(kind, Some(proc_fn), HINSTANCE::default(), 0) {
                Ok(hook) => hooks.push(hook),
                Err(_) => {
                    for hook in hooks {
                        let _ = UnhookWindowsHookEx(hook);
                    }
                    return Err(CollectorError::HookInstallationFailed);
                }
            }
        }

        // Publish the id only now, so WM_QUIT cannot arrive before the hooks exist
        thread_id.store(GetCurrentThreadId(), Ordering::SeqCst);

        let mut msg = MSG::default();
        loop {
            // > 0: message (hooks have already run), 0: WM_QUIT, < 0: error
            let result = GetMessageW(&mut msg, HWND::default(), 0, 0);
            if result.0 <= 0 {
                break;
            }
        }

        for hook in hooks {
            let _ = UnhookWindowsHookEx(hook);
        }
    }

    EVENT_SENDER.with(|s| {
        *s.borrow_mut() = None;
    });

    Ok(())
}

/// Check if the application can install low-level hooks.
///
/// Low-level hooks generally work without explicit permission but may be
/// refused to processes with insufficient privileges.
pub fn check_permission() -> bool {
    unsafe {
        match SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), HINSTANCE::default(), 0) {
            Ok(hook) => {
                let _ = UnhookWindowsHookEx(hook);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert!(config.capture_keyboard);
        assert!(config.capture_mouse);
    }

    #[test]
    fn test_collector_creation() {
        let collector = WindowsCollector::new(CollectorConfig::default());
        assert!(!collector.is_running());
    }
}

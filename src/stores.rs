//! Process-wide stores shared by the reducer and the shell.
//!
//! Both are created lazily on first use and live for the whole process.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, OnceLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub level: NoticeLevel,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuestIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl GuestIdentity {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

const MAX_NOTICES: usize = 32;

static NOTICES: OnceLock<Mutex<VecDeque<Notice>>> = OnceLock::new();
static GUEST: OnceLock<Mutex<GuestIdentity>> = OnceLock::new();

fn notices() -> &'static Mutex<VecDeque<Notice>> {
    NOTICES.get_or_init(|| Mutex::new(VecDeque::new()))
}

fn guest() -> &'static Mutex<GuestIdentity> {
    GUEST.get_or_init(|| Mutex::new(GuestIdentity::default()))
}

// A poisoned store still holds usable data.
fn lock<T>(m: &'static Mutex<T>) -> MutexGuard<'static, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Queue a notice for the status bar; the oldest is dropped when full.
pub fn notify(level: NoticeLevel, text: impl Into<String>) {
    let mut q = lock(notices());
    if q.len() >= MAX_NOTICES {
        q.pop_front();
    }
    q.push_back(Notice {
        text: text.into(),
        level,
    });
}

pub fn drain_notices() -> Vec<Notice> {
    lock(notices()).drain(..).collect()
}

pub fn set_guest(identity: GuestIdentity) {
    *lock(guest()) = identity;
}

pub fn guest_identity() -> GuestIdentity {
    lock(guest()).clone()
}

pub fn clear_guest() {
    *lock(guest()) = GuestIdentity::default();
}

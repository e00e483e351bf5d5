use std::{
    path::PathBuf,
    sync::{Mutex, OnceLock},
};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const VARS: [&str; 2] = ["ANIMEGAN_HOME", "ANIMEGAN_BACKEND"];

/// Points `ANIMEGAN_HOME` at a scratch dir and clears the backend override.
pub struct AnimeganEnvGuard {
    previous: Vec<(&'static str, Option<String>)>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl AnimeganEnvGuard {
    pub fn set_home(path: PathBuf) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let previous = VARS
            .iter()
            .map(|name| (*name, std::env::var(name).ok()))
            .collect();
        // SAFETY: tests run under a global lock to prevent concurrent env mutations.
        unsafe {
            std::env::set_var("ANIMEGAN_HOME", path);
            std::env::remove_var("ANIMEGAN_BACKEND");
        }
        Self {
            previous,
            _lock: lock,
        }
    }

    pub fn set_backend(&self, value: &str) {
        // SAFETY: the guard holds the global env lock.
        unsafe {
            std::env::set_var("ANIMEGAN_BACKEND", value);
        }
    }
}

impl Drop for AnimeganEnvGuard {
    fn drop(&mut self) {
        for (name, value) in self.previous.drain(..) {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                match value {
                    Some(value) => std::env::set_var(name, value),
                    None => std::env::remove_var(name),
                }
            }
        }
    }
}

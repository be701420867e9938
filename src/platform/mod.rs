//! Facts about the machine the backup runs on.

mod macos;
mod windows;

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Exclude patterns applied unless the user opts out.
    pub fn default_excludes(&self) -> Vec<String> {
        let patterns: &[&str] = match self {
            Self::Linux => &[],
            Self::MacOs => macos::EXCLUDES,
            Self::Windows => windows::EXCLUDES,
        };
        patterns.iter().map(|p| p.to_string()).collect()
    }
}

/// Name of the user running the backup.
pub fn username() -> Option<String> {
    #[cfg(unix)]
    {
        use nix::unistd::{Uid, User};

        if let Ok(Some(user)) = User::from_uid(Uid::current()) {
            return Some(user.name);
        }
    }

    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.is_empty())
}

/// The user's home directory, the default backup source.
pub fn home_dir() -> Option<PathBuf> {
    let from_env = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    if let Some(home) = std::env::var_os(from_env).filter(|h| !h.is_empty()) {
        return Some(PathBuf::from(home));
    }

    #[cfg(unix)]
    {
        use nix::unistd::{Uid, User};

        if let Ok(Some(user)) = User::from_uid(Uid::current()) {
            return Some(user.dir);
        }
    }

    None
}

//! Custom macros for reducing code repetition in rota

/// Log an error and continue execution (non-fatal error handling)
///
/// # Example
/// ```
/// log_and_continue!(downloader.fetch_one(), "download wallpaper");
/// ```
#[macro_export]
macro_rules! log_and_continue {
    ($expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            log::error!("Failed to {}: {:#}", $context, e);
        }
    };
}

/// Lock a `std::sync::Mutex`, recovering the data if a previous holder panicked
///
/// # Example
/// ```
/// let mut history = locked!(self.history);
/// ```
#[macro_export]
macro_rules! locked {
    ($mutex:expr) => {
        $mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```
/// validate_enum!(kind, "image", "folder", "favorites", "command");
/// validate_enum!(store, "gnome", "file");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok::<(), anyhow::Error>(()),
            _ => anyhow::bail!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", ")),
        }
    };
}

use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Mediqueue";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minutes of estimated wait added per patient already in line.
pub const ESTIMATED_MINUTES_PER_PATIENT: i64 = 10;

/// Retries of ticket allocation after a uniqueness collision before the
/// creation fails. Collisions only happen under concurrent creation for
/// the same service point and day.
pub const ALLOCATION_RETRY_LIMIT: u32 = 3;

/// Default number of tickets a public display board shows.
pub const DEFAULT_MAX_DISPLAY: i64 = 10;

/// Default refresh interval advertised to display boards, in seconds.
pub const DEFAULT_REFRESH_SECONDS: i64 = 15;

/// Default log filter when RUST_LOG is not set
pub fn default_log_filter() -> String {
    format!("info,{}=debug", env!("CARGO_PKG_NAME"))
}

/// Get the application data directory
/// ~/Mediqueue/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Mediqueue")
}

/// Get the directory holding per-facility database files
pub fn facilities_dir() -> PathBuf {
    app_data_dir().join("facilities")
}

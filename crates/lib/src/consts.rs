//! Constants shared across kiln.

/// Folded into every action hash key. Changing it invalidates all caches.
pub const TOOL_VERSION: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"));

/// Default name of the declarative build file.
pub const BUILD_FILE_NAME: &str = "kiln.toml";

/// Default build directory, relative to the build file.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Name of the persisted state file inside the build directory.
pub const STATE_FILE_NAME: &str = "kiln-state.json";

/// Current version of the state file format.
pub const STATE_VERSION: u32 = 1;

/// Default interval between polls of in-flight actions.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Backend name recorded when actions are run by the native engine.
pub const NATIVE_BACKEND: &str = "native";

/// Backend name recorded when the graph is exported to ninja.
pub const NINJA_BACKEND: &str = "ninja";

/// Reserved pool: run alone, attached to the invoking terminal.
pub const CONSOLE_POOL: &str = "console";

/// Exit code reported when the build is interrupted by the user.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Exit code reported when a command cannot be spawned.
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Metadata file name inside a local stash entry.
pub const STASH_META_FILE: &str = "stash.json";

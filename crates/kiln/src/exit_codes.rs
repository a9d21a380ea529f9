//! Exit codes for the CLI

/// Success
pub const SUCCESS: u8 = 0;

/// A task failed or an input was missing
pub const ERROR: u8 = 1;

/// Configuration or command-line error
pub const CONFIG_ERROR: u8 = 2;

/// Declaration or task reference error; nothing ran
pub const SETUP_ERROR: u8 = 3;

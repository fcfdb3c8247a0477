//! Centralized limits and tuning constants for the serving layer.
//!
//! Runtime-tunable values (cache TTL, store timeout) only provide their
//! defaults here; `EngineConfig` can override them.

// Cache and store ----------------------------------------------------------
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 8;

// Take model ---------------------------------------------------------------
pub const STATEMENT_MAX_CHARS: usize = 280;
pub const INTENSITY_MIN: u8 = 1;
pub const INTENSITY_MAX: u8 = 5;
pub const DEFAULT_INTENSITY: u8 = 3;

// Votes --------------------------------------------------------------------
pub const EXPLANATION_MAX_CHARS: usize = 280;

// Stance card token --------------------------------------------------------
pub const CARD_SIZE: usize = 6;
pub const ENTRY_SEPARATOR: char = '|';
pub const STANCE_SEPARATOR: char = '.';
pub const AGREE_CHAR: char = 'a';
pub const DISAGREE_CHAR: char = 'd';

//! Machine parameters, target info, and the process-wide search knobs.
//!
//! Mirrors the teacher crate's convention of a plain params struct plus a
//! handful of env-var-backed knobs read once at start-up rather than a
//! thread-local global (see `DESIGN.md` for why: reproducible tests).

use std::env;
use std::time::Duration;

/// Machine characteristics the cost model is calibrated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineParams {
    /// Number of independent parallel execution units.
    pub parallelism: i64,
    /// Size, in bytes, of the last level of cache.
    pub last_level_cache_size: i64,
    /// Dimensionless constant relating a cold cache load to its cost;
    /// `cold_load(last_level_cache_size) == balance`.
    pub balance: f64,
}

impl MachineParams {
    pub fn new(parallelism: i64, last_level_cache_size: i64, balance: f64) -> Self {
        Self {
            parallelism,
            last_level_cache_size,
            balance,
        }
    }
}

impl Default for MachineParams {
    fn default() -> Self {
        Self::new(16, 16 * 1024 * 1024, 40.0)
    }
}

/// Stands in for the target-specific "natural vector width" query the real
/// compiler exposes. Width is indexed by the narrowest scalar size (bytes)
/// appearing in a function's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    /// Width, in bytes, of one SIMD register on the target.
    pub native_vector_bytes: usize,
}

impl TargetInfo {
    pub fn new(native_vector_bytes: usize) -> Self {
        Self {
            native_vector_bytes,
        }
    }

    /// Natural vector width (in elements) for a scalar of `scalar_bytes` bytes.
    pub fn natural_vector_size(&self, scalar_bytes: usize) -> i64 {
        let scalar_bytes = scalar_bytes.max(1);
        (self.native_vector_bytes / scalar_bytes).max(1) as i64
    }
}

impl Default for TargetInfo {
    fn default() -> Self {
        // A generic 256-bit SIMD target (e.g. x86-64 AVX2).
        Self::new(32)
    }
}

const ENV_RANDOM_DROPOUT: &str = "AUTOSCHED_RANDOM_DROPOUT";
const ENV_RANDOM_SEED: &str = "AUTOSCHED_RANDOM_SEED";
const ENV_BEAM_SIZE: &str = "AUTOSCHED_BEAM_SIZE";
const ENV_TIME_LIMIT: &str = "AUTOSCHED_AUTO_SCHEDULE_TIME_LIMIT";

/// Process-wide knobs for the beam search driver, normally read once from
/// the environment at start-up (see the `ENV_*` constants above) and then
/// threaded explicitly through the driver — never read from the
/// environment again mid-search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Acceptance threshold (0-100) used during beam trimming; 100 disables
    /// dropout (every surviving state up to `beam_size` is kept).
    pub random_dropout: u8,
    /// Seed for the dropout RNG. Two runs with the same seed, DAG, and
    /// `beam_size` produce the same schedule.
    pub random_seed: u64,
    /// Maximum queue size retained after each beam-trimming pass.
    pub beam_size: usize,
    /// When set, enables iterative-widening: doubling the beam size until
    /// half the time limit has elapsed.
    pub time_limit: Option<Duration>,
}

impl SearchConfig {
    /// Read configuration from the environment, falling back to the
    /// documented defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            random_dropout: env::var(ENV_RANDOM_DROPOUT)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            random_seed: env::var(ENV_RANDOM_SEED)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| {
                    use std::time::{SystemTime, UNIX_EPOCH};
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_nanos() as u64)
                        .unwrap_or(0)
                }),
            beam_size: env::var(ENV_BEAM_SIZE)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            time_limit: env::var(ENV_TIME_LIMIT)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|secs| *secs > 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            random_dropout: 100,
            random_seed: 0,
            beam_size: 20,
            time_limit: None,
        }
    }
}

//! Arena configuration parameters.

use std::fmt;
use std::path::PathBuf;

use crate::error::ArenaError;

/// Whether the backing buffer is sized exactly or padded by a ratio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AllocationPolicy {
    /// Size the buffer exactly as requested.
    Strict,
    /// Pad the buffer by [`ArenaConfig::overallocation_limit`], once per
    /// arena lifetime.
    #[default]
    Overallocate,
}

/// When bump offsets return to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResetPolicy {
    /// Reset offsets every time the scope closes.
    #[default]
    BlockLeft,
    /// Ring buffer: keep bumping across scopes and wrap to zero when the
    /// end of the buffer is reached.
    EndOfBuffer,
}

/// What happens when a request does not fit into the buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpillPolicy {
    /// Report [`ArenaError::CapacityExceeded`].
    Fail,
    /// Serve the request from a standalone external allocation.
    #[default]
    External,
    /// Serve externally and let the next learning pass grow the buffer.
    Reallocate,
}

/// When the arena resizes its buffer from observed usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LearningPolicy {
    /// Never resize.
    None,
    /// Size the buffer once, after the first full cycle.
    #[default]
    FirstLoop,
    /// Keep resizing after every cycle that outgrew the buffer, once
    /// [`ArenaConfig::cycles_before_initialization`] cycles have passed.
    OverTime,
}

/// Where the backing buffer lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LocationPolicy {
    /// Plain host memory from the memory provider.
    #[default]
    Ram,
    /// A memory-mapped file.
    Mmap,
}

/// Manager-wide debugging switch, pushed down to every arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DebugMode {
    /// Normal operation.
    #[default]
    Disabled,
    /// Bypass the bump path: every request spills and nothing resizes.
    SpillEverything,
}

impl fmt::Display for ResetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockLeft => f.write_str("block-left"),
            Self::EndOfBuffer => f.write_str("end-of-buffer"),
        }
    }
}

/// Configuration for one arena.
///
/// Validated once at arena construction; all values are immutable after
/// that. Sizes are in bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct ArenaConfig {
    /// Capacity allocated at construction. Zero defers allocation to the
    /// first learning pass.
    pub initial_size: usize,

    /// Floor applied last when the learning pass computes a new size.
    pub min_size: usize,

    /// Ceiling for learned sizes. Zero means unbounded.
    pub max_size: usize,

    /// Over-allocation ratio.
    ///
    /// Default: 0.3 (30% headroom). For ring buffers with
    /// [`AllocationPolicy::Overallocate`] this also sets the number of
    /// closes per step (`ratio + 1`), so it must be at least 1.0 there.
    pub overallocation_limit: f64,

    /// Cycles to observe before [`LearningPolicy::OverTime`] starts resizing.
    pub cycles_before_initialization: u64,

    /// Exact vs. over-allocated sizing.
    pub policy_allocation: AllocationPolicy,

    /// Reset-on-close vs. ring buffer.
    pub policy_reset: ResetPolicy,

    /// Overflow behaviour.
    pub policy_spill: SpillPolicy,

    /// Growth behaviour.
    pub policy_learning: LearningPolicy,

    /// Backing storage.
    pub policy_location: LocationPolicy,

    /// Explicit backing file for [`LocationPolicy::Mmap`]. When unset a
    /// temporary file is created.
    pub temp_file_path: Option<PathBuf>,
}

impl ArenaConfig {
    /// Default over-allocation ratio.
    pub const DEFAULT_OVERALLOCATION_LIMIT: f64 = 0.3;

    /// Default number of cycles before over-time learning kicks in.
    pub const DEFAULT_CYCLES_BEFORE_INITIALIZATION: u64 = 0;

    /// Largest over-allocation ratio a ring-buffer arena accepts.
    pub const MAX_RING_RATIO: f64 = u32::MAX as f64;

    /// Create a config with the given initial size and defaults elsewhere.
    pub fn new(initial_size: usize) -> Self {
        Self {
            initial_size,
            min_size: 0,
            max_size: 0,
            overallocation_limit: Self::DEFAULT_OVERALLOCATION_LIMIT,
            cycles_before_initialization: Self::DEFAULT_CYCLES_BEFORE_INITIALIZATION,
            policy_allocation: AllocationPolicy::default(),
            policy_reset: ResetPolicy::default(),
            policy_spill: SpillPolicy::default(),
            policy_learning: LearningPolicy::default(),
            policy_location: LocationPolicy::default(),
            temp_file_path: None,
        }
    }

    /// Set the size floor.
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the size ceiling (0 = unbounded).
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the over-allocation ratio.
    pub fn with_overallocation_limit(mut self, ratio: f64) -> Self {
        self.overallocation_limit = ratio;
        self
    }

    /// Set the warm-up cycle count for over-time learning.
    pub fn with_cycles_before_initialization(mut self, cycles: u64) -> Self {
        self.cycles_before_initialization = cycles;
        self
    }

    /// Set the allocation policy.
    pub fn with_allocation(mut self, policy: AllocationPolicy) -> Self {
        self.policy_allocation = policy;
        self
    }

    /// Set the reset policy.
    pub fn with_reset(mut self, policy: ResetPolicy) -> Self {
        self.policy_reset = policy;
        self
    }

    /// Set the spill policy.
    pub fn with_spill(mut self, policy: SpillPolicy) -> Self {
        self.policy_spill = policy;
        self
    }

    /// Set the learning policy.
    pub fn with_learning(mut self, policy: LearningPolicy) -> Self {
        self.policy_learning = policy;
        self
    }

    /// Set the storage location.
    pub fn with_location(mut self, policy: LocationPolicy) -> Self {
        self.policy_location = policy;
        self
    }

    /// Back a memory-mapped arena with an explicit file.
    pub fn with_temp_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_file_path = Some(path.into());
        self
    }

    /// Whether this arena runs in ring-buffer mode.
    pub fn is_ring(&self) -> bool {
        self.policy_reset == ResetPolicy::EndOfBuffer
    }

    /// Number of scope closes that make up one ring step.
    pub fn steps_per_wrap(&self) -> u64 {
        if self.is_ring() && self.policy_allocation == AllocationPolicy::Overallocate {
            // Validation bounds the ratio to `1.0..=MAX_RING_RATIO`.
            (self.overallocation_limit as u64).saturating_add(1)
        } else {
            1
        }
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<(), ArenaError> {
        if !self.overallocation_limit.is_finite() || self.overallocation_limit < 0.0 {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "overallocation_limit must be finite and >= 0 (got {})",
                    self.overallocation_limit
                ),
            });
        }

        if self.is_ring()
            && self.policy_allocation == AllocationPolicy::Overallocate
            && self.overallocation_limit < 1.0
        {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "ring-buffer arenas with over-allocation need overallocation_limit >= 1.0 \
                     (got {})",
                    self.overallocation_limit
                ),
            });
        }

        if self.is_ring()
            && self.policy_allocation == AllocationPolicy::Overallocate
            && self.overallocation_limit > Self::MAX_RING_RATIO
        {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "ring-buffer overallocation_limit must not exceed {} \
                     (got {})",
                    Self::MAX_RING_RATIO,
                    self.overallocation_limit
                ),
            });
        }

        if self.max_size > 0 && self.min_size > self.max_size {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "min_size {} exceeds max_size {}",
                    self.min_size, self.max_size
                ),
            });
        }

        if self.policy_location == LocationPolicy::Mmap {
            if self.policy_learning != LearningPolicy::None {
                return Err(ArenaError::InvalidConfig {
                    reason: "memory-mapped arenas cannot use a learning policy".to_string(),
                });
            }
            if self.initial_size == 0 && self.temp_file_path.is_none() {
                return Err(ArenaError::InvalidConfig {
                    reason: "memory-mapped arenas need initial_size > 0 or an explicit file"
                        .to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

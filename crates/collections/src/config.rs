//! Container configuration

/// Configuration shared by every container backed by a [`RawBuffer`]
///
/// [`RawBuffer`]: crate::buffer::RawBuffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Zero-fill newly allocated capacity
    pub clear_memory: bool,

    /// Fill pattern byte written over memory right before it is freed (for debugging)
    pub free_pattern: Option<u8>,

    /// Minimum number of elements added when a growable container reallocates
    pub min_growth: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            clear_memory: false,
            free_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
            min_growth: 1,
        }
    }
}

impl ContainerConfig {
    /// Production configuration - no extra memory traffic
    #[must_use]
    pub fn production() -> Self {
        Self {
            clear_memory: false,
            free_pattern: None,
            min_growth: 1,
        }
    }

    /// Debug configuration - deterministic memory contents
    #[must_use]
    pub fn debug() -> Self {
        Self {
            clear_memory: true,
            free_pattern: Some(0xDD),
            min_growth: 1,
        }
    }

    /// Set whether fresh capacity is zero-filled
    #[must_use = "builder methods must be chained or built"]
    pub fn with_clear_memory(mut self, clear: bool) -> Self {
        self.clear_memory = clear;
        self
    }

    /// Set the poison byte written before memory is released
    #[must_use = "builder methods must be chained or built"]
    pub fn with_free_pattern(mut self, pattern: Option<u8>) -> Self {
        self.free_pattern = pattern;
        self
    }

    /// Set the minimum growth step in elements (clamped to at least one)
    #[must_use = "builder methods must be chained or built"]
    pub fn with_min_growth(mut self, elements: usize) -> Self {
        self.min_growth = elements.max(1);
        self
    }

    /// Capacity to grow to when `required` elements do not fit in `current`
    pub(crate) fn grown_capacity(&self, current: usize, required: usize) -> usize {
        current
            .saturating_mul(2)
            .max(current.saturating_add(self.min_growth))
            .max(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_doubles_with_minimum_step() {
        let config = ContainerConfig::production();
        assert_eq!(config.grown_capacity(0, 1), 1);
        assert_eq!(config.grown_capacity(1, 2), 2);
        assert_eq!(config.grown_capacity(8, 9), 16);
    }

    #[test]
    fn min_growth_applies_to_small_buffers() {
        let config = ContainerConfig::production().with_min_growth(16);
        assert_eq!(config.grown_capacity(0, 1), 16);
        assert_eq!(config.grown_capacity(4, 5), 20);
        assert_eq!(config.grown_capacity(64, 65), 128);
    }

    #[test]
    fn min_growth_is_never_zero() {
        let config = ContainerConfig::default().with_min_growth(0);
        assert_eq!(config.min_growth, 1);
    }

    #[test]
    fn debug_preset_clears_and_poisons() {
        let config = ContainerConfig::debug();
        assert!(config.clear_memory);
        assert_eq!(config.free_pattern, Some(0xDD));
    }
}

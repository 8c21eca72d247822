//! Engine limits shared by services, feeds and listings.

/// Bounds applied at the command boundary.
///
/// `take` values of 0 fall back to the matching default; larger values are
/// clamped to the matching maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub feed_default_take: usize,
    pub feed_max_take: usize,
    pub list_default_take: usize,
    pub list_max_take: usize,
    pub trash_default_take: usize,
    pub trash_max_take: usize,
    pub max_name_chars: usize,
    pub max_description_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_default_take: 100,
            feed_max_take: 500,
            list_default_take: 100,
            list_max_take: 500,
            trash_default_take: 100,
            trash_max_take: 1000,
            max_name_chars: 200,
            max_description_chars: 100_000,
        }
    }
}

impl EngineConfig {
    pub fn feed_take(&self, take: usize) -> usize {
        clamp_take(take, self.feed_default_take, self.feed_max_take)
    }

    pub fn list_take(&self, take: usize) -> usize {
        clamp_take(take, self.list_default_take, self.list_max_take)
    }

    pub fn trash_take(&self, take: usize) -> usize {
        clamp_take(take, self.trash_default_take, self.trash_max_take)
    }
}

fn clamp_take(take: usize, default_take: usize, max_take: usize) -> usize {
    if take == 0 {
        default_take.min(max_take)
    } else {
        take.min(max_take)
    }
}

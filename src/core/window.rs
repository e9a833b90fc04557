//! Block-window selection for the event scan.

/// Default overlap between consecutive scan windows, in blocks.
pub const DEFAULT_BLOCK_MARGIN: u64 = 2;

/// Inclusive range of blocks scanned in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockWindow {
    /// Number of blocks covered, both ends included. Zero for an inverted range.
    #[must_use]
    pub fn len(&self) -> u64 {
        if self.from_block > self.to_block {
            0
        } else {
            self.to_block - self.from_block + 1
        }
    }

    /// True only for an inverted range; [`WindowSelector`] never produces one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, block: u64) -> bool {
        (self.from_block..=self.to_block).contains(&block)
    }
}

/// Chooses `[head - margin, head]` for each tick.
///
/// The overlap tolerates head movement between ticks and finality lag near
/// the boundary, at the cost of re-observing signals from the previous window.
#[derive(Debug, Clone, Copy)]
pub struct WindowSelector {
    margin: u64,
}

impl WindowSelector {
    #[must_use]
    pub fn new(margin: u64) -> Self {
        Self { margin }
    }

    #[must_use]
    pub fn margin(&self) -> u64 {
        self.margin
    }

    /// Window for a freshly read chain head. Saturates at genesis.
    #[must_use]
    pub fn select(&self, head: u64) -> BlockWindow {
        BlockWindow {
            from_block: head.saturating_sub(self.margin),
            to_block: head,
        }
    }
}

impl Default for WindowSelector {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_MARGIN)
    }
}

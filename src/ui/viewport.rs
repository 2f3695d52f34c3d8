/// Extra messages rendered beyond the visible range on each side, to mask
/// pop-in while scrolling.
pub const OVERSCAN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemHeight {
    Estimated(usize),
    Measured(usize),
}

impl ItemHeight {
    fn rows(self) -> usize {
        match self {
            Self::Estimated(rows) | Self::Measured(rows) => rows,
        }
    }
}

/// Windowed geometry over the transcript: one height per message (estimated
/// until measured) and a prefix-sum offset table, so only the messages
/// covering the viewport are ever laid out.
///
/// `prefix_sums[i]` is the total height of messages `0..=i`; lookups binary
/// search it. While the newest message is streaming, `auto_scroll` keeps the
/// scroll offset anchored to the bottom even as that message's height keeps
/// changing under the viewport.
pub struct TranscriptViewport {
    heights: Vec<ItemHeight>,
    prefix_sums: Vec<usize>,
    width: usize,
    scroll_offset: usize,
    auto_scroll: bool,
}

impl TranscriptViewport {
    pub fn new() -> Self {
        Self {
            heights: Vec::new(),
            prefix_sums: Vec::new(),
            width: 0,
            scroll_offset: 0,
            auto_scroll: true,
        }
    }

    /// Reconcile with the live transcript at the top of a frame. A width
    /// change demotes every measurement back to an estimate; while a message
    /// is still streaming its height is re-estimated each frame because any
    /// earlier measurement is stale the moment more text lands.
    pub fn begin_frame<F>(&mut self, width: usize, len: usize, streaming: bool, mut estimate: F)
    where
        F: FnMut(usize) -> usize,
    {
        let width = width.max(1);
        if width != self.width {
            self.width = width;
            for (idx, slot) in self.heights.iter_mut().enumerate() {
                *slot = ItemHeight::Estimated(estimate(idx).max(1));
            }
        }

        if len < self.heights.len() {
            self.heights.truncate(len);
        }
        while self.heights.len() < len {
            let idx = self.heights.len();
            self.heights.push(ItemHeight::Estimated(estimate(idx).max(1)));
        }

        if streaming && len > 0 {
            self.heights[len - 1] = ItemHeight::Estimated(estimate(len - 1).max(1));
        }

        self.rebuild_prefix_sums(0);
    }

    /// Record the true laid-out height for one message. Correcting an entry
    /// only rebuilds offsets from that index on. Indices that have scrolled
    /// out of tracking (e.g. a measurement raced a clear) are ignored.
    pub fn set_measured(&mut self, idx: usize, rows: usize) {
        if idx >= self.heights.len() {
            return;
        }
        let measured = ItemHeight::Measured(rows.max(1));
        if self.heights[idx] == measured {
            return;
        }
        self.heights[idx] = measured;
        self.rebuild_prefix_sums(idx);
    }

    fn rebuild_prefix_sums(&mut self, from: usize) {
        self.prefix_sums.truncate(from);
        let mut acc = if from == 0 {
            0
        } else {
            self.prefix_sums[from - 1]
        };
        for &height in &self.heights[from..] {
            acc += height.rows();
            self.prefix_sums.push(acc);
        }
    }

    /// Total scroll extent: the sum of all message heights.
    pub fn total_rows(&self) -> usize {
        self.prefix_sums.last().copied().unwrap_or(0)
    }

    /// Cumulative height of messages before `idx`.
    pub fn offset_of(&self, idx: usize) -> usize {
        if idx == 0 {
            0
        } else {
            self.prefix_sums.get(idx - 1).copied().unwrap_or(0)
        }
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn max_scroll(&self, viewport_rows: usize) -> usize {
        self.total_rows().saturating_sub(viewport_rows)
    }

    /// Settle the scroll position for this frame: stick to the bottom while
    /// auto-scroll is engaged, otherwise clamp to the valid range.
    pub fn finish_frame(&mut self, viewport_rows: usize) {
        let max = self.max_scroll(viewport_rows);
        if self.auto_scroll {
            self.scroll_offset = max;
        } else {
            self.scroll_offset = self.scroll_offset.min(max);
        }
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(rows);
        self.auto_scroll = false;
    }

    /// Scrolling back down to the end re-engages stick-to-bottom.
    pub fn scroll_down(&mut self, rows: usize, viewport_rows: usize) {
        let max = self.max_scroll(viewport_rows);
        self.scroll_offset = self.scroll_offset.saturating_add(rows).min(max);
        if self.scroll_offset == max {
            self.auto_scroll = true;
        }
    }

    pub fn scroll_to_bottom(&mut self, viewport_rows: usize) {
        self.auto_scroll = true;
        self.scroll_offset = self.max_scroll(viewport_rows);
    }

    pub fn is_pinned_to_bottom(&self) -> bool {
        self.auto_scroll
    }

    /// The minimal contiguous message range covering the viewport, widened by
    /// [`OVERSCAN`] on each side. `None` when there is nothing to show.
    pub fn window(&self, viewport_rows: usize) -> Option<(usize, usize)> {
        let n = self.heights.len();
        if n == 0 {
            return None;
        }
        let first = self
            .prefix_sums
            .partition_point(|&sum| sum <= self.scroll_offset)
            .min(n - 1);
        let bottom_row = self.scroll_offset + viewport_rows.max(1) - 1;
        let last = self
            .prefix_sums
            .partition_point(|&sum| sum <= bottom_row)
            .min(n - 1);

        let lo = first.saturating_sub(OVERSCAN);
        let hi = (last + OVERSCAN).min(n - 1);
        Some((lo, hi))
    }
}

impl Default for TranscriptViewport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(len: usize, rows: usize) -> TranscriptViewport {
        let mut viewport = TranscriptViewport::new();
        viewport.begin_frame(80, len, false, |_| rows);
        viewport
    }

    #[test]
    fn test_window_size_is_independent_of_transcript_length() {
        let viewport_rows = 600;
        let mut viewport = uniform(1000, 3);
        viewport.finish_frame(viewport_rows);

        let (lo, hi) = viewport.window(viewport_rows).unwrap();
        let visible_count = viewport_rows.div_ceil(3);
        assert!(hi - lo + 1 <= visible_count + 2 * OVERSCAN);
        assert_eq!(hi, 999, "pinned to bottom must include the last message");

        // Ten times the transcript, same bound.
        let mut viewport = uniform(10_000, 3);
        viewport.finish_frame(viewport_rows);
        let (lo2, hi2) = viewport.window(viewport_rows).unwrap();
        assert_eq!(hi2 - lo2, hi - lo);
    }

    #[test]
    fn test_growth_re_anchors_to_new_bottom() {
        let viewport_rows = 20;
        let mut heights = vec![5usize; 10];
        let mut viewport = TranscriptViewport::new();
        viewport.begin_frame(80, 10, true, |idx| heights[idx]);
        viewport.finish_frame(viewport_rows);
        let anchored = viewport.scroll_offset();
        assert_eq!(anchored, 50 - viewport_rows);

        // The open message grows by three rows; the anchor must follow the
        // new bottom, not hold the old absolute offset.
        heights[9] = 8;
        viewport.begin_frame(80, 10, true, |idx| heights[idx]);
        viewport.finish_frame(viewport_rows);
        assert_eq!(viewport.scroll_offset(), 53 - viewport_rows);
        assert!(viewport.is_pinned_to_bottom());
    }

    #[test]
    fn test_measurement_corrects_offsets_without_touching_others() {
        let mut viewport = uniform(5, 4);
        assert_eq!(viewport.total_rows(), 20);
        assert_eq!(viewport.offset_of(3), 12);

        viewport.set_measured(1, 7);
        assert_eq!(viewport.total_rows(), 23);
        assert_eq!(viewport.offset_of(1), 4);
        assert_eq!(viewport.offset_of(2), 11);
        assert_eq!(viewport.offset_of(4), 19);
    }

    #[test]
    fn test_stale_measurement_index_is_a_noop() {
        let mut viewport = uniform(3, 2);
        viewport.set_measured(17, 9);
        assert_eq!(viewport.total_rows(), 6);
    }

    #[test]
    fn test_scroll_up_disengages_and_bottom_re_engages() {
        let viewport_rows = 10;
        let mut viewport = uniform(50, 2);
        viewport.finish_frame(viewport_rows);
        assert!(viewport.is_pinned_to_bottom());

        viewport.scroll_up(5);
        assert!(!viewport.is_pinned_to_bottom());
        viewport.finish_frame(viewport_rows);
        assert_eq!(viewport.scroll_offset(), viewport.max_scroll(viewport_rows) - 5);

        viewport.scroll_down(5, viewport_rows);
        assert!(viewport.is_pinned_to_bottom());
    }

    #[test]
    fn test_width_change_demotes_measurements_to_estimates() {
        let mut viewport = uniform(4, 2);
        viewport.set_measured(2, 9);
        assert_eq!(viewport.total_rows(), 15);

        // New width: estimates win again until re-measured.
        viewport.begin_frame(40, 4, false, |_| 3);
        assert_eq!(viewport.total_rows(), 12);
    }

    #[test]
    fn test_streaming_last_message_is_re_estimated_each_frame() {
        let mut viewport = uniform(4, 2);
        viewport.set_measured(3, 2);

        // Same width: closed messages keep their measurements, the open one
        // follows the fresh estimate.
        viewport.begin_frame(80, 4, true, |_| 6);
        assert_eq!(viewport.offset_of(3), 6);
        assert_eq!(viewport.total_rows(), 12);
    }

    #[test]
    fn test_clear_truncates_tracked_heights() {
        let mut viewport = uniform(10, 3);
        viewport.begin_frame(80, 0, false, |_| 1);
        assert_eq!(viewport.total_rows(), 0);
        assert!(viewport.window(10).is_none());
    }

    #[test]
    fn test_window_covers_scrolled_region_with_overscan() {
        let mut viewport = uniform(100, 5);
        viewport.scroll_up(0); // disengage without moving
        viewport.scroll_offset = 203;
        let (lo, hi) = viewport.window(10).unwrap();
        // Rows 203..213 live in messages 40..=42.
        assert_eq!(lo, 40 - OVERSCAN);
        assert_eq!(hi, 42 + OVERSCAN);
    }
}

//! Written-region tracking for texture uploads.

/// Which texels of a `width` x `height` image have been written.
///
/// Each row keeps its written columns as sorted, merged `[start, end)` spans.
/// Rows are dropped once the whole image is covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TexelCoverage {
    width: u32,
    rows: Vec<Vec<(u32, u32)>>,
}

impl TexelCoverage {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self { width, rows: vec![Vec::new(); height as usize] }
    }

    /// Marks `w` x `h` texels at (`x`, `y`) as written. Parts outside the
    /// image are ignored.
    pub(crate) fn add(&mut self, x: u32, y: u32, w: u32, h: u32) {
        if self.is_complete() || w == 0 {
            return;
        }
        let start = x.min(self.width);
        let end = x.saturating_add(w).min(self.width);
        let first = (y as usize).min(self.rows.len());
        let last = (y.saturating_add(h) as usize).min(self.rows.len());
        for row in &mut self.rows[first..last] {
            insert_span(row, start, end);
        }
        let full = [(0, self.width)];
        if self.rows.iter().all(|row| row.as_slice() == full) {
            self.rows = Vec::new();
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.rows.is_empty()
    }
}

fn insert_span(row: &mut Vec<(u32, u32)>, start: u32, end: u32) {
    if start >= end {
        return;
    }
    row.push((start, end));
    row.sort_unstable_by_key(|span| span.0);
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(row.len());
    for &(s, e) in row.iter() {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    *row = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_texel_of_larger_image_is_partial() {
        let mut cov = TexelCoverage::new(4, 2);
        cov.add(0, 0, 1, 1);
        assert!(!cov.is_complete());
    }

    #[test]
    fn whole_image_in_one_write_is_complete() {
        let mut cov = TexelCoverage::new(4, 2);
        cov.add(0, 0, 4, 2);
        assert!(cov.is_complete());
    }

    #[test]
    fn tiles_in_any_order_complete_the_image() {
        let mut cov = TexelCoverage::new(4, 4);
        cov.add(2, 2, 2, 2);
        cov.add(0, 0, 2, 2);
        cov.add(2, 0, 2, 2);
        assert!(!cov.is_complete());
        cov.add(0, 2, 2, 2);
        assert!(cov.is_complete());
    }

    #[test]
    fn overlapping_writes_do_not_double_count() {
        let mut cov = TexelCoverage::new(4, 1);
        cov.add(0, 0, 3, 1);
        cov.add(1, 0, 2, 1);
        assert!(!cov.is_complete());
        cov.add(2, 0, 2, 1);
        assert!(cov.is_complete());
    }

    #[test]
    fn out_of_range_parts_are_ignored() {
        let mut cov = TexelCoverage::new(2, 2);
        cov.add(1, 1, u32::MAX, u32::MAX);
        assert!(!cov.is_complete());
    }
}

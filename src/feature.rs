use pyo3::pyclass;
use unicode_segmentation::UnicodeSegmentation;

#[pyclass]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureType {
    Bytes,
    Chars,
    Words,
}

/// Unit boundaries of a text, used to cut overlapping token windows.
pub trait Features {
    /// End offset of every char, in order.
    fn char_bounds(&self) -> Vec<usize>;
    /// (start, end) offsets of every unicode word, in order.
    fn word_spans(&self) -> Vec<(usize, usize)>;
}

impl<T: AsRef<str>> Features for T {
    fn char_bounds(&self) -> Vec<usize> {
        self.as_ref()
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect()
    }

    fn word_spans(&self) -> Vec<(usize, usize)> {
        self.as_ref()
            .unicode_word_indices()
            .map(|(i, w)| (i, i + w.len()))
            .collect()
    }
}

/// Overlapping (start, end) ranges covering `window` consecutive units, given
/// the end offset of each unit. A text shorter than one window degenerates to
/// a single range covering all of it.
pub fn window_spans(bounds: &[usize], window: usize) -> Vec<(usize, usize)> {
    if bounds.len() <= window {
        return vec![(0, bounds.last().copied().unwrap_or(0))];
    }
    let mut spans = Vec::with_capacity(bounds.len() - window + 1);
    let mut start = 0;
    for i in window - 1..bounds.len() {
        spans.push((start, bounds[i]));
        start = bounds[i + 1 - window];
    }
    spans
}

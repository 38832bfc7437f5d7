//! Ordered binary segments carried alongside a protocol message.

/// Ordered list of independently sized binary segments.
///
/// # Invariants
/// - Segment order is significant and never changes once pushed.
/// - Segment bytes are stored verbatim; no text re-encoding happens here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferSequence {
    segments: Vec<Vec<u8>>,
}

impl BufferSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one segment at the end of the sequence.
    pub fn push(&mut self, segment: impl Into<Vec<u8>>) {
        self.segments.push(segment.into());
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.segments.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(Vec::as_slice)
    }

    /// Sum of all segment lengths in bytes.
    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }
}

impl Extend<Vec<u8>> for BufferSequence {
    fn extend<T: IntoIterator<Item = Vec<u8>>>(&mut self, iter: T) {
        self.segments.extend(iter);
    }
}

impl FromIterator<Vec<u8>> for BufferSequence {
    fn from_iter<T: IntoIterator<Item = Vec<u8>>>(iter: T) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Vec<u8>>> for BufferSequence {
    fn from(segments: Vec<Vec<u8>>) -> Self {
        Self { segments }
    }
}

#[cfg(test)]
mod tests {
    use super::BufferSequence;

    #[test]
    fn push_keeps_insertion_order() {
        let mut buffers = BufferSequence::new();
        buffers.push(vec![1, 2, 3]);
        buffers.push(Vec::new());
        buffers.push(vec![9]);

        assert_eq!(buffers.len(), 3);
        assert_eq!(buffers.get(0), Some(&[1, 2, 3][..]));
        assert_eq!(buffers.get(1), Some(&[][..]));
        assert_eq!(buffers.get(2), Some(&[9][..]));
        assert_eq!(buffers.total_bytes(), 4);
    }

    #[test]
    fn extend_appends_after_existing_segments() {
        let mut buffers = BufferSequence::from(vec![vec![0xAA]]);
        buffers.extend(vec![vec![0xBB], vec![0xCC, 0xDD]]);

        let collected: Vec<&[u8]> = buffers.iter().collect();
        assert_eq!(collected, vec![&[0xAA][..], &[0xBB][..], &[0xCC, 0xDD][..]]);
    }
}

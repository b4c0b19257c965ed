//! Append-only store of received byte chunks.
//! The chunks form one logical byte stream that is read through a cursor.

/// Ordered collection of caller-delivered chunks plus a logical read cursor
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: Vec<Box<[u8]>>,
    offsets: Vec<u64>, // Logical start offset of each chunk
    total_size: u64,
    read_position: u64,
    sealed: bool,
}

impl ChunkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk at the tail of the stream.
    ///
    /// Empty chunks leave the stream unchanged and are not stored.
    pub fn append(&mut self, chunk: impl Into<Vec<u8>>) {
        let chunk = chunk.into().into_boxed_slice();
        if chunk.is_empty() {
            return;
        }

        self.offsets.push(self.total_size);
        self.total_size += chunk.len() as u64;
        self.chunks.push(chunk);
    }

    /// Read up to `max_len` bytes starting at logical `position`.
    ///
    /// The returned slice never spans two chunks: a request crossing a chunk
    /// boundary yields only the remainder of the chunk holding `position`.
    /// Returns an empty slice at or past the end of the known data.
    pub fn read_at(&self, position: u64, max_len: usize) -> &[u8] {
        if position >= self.total_size || max_len == 0 {
            return &[];
        }

        // offsets[0] == 0, so at least one chunk starts at or before `position`
        let index = self.offsets.partition_point(|&start| start <= position) - 1;
        let (Some(chunk), Some(&start)) = (self.chunks.get(index), self.offsets.get(index)) else {
            return &[];
        };

        let local = (position - start) as usize;
        let len = max_len.min(chunk.len() - local);
        &chunk[local..local + len]
    }

    /// Total number of bytes received so far
    pub fn size(&self) -> u64 {
        self.total_size
    }

    /// Number of stored chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Current logical read cursor
    pub fn position(&self) -> u64 {
        self.read_position
    }

    /// Move the cursor to `position`.
    /// Returns `None` (cursor untouched) if `position` is past the known size.
    pub fn set_position(&mut self, position: u64) -> Option<u64> {
        if position > self.total_size {
            return None;
        }
        self.read_position = position;
        Some(position)
    }

    /// Advance the cursor, never past the known size
    pub fn advance(&mut self, count: usize) -> u64 {
        self.read_position = self
            .read_position
            .saturating_add(count as u64)
            .min(self.total_size);
        self.read_position
    }

    /// Mark the stream as complete: no further chunks will be delivered
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether the stream has been marked complete
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Whether the cursor sits at the end of the known data
    pub fn at_end(&self) -> bool {
        self.read_position >= self.total_size
    }
}

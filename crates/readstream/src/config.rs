//! Configuration for stream construction.

/// Default high-water mark for object-mode streams, in items.
pub const DEFAULT_OBJECT_HIGH_WATER_MARK: usize = 16;

/// Default high-water mark for byte-mode streams, in bytes.
pub const DEFAULT_BYTE_HIGH_WATER_MARK: usize = 16 * 1024;

/// Options recognized when constructing a [`ReadStream`](crate::ReadStream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Whether items are arbitrary values (`true`) or byte chunks (`false`).
    ///
    /// In object mode every buffered item counts as one unit against the
    /// high-water mark. In byte mode an item counts its length in bytes;
    /// byte mode is only honored by the `Bytes` constructors
    /// ([`read_bytes`](crate::read_bytes)).
    ///
    /// Default: `true`
    pub object_mode: bool,

    /// Buffer level at which the stream stops asking the producer for more.
    ///
    /// `None` selects the mode default: 16 items, or 16 KiB in byte mode.
    pub high_water_mark: Option<usize>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::objects()
    }
}

impl ReadOptions {
    /// Object mode with the default high-water mark.
    pub fn objects() -> Self {
        Self {
            object_mode: true,
            high_water_mark: None,
        }
    }

    /// Byte mode with the default high-water mark.
    pub fn bytes() -> Self {
        Self {
            object_mode: false,
            high_water_mark: None,
        }
    }

    /// Sets object mode.
    pub fn with_object_mode(mut self, object_mode: bool) -> Self {
        self.object_mode = object_mode;
        self
    }

    /// Sets the high-water mark.
    pub fn with_high_water_mark(mut self, mark: usize) -> Self {
        self.high_water_mark = Some(mark);
        self
    }

    /// The high-water mark after applying the mode default.
    pub fn effective_high_water_mark(&self) -> usize {
        match (self.high_water_mark, self.object_mode) {
            (Some(mark), _) => mark,
            (None, true) => DEFAULT_OBJECT_HIGH_WATER_MARK,
            (None, false) => DEFAULT_BYTE_HIGH_WATER_MARK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_defaults() {
        assert_eq!(ReadOptions::default(), ReadOptions::objects());
        assert_eq!(ReadOptions::objects().effective_high_water_mark(), 16);
        assert_eq!(ReadOptions::bytes().effective_high_water_mark(), 16 * 1024);
    }

    #[test]
    fn builders_override_defaults() {
        let options = ReadOptions::bytes()
            .with_high_water_mark(4)
            .with_object_mode(true);
        assert!(options.object_mode);
        assert_eq!(options.effective_high_water_mark(), 4);
    }
}

use std::ops::Deref;
use std::sync::Arc;

/// Immutable, reference-counted contiguous buffer.
///
/// Cloning and slicing never copy the values; only the window into the shared
/// allocation changes.
#[derive(Debug)]
pub struct Buffer<T> {
    data: Arc<[T]>,
    offset: usize,
    len: usize,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            offset: self.offset,
            len: self.len,
        }
    }
}

impl<T> Buffer<T> {
    pub fn as_slice(&self) -> &[T] {
        &self.data[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn slice(&self, offset: usize, len: usize) -> Buffer<T> {
        debug_assert!(offset + len <= self.len);
        Buffer {
            data: Arc::clone(&self.data),
            offset: self.offset + offset,
            len,
        }
    }

    /// True when both buffers view the same allocation.
    pub fn shares_storage(&self, other: &Buffer<T>) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T> From<Vec<T>> for Buffer<T> {
    fn from(values: Vec<T>) -> Self {
        let len = values.len();
        Buffer {
            data: values.into(),
            offset: 0,
            len,
        }
    }
}

impl<T> Deref for Buffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

/// UTF-8 strings packed into one allocation plus an offset index.
///
/// `offsets` has `len + 1` entries; value `i` spans
/// `values[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone)]
pub struct Utf8Buffer {
    values: Arc<str>,
    offsets: Buffer<usize>,
}

impl Utf8Buffer {
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn value(&self, i: usize) -> &str {
        &self.values[self.offsets[i]..self.offsets[i + 1]]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len()).map(move |i| self.value(i))
    }

    pub fn slice(&self, offset: usize, len: usize) -> Utf8Buffer {
        Utf8Buffer {
            values: Arc::clone(&self.values),
            offsets: self.offsets.slice(offset, len + 1),
        }
    }

    pub fn shares_storage(&self, other: &Utf8Buffer) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl<'a> FromIterator<&'a str> for Utf8Buffer {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut builder = Utf8BufferBuilder::default();
        for s in iter {
            builder.push(s);
        }
        builder.finish()
    }
}

#[derive(Debug)]
pub struct Utf8BufferBuilder {
    values: String,
    offsets: Vec<usize>,
}

impl Default for Utf8BufferBuilder {
    fn default() -> Self {
        Self {
            values: String::new(),
            offsets: vec![0],
        }
    }
}

impl Utf8BufferBuilder {
    pub fn with_capacity(items: usize) -> Self {
        let mut offsets = Vec::with_capacity(items + 1);
        offsets.push(0);
        Self {
            values: String::new(),
            offsets,
        }
    }

    pub fn push(&mut self, value: &str) {
        self.values.push_str(value);
        self.offsets.push(self.values.len());
    }

    pub fn finish(self) -> Utf8Buffer {
        Utf8Buffer {
            values: self.values.into(),
            offsets: self.offsets.into(),
        }
    }
}

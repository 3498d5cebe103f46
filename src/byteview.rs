//! Provides an immutable view on cached bytes.
//!
//! A [ByteView] is what a [Group](crate::group::Group) hands out to its callers. It is backed by
//! [bytes::Bytes], therefore cloning a view is cheap (reference counted) while there is no way of
//! mutating the underlying buffer through it. Callers which need to modify the data have to
//! obtain an owned copy via [ByteView::to_vec].
//!
//! # Examples
//!
//! ```
//! # use peercache::byteview::ByteView;
//! let view = ByteView::from("Hello");
//! assert_eq!(view.len(), 5);
//! assert_eq!(view.as_ref(), b"Hello");
//!
//! // Modifying a copy leaves the view untouched...
//! let mut copy = view.to_vec();
//! copy[0] = b'J';
//! assert_eq!(view.to_string(), "Hello");
//! ```
use std::fmt::{Debug, Display, Formatter};

use bytes::Bytes;

use crate::lru::ByteSize;

/// An immutable, cheaply cloneable view on a byte sequence.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Creates a view by copying the given slice.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Returns the number of bytes in this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if this view contains no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns an owned copy of the underlying bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Returns the contents as string, replacing invalid UTF-8 sequences.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

// Takes ownership of the buffer, so no other handle to it remains outside the view.
impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        ByteView::copy_from_slice(data)
    }
}

impl From<String> for ByteView {
    fn from(data: String) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView::copy_from_slice(data.as_bytes())
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl Debug for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteView({:?})", self.data)
    }
}

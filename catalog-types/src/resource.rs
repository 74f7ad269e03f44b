//! Binary content attached to a process item.
//!
//! A [`ProcessResource`] is a cheaply clonable handle: every clone refers to
//! the same underlying stream, so closing one clone closes them all. The
//! stream is consumed at most once; after the first [`ProcessResource::read_all`]
//! the bytes are buffered and later reads return the buffer.

use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Upper bound on the buffer preallocated from an advertised size.
const MAX_PREALLOC: u64 = 1024 * 1024;

enum Body {
    Stream(BoxedReader),
    Buffered(Arc<[u8]>),
    Closed,
}

struct Inner {
    name: String,
    mime_type: String,
    size: Option<u64>,
    body: Mutex<Body>,
}

/// A named, typed, optionally sized byte stream.
#[derive(Clone)]
pub struct ProcessResource {
    inner: Arc<Inner>,
}

impl ProcessResource {
    /// Wraps an async reader. `size` is the advertised content length, when
    /// the producer knows it.
    pub fn from_reader<R>(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: Option<u64>,
        reader: R,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_body(name, mime_type, size, Body::Stream(Box::new(reader)))
    }

    /// Creates an already-buffered resource.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let size = Some(bytes.len() as u64);
        Self::with_body(name, mime_type, size, Body::Buffered(bytes.into()))
    }

    fn with_body(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: Option<u64>,
        body: Body,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                mime_type: mime_type.into(),
                size,
                body: Mutex::new(body),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mime_type(&self) -> &str {
        &self.inner.mime_type
    }

    pub fn size(&self) -> Option<u64> {
        self.inner.size
    }

    /// Reads the whole content. The underlying stream is drained on the first
    /// call and released immediately; the bytes are kept for later reads.
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        let mut body = self.inner.body.lock().await;
        match &mut *body {
            Body::Buffered(bytes) => Ok(bytes.to_vec()),
            Body::Closed => Err(Error::ResourceClosed(self.inner.name.clone())),
            Body::Stream(reader) => {
                let hint = self.inner.size.unwrap_or(0).min(MAX_PREALLOC) as usize;
                let mut buf = Vec::with_capacity(hint);
                reader.read_to_end(&mut buf).await?;
                let buffered: Arc<[u8]> = buf.into();
                // Dropping the reader here releases the source stream.
                *body = Body::Buffered(Arc::clone(&buffered));
                Ok(buffered.to_vec())
            }
        }
    }

    /// Closes the resource, dropping the stream or buffer.
    ///
    /// Returns `true` if this call performed the close and `false` if the
    /// resource was already closed.
    pub async fn close(&self) -> bool {
        let mut body = self.inner.body.lock().await;
        if matches!(*body, Body::Closed) {
            return false;
        }
        *body = Body::Closed;
        true
    }

    /// Closes the resource without waiting.
    ///
    /// Returns `None` when another task holds the body (a read in progress),
    /// otherwise the same result as [`ProcessResource::close`].
    pub fn try_close(&self) -> Option<bool> {
        let mut body = self.inner.body.try_lock().ok()?;
        if matches!(*body, Body::Closed) {
            return Some(false);
        }
        *body = Body::Closed;
        Some(true)
    }

    pub async fn is_closed(&self) -> bool {
        matches!(*self.inner.body.lock().await, Body::Closed)
    }

    /// Whether two handles refer to the same underlying resource.
    pub fn same_as(&self, other: &ProcessResource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ProcessResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessResource")
            .field("name", &self.inner.name)
            .field("mime_type", &self.inner.mime_type)
            .field("size", &self.inner.size)
            .finish_non_exhaustive()
    }
}

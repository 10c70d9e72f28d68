//! The unit of data that crosses the transport. A frame is either text, a raw
//! byte buffer, one of the typed numeric views, a byte view over part of a
//! larger buffer, or an opaque blob whose bytes are only reachable through an
//! async read.
//!
//! SPDX-License-Identifier: MIT

use std::sync::Arc;

/// Element layout of a frame, used to check that corruption preserved shape
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Buffer,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    View,
    Blob,
}

impl FrameKind {
    /// Width in bytes of one element
    pub fn element_width(self) -> usize {
        match self {
            FrameKind::Int16 | FrameKind::Uint16 => 2,
            FrameKind::Int32 | FrameKind::Uint32 | FrameKind::Float32 => 4,
            FrameKind::Float64 => 8,
            _ => 1,
        }
    }
}

/// An array-like region `[offset, offset + len)` of a backing buffer
#[derive(Clone, Debug, PartialEq)]
pub struct ByteView {
    pub buffer: Vec<u8>,
    pub offset: usize,
    pub len: usize,
}

impl ByteView {
    pub fn new(buffer: Vec<u8>, offset: usize, len: usize) -> Self {
        ByteView {
            buffer,
            offset,
            len,
        }
    }

    /// The viewed bytes, `None` when the region falls outside the buffer
    pub fn region(&self) -> Option<&[u8]> {
        let end = self.offset.checked_add(self.len)?;
        self.buffer.get(self.offset..end)
    }

    pub fn region_mut(&mut self) -> Option<&mut [u8]> {
        let end = self.offset.checked_add(self.len)?;
        self.buffer.get_mut(self.offset..end)
    }
}

/// Opaque payload with a declared content type. Its bytes can only be read
/// asynchronously.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    data: Arc<[u8]>,
    content_type: String,
}

impl Blob {
    pub fn new(data: Vec<u8>, content_type: &str) -> Self {
        Blob {
            data: data.into(),
            content_type: content_type.to_string(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Read the underlying bytes
    pub async fn array_buffer(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Buffer(Vec<u8>),
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    View(ByteView),
    Blob(Blob),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text(_) => FrameKind::Text,
            Frame::Buffer(_) => FrameKind::Buffer,
            Frame::Int8(_) => FrameKind::Int8,
            Frame::Uint8(_) => FrameKind::Uint8,
            Frame::Int16(_) => FrameKind::Int16,
            Frame::Uint16(_) => FrameKind::Uint16,
            Frame::Int32(_) => FrameKind::Int32,
            Frame::Uint32(_) => FrameKind::Uint32,
            Frame::Float32(_) => FrameKind::Float32,
            Frame::Float64(_) => FrameKind::Float64,
            Frame::View(_) => FrameKind::View,
            Frame::Blob(_) => FrameKind::Blob,
        }
    }

    /// Number of elements in the frame (bytes for text, buffers and blobs)
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(s) => s.len(),
            Frame::Buffer(v) | Frame::Uint8(v) => v.len(),
            Frame::Int8(v) => v.len(),
            Frame::Int16(v) => v.len(),
            Frame::Uint16(v) => v.len(),
            Frame::Int32(v) => v.len(),
            Frame::Uint32(v) => v.len(),
            Frame::Float32(v) => v.len(),
            Frame::Float64(v) => v.len(),
            Frame::View(view) => view.len,
            Frame::Blob(blob) => blob.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the frame on the wire
    pub fn byte_len(&self) -> usize {
        self.len() * self.kind().element_width()
    }
}

//! This file contains the corruption engine: type-preserving, randomized
//! mutation of a frame. Each frame variant gets its own routine, all of them
//! share `element::overwrite`. Blobs can only be read asynchronously so their
//! path hands back a future instead of a frame.
//!
//! SPDX-License-Identifier: MIT

use futures::future::BoxFuture;

use crate::config::FaultParams;
use crate::frame::{Blob, ByteView, Frame};
use crate::rng::{Entropy, RandomSource};

pub mod element;
use element::overwrite;

/// Result of a corruption call. Callers must accept both shapes.
pub enum Corrupted {
    Ready(Frame),
    Deferred(BoxFuture<'static, Frame>),
}

impl Corrupted {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Corrupted::Deferred(_))
    }

    /// Wait for the corrupted frame regardless of which path produced it
    pub async fn resolve(self) -> Frame {
        match self {
            Corrupted::Ready(frame) => frame,
            Corrupted::Deferred(work) => work.await,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CorruptionEngine {
    min_mutations: usize,
    max_mutations: usize,
}

impl Default for CorruptionEngine {
    fn default() -> Self {
        CorruptionEngine::new(&FaultParams::default())
    }
}

impl CorruptionEngine {
    pub fn new(params: &FaultParams) -> Self {
        CorruptionEngine {
            min_mutations: params.min_mutations,
            max_mutations: params.max_mutations,
        }
    }

    /// Number of overwrites for one call, independent of the frame length
    fn rounds(&self, rng: &mut dyn RandomSource) -> usize {
        rng.between(self.min_mutations, self.max_mutations)
    }

    /// Corrupt a frame, deferring when the payload is a blob
    pub fn corrupt(&self, frame: Frame, entropy: &Entropy) -> Corrupted {
        match frame {
            Frame::Blob(blob) => {
                let engine = *self;
                let entropy = entropy.clone();
                Corrupted::Deferred(Box::pin(async move {
                    Frame::Blob(engine.corrupt_blob(blob, &entropy).await)
                }))
            }
            other => Corrupted::Ready(entropy.with(|rng| self.corrupt_now(other, rng))),
        }
    }

    /// Corrupt every synchronously reachable variant. Blobs and text come
    /// back untouched, use `corrupt` for blobs.
    pub fn corrupt_now(&self, frame: Frame, rng: &mut dyn RandomSource) -> Frame {
        // Nothing to index into
        if frame.is_empty() {
            return frame;
        }

        match frame {
            Frame::Buffer(mut bytes) => {
                self.mutate(&mut bytes, rng);
                Frame::Buffer(bytes)
            }
            Frame::Int8(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Int8(elems)
            }
            Frame::Uint8(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Uint8(elems)
            }
            Frame::Int16(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Int16(elems)
            }
            Frame::Uint16(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Uint16(elems)
            }
            Frame::Int32(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Int32(elems)
            }
            Frame::Uint32(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Uint32(elems)
            }
            Frame::Float32(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Float32(elems)
            }
            Frame::Float64(mut elems) => {
                self.mutate(&mut elems, rng);
                Frame::Float64(elems)
            }
            Frame::View(view) => Frame::View(self.corrupt_view(view, rng)),
            Frame::Text(_) | Frame::Blob(_) => frame,
        }
    }

    /// Reinterpret an array-like view as raw bytes over exactly its region
    fn corrupt_view(&self, mut view: ByteView, rng: &mut dyn RandomSource) -> ByteView {
        let rounds = match view.region() {
            Some(region) if !region.is_empty() => self.rounds(rng),
            _ => return view,
        };

        if let Some(region) = view.region_mut() {
            overwrite(region, rounds, rng);
        }

        view
    }

    /// Read the blob, corrupt its bytes, and re-wrap them with the original
    /// content type
    pub async fn corrupt_blob(&self, blob: Blob, entropy: &Entropy) -> Blob {
        let mut bytes = blob.array_buffer().await;
        if bytes.is_empty() {
            return blob;
        }

        entropy.with(|rng| self.mutate(&mut bytes, rng));
        Blob::new(bytes, blob.content_type())
    }

    fn mutate<T: element::Element>(&self, elems: &mut [T], rng: &mut dyn RandomSource) {
        let rounds = self.rounds(rng);
        overwrite(elems, rounds, rng);
    }
}

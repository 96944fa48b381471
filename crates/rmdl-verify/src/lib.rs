//! Content verification primitives for downloaded chunks.
//!
//! A chunk's 64-bit identifier doubles as its integrity tag: the first eight
//! bytes of a digest of the decompressed payload, read little-endian. This
//! crate computes those tags without enforcing where they come from or how
//! mismatches are handled.
//!
//! # Key Features
//!
//! - **Incremental**: digests are computed through a minimal [`Hasher`] trait
//! - **Extensible**: any `digest::Digest` implementation plugs in via
//!   [`DigestHasher`]
//! - **Mechanism-only**: callers compare tags and decide the failure policy

mod hasher;
mod kind;

pub use hasher::{DigestHasher, Hasher, Sha256Hasher, Sha512Hasher};
pub use kind::{content_id, HashKind};

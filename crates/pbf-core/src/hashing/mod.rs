//! Módulo de hashing (blake3) para strings y contenido streameado.

pub mod hash;

pub use hash::{hash_bytes, hash_str, ContentDigest};

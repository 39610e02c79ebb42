// src/fast/mod.rs
//! Lock-free bounded queue — the L1 "fast path" (C2).

pub mod channel;

pub use channel::FastChannel;

//! # Audio Normalization Module
//!
//! Converts inbound audio frames into the canonical form the pipeline
//! works with: mono, 32-bit float samples at the configured sample rate.
//!
//! ## Accepted Inputs:
//! - **WAV containers**: 16-bit PCM, any channel count and sample rate
//! - **Raw PCM**: headerless 16-bit little-endian mono at the canonical rate
//!   (what browser clients send after local capture)
//!
//! Anything else is an unrecoverable decode failure that ends the turn.

pub mod decoder;

pub use decoder::{normalize, samples_to_pcm_bytes};

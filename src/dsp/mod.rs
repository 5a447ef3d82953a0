//! DSP primitives and the auscultation signal graph.
//!
//! All synthesis runs in Rust so the desktop device, the AudioWorklet and
//! offline WAV export produce the same samples.

pub mod filter;
pub mod graph;
pub mod noise;
pub mod oscillator;
pub mod param;

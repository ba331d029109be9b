//! Wavefront GPU compiler backend.
//!
//! The IR models a wave-based GPU: values live in scalar (uniform) or vector
//! (per-lane) registers, and each block carries a logical and a linear view
//! of the control flow. The passes in [`ir`] run on that IR ahead of
//! register allocation.

pub mod config;
pub mod ir;
pub mod logging;

//! Shared utility modules used across Vectra components.

pub mod simd;

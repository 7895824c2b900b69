//! Byte-level casting helpers for message and file payloads.
//!
//! Typed staging buffers (`Vec<f64>`, `Vec<i64>`) are cast to bytes only at
//! the communication boundary; casting *from* raw `&[u8]` is reserved for
//! buffers whose alignment is known (received `Vec<u8>` allocations are
//! copied into typed buffers first where alignment matters).

use bytemuck::Pod;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Reinterpret received bytes as `T`s, copying if the allocation is not
/// aligned for `T`.
pub fn cast_slice_from<T: Pod + Copy>(v: &[u8]) -> Vec<T> {
    bytemuck::pod_collect_to_vec(v)
}

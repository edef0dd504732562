//! Chunk loading and compiler configuration.

use core::ffi::c_void;

/// Raw compiler levels. Higher levels are accepted by the native side and
/// clamped to what it supports.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub optimization_level: u8,
    pub debug_level: u8,
    pub type_info_level: u8,
    pub coverage_level: u8,
}

/// Borrowed description of a chunk to load. All pointers are valid only for
/// the duration of the `load_chunk` call; the native side copies what it
/// keeps.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub name: *const u8,
    pub name_len: usize,
    /// Environment table, or null for the VM globals.
    pub env: *mut c_void,
    /// 0 = source text, 1 = precompiled bytecode.
    pub mode: u8,
    pub compiler: CompilerOptions,
    pub code: *const u8,
    pub code_len: usize,
}

impl ChunkOptions {
    pub const MODE_TEXT: u8 = 0;
    pub const MODE_BINARY: u8 = 1;
}

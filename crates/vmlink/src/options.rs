//! Compiler and chunk configuration.

use crate::object::Table;

/// Optimization level for compiled chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OptimizationLevel {
    #[default]
    None = 0,
    Basic = 1,
    /// May impact debugging.
    Full = 2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DebugLevel {
    #[default]
    None = 0,
    /// Line info and function names only.
    LineInfo = 1,
    /// Line info, locals and upvalues.
    Full = 2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeInfoLevel {
    #[default]
    NativeModules = 0,
    AllModules = 1,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CoverageLevel {
    #[default]
    None = 0,
    /// Statement coverage.
    Basic = 1,
    /// Statement and expression coverage.
    Full = 2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CompilerOptions {
    pub optimization_level: OptimizationLevel,
    pub debug_level: DebugLevel,
    pub type_info_level: TypeInfoLevel,
    pub coverage_level: CoverageLevel,
}

impl CompilerOptions {
    pub(crate) fn to_raw(self) -> vmlink_abi::CompilerOptions {
        vmlink_abi::CompilerOptions {
            optimization_level: self.optimization_level as u8,
            debug_level: self.debug_level as u8,
            type_info_level: self.type_info_level as u8,
            coverage_level: self.coverage_level as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChunkMode {
    /// Source text.
    #[default]
    Text,
    /// Precompiled bytecode. Maliciously crafted bytecode can crash the VM.
    Binary,
}

impl ChunkMode {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            ChunkMode::Text => vmlink_abi::ChunkOptions::MODE_TEXT,
            ChunkMode::Binary => vmlink_abi::ChunkOptions::MODE_BINARY,
        }
    }
}

/// Options for [`crate::Vm::load`].
#[derive(Debug, Clone, Default)]
pub struct ChunkOptions {
    /// Chunk name used in error messages.
    pub name: Option<String>,
    /// Environment used as the chunk's global table.
    pub env: Option<Table>,
    pub mode: ChunkMode,
    /// Overrides the VM's compiler options for this chunk.
    pub compiler: Option<CompilerOptions>,
}

impl ChunkOptions {
    pub fn named(name: impl Into<String>) -> Self {
        ChunkOptions {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: Table) -> Self {
        self.env = Some(env);
        self
    }

    pub fn with_mode(mut self, mode: ChunkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_compiler(mut self, compiler: CompilerOptions) -> Self {
        self.compiler = Some(compiler);
        self
    }
}

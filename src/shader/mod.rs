//! Shader providers
//!
//! The renderer takes two SPIR-V binaries, one per stage, with entry points
//! [`VERTEX_ENTRY`] and [`FRAGMENT_ENTRY`]. [`WgslShaders`] compiles them
//! from WGSL with naga at startup; [`SpirvShaders`] loads precompiled
//! binaries from disk.

use std::path::{Path, PathBuf};

use crate::error::ShaderCompileError;
use crate::pipeline::{FRAGMENT_ENTRY, VERTEX_ENTRY};

/// The shader shipped with the viewer.
pub const BUILTIN_WGSL: &str = include_str!("../../shaders/mesh.wgsl");

/// SPIR-V magic number, first word of every module.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Compiled SPIR-V for both pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShaders {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl CompiledShaders {
    /// Size of the vertex binary in bytes.
    pub fn vertex_byte_len(&self) -> usize {
        self.vertex.len() * 4
    }

    /// Size of the fragment binary in bytes.
    pub fn fragment_byte_len(&self) -> usize {
        self.fragment.len() * 4
    }
}

/// Source of compiled shader binaries.
pub trait ShaderProvider {
    fn compile(&self) -> Result<CompiledShaders, ShaderCompileError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
        }
    }

    fn entry_point(self) -> String {
        let entry = match self {
            Stage::Vertex => VERTEX_ENTRY,
            Stage::Fragment => FRAGMENT_ENTRY,
        };
        entry.to_string_lossy().into_owned()
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            Stage::Vertex => naga::ShaderStage::Vertex,
            Stage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

/// WGSL sources compiled to SPIR-V with naga.
///
/// Both stages may live in the same source; each is compiled for its own
/// entry point.
#[derive(Debug, Clone)]
pub struct WgslShaders {
    vertex: String,
    fragment: String,
}

impl WgslShaders {
    pub fn from_source(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Read both stage sources from disk.
    pub fn from_files(
        vertex: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> Result<Self, ShaderCompileError> {
        Ok(Self::from_source(
            read_to_string(vertex.as_ref())?,
            read_to_string(fragment.as_ref())?,
        ))
    }

    /// The built-in mesh shader for both stages.
    pub fn builtin() -> Self {
        Self::from_source(BUILTIN_WGSL, BUILTIN_WGSL)
    }

    fn compile_stage(source: &str, stage: Stage) -> Result<Vec<u32>, ShaderCompileError> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderCompileError::Parse {
            stage: stage.name(),
            diagnostic: e.emit_to_string(source),
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator
            .validate(&module)
            .map_err(|e| ShaderCompileError::Validation {
                stage: stage.name(),
                diagnostic: e.emit_to_string(source),
            })?;

        let entry_point = stage.entry_point();
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == entry_point && ep.stage == stage.naga_stage())
        {
            return Err(ShaderCompileError::MissingEntryPoint {
                stage: stage.name(),
                entry_point,
            });
        }

        let options = naga::back::spv::Options {
            lang_version: (1, 3),
            flags: naga::back::spv::WriterFlags::empty(),
            capabilities: None,
            bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
            binding_map: Default::default(),
            debug_info: None,
            zero_initialize_workgroup_memory:
                naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
        };

        let pipeline_options = naga::back::spv::PipelineOptions {
            shader_stage: stage.naga_stage(),
            entry_point,
        };

        let spv = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
            .map_err(|e| ShaderCompileError::Codegen {
                stage: stage.name(),
                diagnostic: e.to_string(),
            })?;

        log::debug!("Compiled {} shader: {} bytes of SPIR-V", stage.name(), spv.len() * 4);
        Ok(spv)
    }
}

impl ShaderProvider for WgslShaders {
    fn compile(&self) -> Result<CompiledShaders, ShaderCompileError> {
        Ok(CompiledShaders {
            vertex: Self::compile_stage(&self.vertex, Stage::Vertex)?,
            fragment: Self::compile_stage(&self.fragment, Stage::Fragment)?,
        })
    }
}

/// Precompiled SPIR-V binaries on disk.
#[derive(Debug, Clone)]
pub struct SpirvShaders {
    vertex: PathBuf,
    fragment: PathBuf,
}

impl SpirvShaders {
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    fn load_stage(path: &Path, stage: Stage) -> Result<Vec<u32>, ShaderCompileError> {
        let bytes = std::fs::read(path).map_err(|source| ShaderCompileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        words_from_bytes(&bytes, stage)
    }
}

impl ShaderProvider for SpirvShaders {
    fn compile(&self) -> Result<CompiledShaders, ShaderCompileError> {
        Ok(CompiledShaders {
            vertex: Self::load_stage(&self.vertex, Stage::Vertex)?,
            fragment: Self::load_stage(&self.fragment, Stage::Fragment)?,
        })
    }
}

fn words_from_bytes(bytes: &[u8], stage: Stage) -> Result<Vec<u32>, ShaderCompileError> {
    let words = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|e| {
        ShaderCompileError::InvalidBinary {
            stage: stage.name(),
            reason: e.to_string(),
        }
    })?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(ShaderCompileError::InvalidBinary {
            stage: stage.name(),
            reason: "missing SPIR-V magic number".to_string(),
        });
    }
    Ok(words)
}

fn read_to_string(path: &Path) -> Result<String, ShaderCompileError> {
    std::fs::read_to_string(path).map_err(|source| ShaderCompileError::Io {
        path: path.display().to_string(),
        source,
    })
}

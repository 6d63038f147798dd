use cranelift_codegen::ir::{self, Signature};
use cranelift_codegen::isa::{self, OwnedTargetIsa, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use target_lexicon::{Architecture, BinaryFormat, Triple};

use crate::{config::JitConfig, IrError, Result};

/// Code-generation target plus the data layout derived from it.
#[derive(Clone)]
pub struct TargetDescriptor {
    isa: OwnedTargetIsa,
    layout: DataLayout,
}

impl TargetDescriptor {
    pub fn from_config(config: &JitConfig) -> Result<Self> {
        match &config.target {
            Some(triple) => Self::for_triple(triple, config),
            None => Self::host(config),
        }
    }

    pub fn host(config: &JitConfig) -> Result<Self> {
        let isa_builder = cranelift_native::builder()
            .map_err(|msg| IrError::CraneliftError(format!("Host not supported: {}", msg)))?;
        Self::finish(isa_builder, config)
    }

    pub fn for_triple(triple: &str, config: &JitConfig) -> Result<Self> {
        let parsed = Triple::from_str(triple).map_err(|e| {
            IrError::CraneliftError(format!("Invalid target triple {}: {}", triple, e))
        })?;
        let isa_builder = isa::lookup(parsed)
            .map_err(|e| IrError::CraneliftError(format!("Failed to lookup ISA: {}", e)))?;
        Self::finish(isa_builder, config)
    }

    fn finish(isa_builder: isa::Builder, config: &JitConfig) -> Result<Self> {
        let mut flags_builder = settings::builder();
        let verifier = if config.enable_verifier { "true" } else { "false" };
        for (name, value) in [
            ("is_pic", "false"),
            ("use_colocated_libcalls", "false"),
            ("opt_level", config.opt_level.as_setting()),
            ("enable_verifier", verifier),
        ] {
            flags_builder.set(name, value).map_err(|e| {
                IrError::CraneliftError(format!("Failed to set flag {}: {}", name, e))
            })?;
        }

        let flags = settings::Flags::new(flags_builder);
        let isa = isa_builder
            .finish(flags)
            .map_err(|e| IrError::CraneliftError(format!("Failed to create ISA: {}", e)))?;
        let layout = DataLayout::new(isa.triple(), isa.pointer_bits(), isa.endianness());

        Ok(Self { isa, layout })
    }

    pub fn isa(&self) -> &dyn TargetIsa {
        &*self.isa
    }

    pub fn owned_isa(&self) -> OwnedTargetIsa {
        self.isa.clone()
    }

    pub fn triple(&self) -> &Triple {
        self.isa.triple()
    }

    pub fn data_layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn pointer_type(&self) -> ir::Type {
        self.isa.pointer_type()
    }

    /// Empty signature using the target's default calling convention.
    pub fn make_signature(&self) -> Signature {
        Signature::new(self.isa.default_call_conv())
    }

    /// Whether code generated for this target can run in the current process.
    pub fn is_host(&self) -> bool {
        let host = Triple::host();
        let triple = self.triple();
        triple.architecture == host.architecture
            && triple.operating_system == host.operating_system
            && triple.binary_format == host.binary_format
    }

    pub fn summary(&self) -> TargetSummary {
        TargetSummary {
            triple: self.triple().to_string(),
            pointer_bits: self.layout.pointer_bits,
            endianness: self.layout.endianness,
            global_prefix: self.layout.global_prefix,
            call_conv: self.isa.default_call_conv().to_string(),
            opt_level: self.isa.flags().opt_level().to_string(),
            is_host: self.is_host(),
        }
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("triple", &self.triple().to_string())
            .field("layout", &self.layout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl From<ir::Endianness> for Endianness {
    fn from(endianness: ir::Endianness) -> Self {
        match endianness {
            ir::Endianness::Little => Endianness::Little,
            ir::Endianness::Big => Endianness::Big,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLayout {
    pub pointer_bits: u8,
    pub endianness: Endianness,
    /// Prefix the platform linker expects on every global symbol.
    pub global_prefix: Option<char>,
}

impl DataLayout {
    pub fn new(triple: &Triple, pointer_bits: u8, endianness: ir::Endianness) -> Self {
        let global_prefix = match (triple.binary_format, triple.architecture) {
            (BinaryFormat::Macho, _) => Some('_'),
            (BinaryFormat::Coff, Architecture::X86_32(_)) => Some('_'),
            _ => None,
        };

        Self {
            pointer_bits,
            endianness: endianness.into(),
            global_prefix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub triple: String,
    pub pointer_bits: u8,
    pub endianness: Endianness,
    pub global_prefix: Option<char>,
    pub call_conv: String,
    pub opt_level: String,
    pub is_host: bool,
}

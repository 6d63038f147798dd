use kiln_core::Linkage;
use std::fmt;

/// Raw address inside the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    pub fn new(address: usize) -> Self {
        Self(address)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.0 as *const u8
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SymbolFlags {
    pub exported: bool,
    pub weak: bool,
    pub callable: bool,
}

impl SymbolFlags {
    /// Flags for a symbol exported by the host process.
    pub fn exported() -> Self {
        Self {
            exported: true,
            ..Self::default()
        }
    }

    pub fn from_linkage(linkage: Linkage, callable: bool) -> Self {
        Self {
            exported: matches!(linkage, Linkage::Export | Linkage::Preemptible),
            weak: linkage == Linkage::Preemptible,
            callable,
        }
    }
}

/// A resolved symbol: where it lives and how it may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JitSymbol {
    pub address: SymbolAddress,
    pub flags: SymbolFlags,
}

impl JitSymbol {
    pub fn new(address: SymbolAddress, flags: SymbolFlags) -> Self {
        Self { address, flags }
    }

    pub fn address(&self) -> SymbolAddress {
        self.address
    }

    pub fn flags(&self) -> SymbolFlags {
        self.flags
    }
}

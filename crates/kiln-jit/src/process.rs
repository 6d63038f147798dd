/*! Symbols that already exist in the host process.
 *
 * Generated code routinely calls into the runtime that loaded it: libc, the embedding program's
 * exported helpers, and so on. The engine reaches those through the `ProcessSymbols` trait so the
 * real process image can be swapped for an explicit table in tests or sandboxed embedders.
 */

use kiln_core::{DataLayout, Mangler};
use libloading::Library;
use std::collections::HashMap;

use crate::error::{JitError, ResolutionError};
use crate::symbol::SymbolAddress;

pub trait ProcessSymbols: Send + Sync {
    /// Address of the linker-visible `name`, or `None` if the process does not define it.
    fn lookup(&self, name: &str) -> Result<Option<SymbolAddress>, ResolutionError>;
}

/// The running executable and every library it has loaded.
pub struct HostProcess {
    image: Library,
    layout: DataLayout,
}

impl HostProcess {
    /// Opens the current process image; it stays open for the lifetime of the value.
    pub fn open(layout: DataLayout) -> Result<Self, JitError> {
        #[cfg(unix)]
        let image: Library = libloading::os::unix::Library::this().into();
        #[cfg(windows)]
        let image: Library = libloading::os::windows::Library::this()
            .map_err(|e| JitError::ProcessImage(e.to_string()))?
            .into();

        tracing::debug!(global_prefix = ?layout.global_prefix, "opened process image");
        Ok(Self { image, layout })
    }
}

impl ProcessSymbols for HostProcess {
    fn lookup(&self, name: &str) -> Result<Option<SymbolAddress>, ResolutionError> {
        // The platform loader adds the global prefix itself.
        let name = Mangler::demangle(name, &self.layout);
        if name.is_empty() || name.contains('\0') {
            return Ok(None);
        }

        let symbol = unsafe { self.image.get::<*const u8>(name.as_bytes()) };
        Ok(symbol
            .ok()
            .map(|symbol| SymbolAddress::from_ptr(*symbol))
            .filter(|address| !address.is_null()))
    }
}

impl std::fmt::Debug for HostProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostProcess")
            .field("layout", &self.layout)
            .finish()
    }
}

/// Explicit name → address table, for embedders that register their runtime by hand.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    symbols: HashMap<String, SymbolAddress>,
    layout: Option<DataLayout>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip `layout`'s global prefix from requested names before matching.
    pub fn with_layout(mut self, layout: DataLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, address: SymbolAddress) -> &mut Self {
        self.symbols.insert(name.into(), address);
        self
    }

    pub fn with_symbol<T>(mut self, name: impl Into<String>, ptr: *const T) -> Self {
        self.insert(name, SymbolAddress::from_ptr(ptr));
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl ProcessSymbols for SymbolMap {
    fn lookup(&self, name: &str) -> Result<Option<SymbolAddress>, ResolutionError> {
        let name = match &self.layout {
            Some(layout) => Mangler::demangle(name, layout),
            None => name,
        };
        Ok(self.symbols.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Endianness;

    fn layout(global_prefix: Option<char>) -> DataLayout {
        DataLayout {
            pointer_bits: 64,
            endianness: Endianness::Little,
            global_prefix,
        }
    }

    extern "C" fn runtime_hook(x: i64) -> i64 {
        x + 1
    }

    #[test]
    fn test_symbol_map_lookup() {
        let map = SymbolMap::new().with_symbol("runtime_hook", runtime_hook as *const u8);
        let address = map.lookup("runtime_hook").unwrap().unwrap();
        assert_eq!(address.as_usize(), runtime_hook as usize);
        assert_eq!(map.lookup("_runtime_hook").unwrap(), None);
    }

    #[test]
    fn test_symbol_map_strips_prefix_with_layout() {
        let map = SymbolMap::new()
            .with_layout(layout(Some('_')))
            .with_symbol("runtime_hook", runtime_hook as *const u8);
        assert!(map.lookup("_runtime_hook").unwrap().is_some());
        assert_eq!(map.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_host_process_finds_libc() {
        let host = HostProcess::open(layout(None)).unwrap();
        assert!(host.lookup("labs").unwrap().is_some());
        assert_eq!(host.lookup("kiln_no_such_symbol_anywhere").unwrap(), None);
        assert_eq!(host.lookup("bad\0name").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_host_process_demangles() {
        let host = HostProcess::open(layout(Some('_'))).unwrap();
        assert!(host.lookup("_labs").unwrap().is_some());
    }
}

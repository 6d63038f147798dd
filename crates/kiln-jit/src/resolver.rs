/*! Per-module symbol resolution.
 *
 * When a module is linked, every name it imports has to be turned into an address. The strategy is
 * chosen per module when it is added and kept in the `ResolverTable` until the module is removed, so
 * the linking layer can ask for "the resolver of module N" without knowing how it was built.
 */

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ResolutionError;
use crate::index::SharedSymbolIndex;
use crate::key::ModuleKey;
use crate::process::ProcessSymbols;
use crate::symbol::{JitSymbol, SymbolFlags};

/// Single-name lookup strategy.
pub trait SymbolLookup: Send + Sync {
    fn find(&self, name: &str) -> Result<Option<JitSymbol>, ResolutionError>;
}

/// Resolves against modules already compiled, then against the host process.
///
/// The compiled-module tier sees private symbols as well as exported ones.
pub struct TwoTierLookup {
    compiled: SharedSymbolIndex,
    process: Arc<dyn ProcessSymbols>,
}

impl TwoTierLookup {
    pub fn new(compiled: SharedSymbolIndex, process: Arc<dyn ProcessSymbols>) -> Self {
        Self { compiled, process }
    }
}

impl SymbolLookup for TwoTierLookup {
    fn find(&self, name: &str) -> Result<Option<JitSymbol>, ResolutionError> {
        if let Some((owner, symbol)) = self.compiled.read().find(name, false)? {
            tracing::trace!(symbol = name, %owner, address = %symbol.address, "resolved in compiled module");
            return Ok(Some(symbol));
        }

        if let Some(address) = self.process.lookup(name)? {
            tracing::trace!(symbol = name, %address, "resolved in process image");
            return Ok(Some(JitSymbol::new(address, SymbolFlags::exported())));
        }

        Ok(None)
    }
}

/// What the linking layer asks of a module's resolver.
pub trait SymbolResolver: Send + Sync {
    /// Flags of every name in `names` that can be resolved.
    ///
    /// Failures are not returned; they go to the resolver's error hook.
    fn lookup_flags(&self, names: &[&str]) -> BTreeMap<String, SymbolFlags>;

    /// Addresses of every name in `names` that can be resolved; missing names are left out.
    fn lookup(&self, names: &[&str]) -> Result<BTreeMap<String, JitSymbol>, ResolutionError>;
}

pub type ErrorReporter = Box<dyn Fn(ResolutionError) + Send + Sync>;

/// Adapts a [`SymbolLookup`] to [`SymbolResolver`], routing flag-lookup failures to a hook.
pub struct LookupResolver<L> {
    lookup: L,
    report_error: ErrorReporter,
}

impl<L: SymbolLookup> LookupResolver<L> {
    pub fn new(lookup: L, report_error: ErrorReporter) -> Self {
        Self {
            lookup,
            report_error,
        }
    }
}

impl<L: SymbolLookup> SymbolResolver for LookupResolver<L> {
    fn lookup_flags(&self, names: &[&str]) -> BTreeMap<String, SymbolFlags> {
        let mut flags = BTreeMap::new();
        for name in names {
            match self.lookup.find(name) {
                Ok(Some(symbol)) => {
                    flags.insert(name.to_string(), symbol.flags);
                }
                Ok(None) => {}
                Err(err) => {
                    (self.report_error)(err);
                    return BTreeMap::new();
                }
            }
        }
        flags
    }

    fn lookup(&self, names: &[&str]) -> Result<BTreeMap<String, JitSymbol>, ResolutionError> {
        let mut resolved = BTreeMap::new();
        for name in names {
            if let Some(symbol) = self.lookup.find(name)? {
                resolved.insert(name.to_string(), symbol);
            }
        }
        Ok(resolved)
    }
}

/// Resolver of every live module, keyed by its handle.
#[derive(Clone, Default)]
pub struct ResolverTable(Arc<RwLock<HashMap<ModuleKey, Arc<dyn SymbolResolver>>>>);

impl ResolverTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ModuleKey, resolver: Arc<dyn SymbolResolver>) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, resolver);
    }

    pub fn get(&self, key: ModuleKey) -> Option<Arc<dyn SymbolResolver>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn remove(&self, key: ModuleKey) -> Option<Arc<dyn SymbolResolver>> {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
    }

    pub fn contains(&self, key: ModuleKey) -> bool {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ResolverTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.0.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = table.keys().copied().collect();
        keys.sort();
        f.debug_struct("ResolverTable").field("modules", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyAllocator;
    use crate::process::SymbolMap;
    use crate::symbol::SymbolAddress;
    use kiln_core::Linkage;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn compiled_symbol(address: usize, linkage: Linkage) -> JitSymbol {
        JitSymbol::new(
            SymbolAddress::new(address),
            SymbolFlags::from_linkage(linkage, true),
        )
    }

    fn process_with(name: &str, address: usize) -> Arc<dyn ProcessSymbols> {
        let mut map = SymbolMap::new();
        map.insert(name, SymbolAddress::new(address));
        Arc::new(map)
    }

    #[test]
    fn test_compiled_tier_shadows_process() {
        let mut keys = KeyAllocator::new();
        let index = SharedSymbolIndex::new();
        index.write().insert_module(
            keys.allocate(),
            vec![("puts".into(), compiled_symbol(0x10, Linkage::Local))],
        );

        let lookup = TwoTierLookup::new(index, process_with("puts", 0x99));
        let symbol = lookup.find("puts").unwrap().unwrap();
        assert_eq!(symbol.address, SymbolAddress::new(0x10));
        assert!(!symbol.flags.exported);
    }

    #[test]
    fn test_falls_back_to_process_then_none() {
        let lookup = TwoTierLookup::new(SharedSymbolIndex::new(), process_with("puts", 0x99));
        assert_eq!(
            lookup.find("puts").unwrap(),
            Some(JitSymbol::new(SymbolAddress::new(0x99), SymbolFlags::exported()))
        );
        assert_eq!(lookup.find("missing").unwrap(), None);
    }

    #[test]
    fn test_compiled_tier_error_is_not_masked_by_process() {
        let mut keys = KeyAllocator::new();
        let index = SharedSymbolIndex::new();
        for address in [0x10, 0x20] {
            index.write().insert_module(
                keys.allocate(),
                vec![("f".into(), compiled_symbol(address, Linkage::Export))],
            );
        }

        let lookup = TwoTierLookup::new(index, process_with("f", 0x99));
        assert!(matches!(
            lookup.find("f"),
            Err(ResolutionError::Ambiguous { .. })
        ));
    }

    struct Scripted;

    impl SymbolLookup for Scripted {
        fn find(&self, name: &str) -> Result<Option<JitSymbol>, ResolutionError> {
            match name {
                "ok" => Ok(Some(compiled_symbol(0x10, Linkage::Export))),
                "bad" => Err(ResolutionError::Process {
                    name: name.to_string(),
                    reason: "scripted".to_string(),
                }),
                _ => Ok(None),
            }
        }
    }

    #[test]
    fn test_flag_errors_go_to_the_hook() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        let resolver = LookupResolver::new(
            Scripted,
            Box::new(move |err| sink.lock().unwrap().push(err)),
        );

        let flags = resolver.lookup_flags(&["ok", "missing"]);
        assert_eq!(flags.keys().collect::<Vec<_>>(), vec!["ok"]);
        assert!(reported.lock().unwrap().is_empty());

        assert!(resolver.lookup_flags(&["ok", "bad"]).is_empty());
        assert_eq!(reported.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_propagates_errors() {
        let resolver = LookupResolver::new(Scripted, Box::new(|_| {}));
        let resolved = resolver.lookup(&["ok", "missing"]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolver.lookup(&["bad"]).is_err());
    }

    #[test]
    fn test_resolver_table() {
        let mut keys = KeyAllocator::new();
        let key = keys.allocate();
        let table = ResolverTable::new();
        let shared = table.clone();

        table.insert(key, Arc::new(LookupResolver::new(Scripted, Box::new(|_| {}))));
        assert!(shared.contains(key));
        assert_eq!(shared.len(), 1);
        assert!(shared.get(key).is_some());

        assert!(table.remove(key).is_some());
        assert!(shared.is_empty());
        assert!(shared.get(key).is_none());
    }
}

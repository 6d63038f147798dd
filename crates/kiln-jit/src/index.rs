/*! Every symbol defined by a live module, searchable by name.
 *
 * Lookups follow a fixed precedence so results do not depend on hash order: a strong exported
 * definition wins over a weak one, which wins over a module-private one, and within a class the
 * oldest live module wins. Two strong exported definitions of one name cannot both be right, so
 * that case is reported instead of guessed.
 */

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ResolutionError;
use crate::key::ModuleKey;
use crate::symbol::{JitSymbol, SymbolAddress};

#[derive(Debug, Default)]
pub struct SymbolIndex {
    by_name: HashMap<String, Vec<(ModuleKey, JitSymbol)>>,
    by_module: BTreeMap<ModuleKey, Vec<String>>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_module(&mut self, key: ModuleKey, symbols: Vec<(String, JitSymbol)>) {
        let mut names = Vec::with_capacity(symbols.len());
        for (name, symbol) in symbols {
            let entries = self.by_name.entry(name.clone()).or_default();
            entries.push((key, symbol));
            entries.sort_by_key(|(owner, _)| *owner);
            names.push(name);
        }
        self.by_module.insert(key, names);
    }

    pub fn remove_module(&mut self, key: ModuleKey) -> bool {
        let Some(names) = self.by_module.remove(&key) else {
            return false;
        };
        for name in names {
            if let Some(entries) = self.by_name.get_mut(&name) {
                entries.retain(|(owner, _)| *owner != key);
                if entries.is_empty() {
                    self.by_name.remove(&name);
                }
            }
        }
        true
    }

    pub fn contains_module(&self, key: ModuleKey) -> bool {
        self.by_module.contains_key(&key)
    }

    pub fn find(
        &self,
        name: &str,
        exported_only: bool,
    ) -> Result<Option<(ModuleKey, JitSymbol)>, ResolutionError> {
        let Some(entries) = self.by_name.get(name) else {
            return Ok(None);
        };
        let visible = || {
            entries
                .iter()
                .filter(move |(_, symbol)| !exported_only || symbol.flags.exported)
        };

        let strong: Vec<_> = visible()
            .filter(|(_, symbol)| symbol.flags.exported && !symbol.flags.weak)
            .collect();
        if strong.len() > 1 {
            return Err(ResolutionError::Ambiguous {
                name: name.to_string(),
                modules: strong.iter().map(|(owner, _)| *owner).collect(),
            });
        }
        if let Some(hit) = strong.first() {
            return Ok(Some(**hit));
        }

        let weak = visible().find(|(_, symbol)| symbol.flags.weak);
        Ok(weak.or_else(|| visible().next()).copied())
    }

    /// Exported-or-not lookup restricted to one module.
    pub fn find_in(&self, key: ModuleKey, name: &str, exported_only: bool) -> Option<JitSymbol> {
        self.by_name.get(name)?.iter().find_map(|(owner, symbol)| {
            (*owner == key && (!exported_only || symbol.flags.exported)).then_some(*symbol)
        })
    }

    /// The live module that defines `name` at `address`, if any.
    pub fn owner_of(&self, name: &str, address: SymbolAddress) -> Option<ModuleKey> {
        self.by_name.get(name)?.iter().find_map(|(owner, symbol)| {
            (symbol.address == address).then_some(*owner)
        })
    }

    pub fn symbols_of(&self, key: ModuleKey) -> Vec<(String, JitSymbol)> {
        let Some(names) = self.by_module.get(&key) else {
            return Vec::new();
        };
        names
            .iter()
            .filter_map(|name| {
                self.find_in(key, name, false)
                    .map(|symbol| (name.clone(), symbol))
            })
            .collect()
    }

    pub fn modules(&self) -> impl Iterator<Item = ModuleKey> + '_ {
        self.by_module.keys().copied()
    }
}

/// Handle shared by the linking layer, which writes, and resolvers, which read.
#[derive(Debug, Clone, Default)]
pub struct SharedSymbolIndex(Arc<RwLock<SymbolIndex>>);

impl SharedSymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SymbolIndex> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SymbolIndex> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

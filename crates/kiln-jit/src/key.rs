use std::fmt;

/// Handle for a module added to the engine.
///
/// Keys are handed out in increasing order and never recycled, so a key that has been removed can
/// never alias a later module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey(u64);

impl ModuleKey {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct KeyAllocator {
    next: u64,
}

impl KeyAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ModuleKey {
        let key = ModuleKey(self.next);
        self.next += 1;
        key
    }

    /// Number of keys issued so far, removed ones included.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

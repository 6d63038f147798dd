use crate::target::DataLayout;

/// Leading byte that marks a name as already in linker form.
pub const VERBATIM_MARKER: char = '\x01';

/// Maps logical symbol names to the names the platform loader sees.
#[derive(Debug, Clone, Copy)]
pub struct Mangler;

impl Mangler {
    pub fn mangle(name: &str, layout: &DataLayout) -> String {
        if let Some(verbatim) = name.strip_prefix(VERBATIM_MARKER) {
            return verbatim.to_string();
        }

        match layout.global_prefix {
            Some(prefix) => {
                let mut mangled = String::with_capacity(name.len() + 1);
                mangled.push(prefix);
                mangled.push_str(name);
                mangled
            }
            None => name.to_string(),
        }
    }

    /// Inverse of [`Mangler::mangle`] for names carrying the global prefix.
    pub fn demangle<'a>(name: &'a str, layout: &DataLayout) -> &'a str {
        match layout.global_prefix {
            Some(prefix) => name.strip_prefix(prefix).unwrap_or(name),
            None => name,
        }
    }
}

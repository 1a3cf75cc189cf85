/// How a declared entry is compared with a top-level name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedPattern {
    Exact(&'static str),
    Prefix(&'static str),
}

impl ProtectedPattern {
    pub fn matches(&self, entry_name: &str) -> bool {
        match self {
            ProtectedPattern::Exact(name) => entry_name == *name,
            ProtectedPattern::Prefix(prefix) => entry_name.starts_with(prefix),
        }
    }
}

/// User-owned entries at the top level of the install directory. Anything
/// else is replaced on every content update.
pub const PROTECTED_ENTRIES: &[ProtectedPattern] = &[
    ProtectedPattern::Exact("saves"),
    ProtectedPattern::Exact("servers.dat"),
    ProtectedPattern::Exact("servers.dat_old"),
    // options.txt, optionsof.txt, optionsshaders.txt
    ProtectedPattern::Prefix("options"),
    ProtectedPattern::Exact("screenshots"),
    ProtectedPattern::Exact("resourcepacks"),
    ProtectedPattern::Exact("shaderpacks"),
    // Hidden files, including in-flight download archives.
    ProtectedPattern::Prefix("."),
];

/// Case-sensitive. Only meaningful for direct children of the install
/// directory; a protected directory is kept with all of its contents.
pub fn is_protected(entry_name: &str) -> bool {
    PROTECTED_ENTRIES
        .iter()
        .any(|pattern| pattern.matches(entry_name))
}

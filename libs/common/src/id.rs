use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = kickoff_common::id::prefixed_ulid("mt");
/// assert!(id.starts_with("mt_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for types that carry a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const ACCOUNT: &str = "usr";
    pub const MATCH: &str = "mt";
    pub const ENROLLMENT: &str = "enr";
    pub const CONNECTION: &str = "conn";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::MATCH);
        assert!(id.starts_with("mt_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 3 + 26);
    }

    #[test]
    fn ids_are_unique() {
        let a = prefixed_ulid(prefix::ENROLLMENT);
        let b = prefixed_ulid(prefix::ENROLLMENT);
        assert_ne!(a, b);
    }
}

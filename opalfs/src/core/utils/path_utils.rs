// SPDX-License-Identifier: MIT

//! Path splitting shared by all plugins.
//!
//! Paths are '/'-separated; leading/trailing/repeated separators are
//! tolerated. Each format applies its own case convention on top.

/// Splits a path into non-empty components.
pub fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// True for "", "/", "//", ... — the volume root.
pub fn is_root_path(path: &str) -> bool {
    path_components(path).next().is_none()
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_components() {
        let parts: Vec<&str> = path_components("/a//b/c/").collect();
        assert_eq!(parts, ["a", "b", "c"]);
    }

    #[test]
    fn test_root() {
        assert!(is_root_path(""));
        assert!(is_root_path("/"));
        assert!(!is_root_path("/a"));
    }
}

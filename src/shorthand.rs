//! Field-name markers: `name*` (required) and `name()` (computed).

use crate::error::SchemaError;

const REQUIRED_MARKER: &str = "*";
const COMPUTED_MARKER: &str = "()";

/// A field name with its markers stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shorthand {
    pub name: String,
    pub required: bool,
    /// Computed fields are also read-only.
    pub computed: bool,
}

/// Strip the shorthand marker from a declared field name.
///
/// # Errors
///
/// Returns `SchemaError::ConflictingMarkers` if the name carries both markers,
/// in either order, and `SchemaError::InvalidFieldConfig` if nothing is left
/// once the marker is removed.
pub fn expand(declared: &str) -> Result<Shorthand, SchemaError> {
    let declared = declared.trim();
    let mut name = declared;
    let mut required = false;
    let mut computed = false;

    if let Some(rest) = name.strip_suffix(REQUIRED_MARKER) {
        name = rest;
        required = true;
    }
    if let Some(rest) = name.strip_suffix(COMPUTED_MARKER) {
        name = rest;
        computed = true;
    }
    // `name*()` is only caught after the first strip of the other order.
    if !required && computed {
        if let Some(rest) = name.strip_suffix(REQUIRED_MARKER) {
            name = rest;
            required = true;
        }
    }

    if required && computed {
        return Err(SchemaError::ConflictingMarkers {
            name: declared.to_string(),
        });
    }

    let name = name.trim_end();
    if name.is_empty() {
        return Err(SchemaError::InvalidFieldConfig {
            field: declared.to_string(),
            message: "field name is empty".to_string(),
        });
    }

    Ok(Shorthand {
        name: name.to_string(),
        required,
        computed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name() {
        let s = expand("title").unwrap();
        assert_eq!(s.name, "title");
        assert!(!s.required);
        assert!(!s.computed);
    }

    #[test]
    fn required_marker() {
        let s = expand("name*").unwrap();
        assert_eq!(s.name, "name");
        assert!(s.required);
        assert!(!s.computed);
    }

    #[test]
    fn computed_marker() {
        let s = expand("updated_at()").unwrap();
        assert_eq!(s.name, "updated_at");
        assert!(s.computed);
        assert!(!s.required);
    }

    #[test]
    fn dotted_names_keep_their_path() {
        let s = expand("address.street*").unwrap();
        assert_eq!(s.name, "address.street");
        assert!(s.required);
    }

    #[test]
    fn both_markers_conflict() {
        assert!(matches!(
            expand("slug()*"),
            Err(SchemaError::ConflictingMarkers { .. })
        ));
        assert!(matches!(
            expand("slug*()"),
            Err(SchemaError::ConflictingMarkers { .. })
        ));
    }

    #[test]
    fn bare_marker_is_rejected() {
        assert!(matches!(
            expand("*"),
            Err(SchemaError::InvalidFieldConfig { .. })
        ));
    }
}

//! Parsing of `[@][*][package:][type/]name` resource references.

/// A reference split into its parts, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub package: String,
    pub type_name: String,
    pub name: String,
    /// False when the reference was written `@*`, which may name private resources.
    pub only_public: bool,
}

/// Splits a reference, using `def_type` and `def_package` for the parts it leaves out.
pub fn expand_resource_ref(
    reference: &str,
    def_type: Option<&str>,
    def_package: Option<&str>,
) -> Result<ResourceRef, &'static str> {
    // The package ends at the last ':' before the type separator
    let type_end = reference.find('/');
    let package_end = reference[..type_end.unwrap_or(reference.len())].rfind(':');

    let mut start = 0;
    if reference.starts_with('@') {
        start += 1;
    }
    let mut only_public = true;
    if reference[start..].starts_with('*') {
        start += 1;
        only_public = false;
    }

    let package = match package_end {
        Some(end) => {
            let package = reference.get(start..end).unwrap_or_default().to_string();
            start = end + 1;
            package
        }
        None => def_package
            .ok_or("No resource package specified")?
            .to_string(),
    };
    let type_name = match type_end {
        Some(end) => {
            let type_name = reference.get(start..end).unwrap_or_default().to_string();
            start = end + 1;
            type_name
        }
        None => def_type.ok_or("No resource type specified")?.to_string(),
    };
    let name = reference.get(start..).unwrap_or_default().to_string();

    if package.is_empty() {
        return Err("Resource package cannot be an empty string");
    }
    if type_name.is_empty() {
        return Err("Resource type cannot be an empty string");
    }
    if name.is_empty() {
        return Err("Resource id cannot be an empty string");
    }

    Ok(ResourceRef {
        package,
        type_name,
        name,
        only_public,
    })
}

/// Whether `name` can be used as a resource name: letters, `_`, and digits after the first
/// character.
pub fn is_valid_resource_name(name: &str) -> bool {
    name.chars().enumerate().all(|(i, c)| {
        c.is_ascii_alphabetic() || c == '_' || (i > 0 && c.is_ascii_digit())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_in_defaults() {
        let r = expand_resource_ref("@string/title", None, Some("com.example")).unwrap();
        assert_eq!(r.package, "com.example");
        assert_eq!(r.type_name, "string");
        assert_eq!(r.name, "title");
        assert!(r.only_public);

        let r = expand_resource_ref("android:textColor", Some("attr"), Some("app")).unwrap();
        assert_eq!(r.package, "android");
        assert_eq!(r.type_name, "attr");
        assert_eq!(r.name, "textColor");
    }

    #[test]
    fn private_references() {
        let r = expand_resource_ref("@*android:string/hidden", None, Some("app")).unwrap();
        assert_eq!(r.package, "android");
        assert!(!r.only_public);
    }

    #[test]
    fn reports_missing_parts() {
        assert_eq!(
            expand_resource_ref("title", None, Some("app")),
            Err("No resource type specified")
        );
        assert_eq!(
            expand_resource_ref("string/title", None, None),
            Err("No resource package specified")
        );
        assert_eq!(
            expand_resource_ref(":string/title", None, None),
            Err("Resource package cannot be an empty string")
        );
        assert_eq!(
            expand_resource_ref("string/", None, Some("app")),
            Err("Resource id cannot be an empty string")
        );
    }

    #[test]
    fn validates_names() {
        assert!(is_valid_resource_name("app_name2"));
        assert!(!is_valid_resource_name("2fast"));
        assert!(!is_valid_resource_name("with-dash"));
    }
}

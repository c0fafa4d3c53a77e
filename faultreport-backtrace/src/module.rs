use std::path::{Path, PathBuf};

/// Package metadata of the module a frame belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// The package name.
    pub name: String,
    /// The package version.
    pub version: Option<String>,
    /// The package description.
    pub description: Option<String>,
    /// The package authors.
    pub authors: Vec<String>,
    /// The package repository URL.
    pub repository: Option<String>,
}

/// Looks up the package that owns a source file.
///
/// Implementations never fail: a file that cannot be attributed to a
/// package yields `None`. The returned path is the package root when one was
/// found, or the queried path otherwise.
pub trait ModuleResolver: Send + Sync {
    /// Reads the package metadata for `path`.
    fn read_module(&self, path: &Path) -> (Option<ModuleDescriptor>, PathBuf);
}

/// Resolves modules by walking up from a source file to the nearest
/// `Cargo.toml` with a `[package]` table.
///
/// Relative paths are resolved against the current working directory.
/// Fields inherited from a workspace (`version.workspace = true`) are
/// reported as absent.
#[derive(Copy, Clone, Debug, Default)]
pub struct CargoManifestResolver;

impl ModuleResolver for CargoManifestResolver {
    fn read_module(&self, path: &Path) -> (Option<ModuleDescriptor>, PathBuf) {
        let absolute = if path.is_relative() {
            match std::env::current_dir() {
                Ok(cwd) => cwd.join(path),
                Err(_) => path.to_path_buf(),
            }
        } else {
            path.to_path_buf()
        };

        for directory in absolute.ancestors().skip(1) {
            let manifest_path = directory.join("Cargo.toml");
            let Ok(content) = std::fs::read_to_string(&manifest_path) else {
                continue;
            };
            match parse_manifest(&content) {
                Ok(Some(descriptor)) => return (Some(descriptor), directory.to_path_buf()),
                Ok(None) => continue,
                Err(error) => {
                    tracing::debug!(
                        manifest = %manifest_path.display(),
                        %error,
                        "unreadable manifest while resolving calling module"
                    );
                    return (None, path.to_path_buf());
                }
            }
        }

        (None, path.to_path_buf())
    }
}

/// Reads the `[package]` table of a manifest; `Ok(None)` for virtual
/// workspace manifests.
fn parse_manifest(content: &str) -> Result<Option<ModuleDescriptor>, toml::de::Error> {
    let manifest: toml::Table = toml::from_str(content)?;
    let Some(package) = manifest.get("package").and_then(toml::Value::as_table) else {
        return Ok(None);
    };
    let string = |key: &str| {
        package
            .get(key)
            .and_then(toml::Value::as_str)
            .map(str::to_owned)
    };
    let Some(name) = string("name") else {
        return Ok(None);
    };

    let authors = package
        .get("authors")
        .and_then(toml::Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(toml::Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(ModuleDescriptor {
        name,
        version: string("version"),
        description: string("description"),
        authors,
        repository: string("repository"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[package]
name = "billing-service"
version = "2.3.1"
description = "Invoices things"
authors = ["Ada <ada@example.com>", "Grace"]
edition.workspace = true

[dependencies]
serde = "1"
"#;

    #[test]
    fn test_parse_manifest() {
        let descriptor = parse_manifest(MANIFEST).unwrap().unwrap();
        assert_eq!(descriptor.name, "billing-service");
        assert_eq!(descriptor.version.as_deref(), Some("2.3.1"));
        assert_eq!(descriptor.description.as_deref(), Some("Invoices things"));
        assert_eq!(descriptor.authors, ["Ada <ada@example.com>", "Grace"]);
        assert_eq!(descriptor.repository, None);
    }

    #[test]
    fn test_parse_virtual_manifest() {
        assert_eq!(
            parse_manifest("[workspace]\nmembers = [\"a\"]\n").unwrap(),
            None
        );
    }

    #[test]
    fn test_inherited_version_is_absent() {
        let descriptor = parse_manifest("[package]\nname = \"a\"\nversion.workspace = true\n")
            .unwrap()
            .unwrap();
        assert_eq!(descriptor.version, None);
    }

    #[test]
    fn test_resolver_walks_up_past_virtual_manifest() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("Cargo.toml"), MANIFEST).unwrap();
        let member = root.path().join("crates/inner");
        std::fs::create_dir_all(member.join("src")).unwrap();
        std::fs::write(member.join("Cargo.toml"), "[workspace]\n").unwrap();

        let (descriptor, resolved) =
            CargoManifestResolver.read_module(&member.join("src/main.rs"));
        assert_eq!(descriptor.unwrap().name, "billing-service");
        assert_eq!(resolved, root.path());
    }

    #[test]
    fn test_resolver_without_manifest() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("orphan.rs");
        let (descriptor, resolved) = CargoManifestResolver.read_module(&file);
        // A manifest further up (outside the temp dir) is possible but unlikely.
        if descriptor.is_none() {
            assert_eq!(resolved, file);
        }
    }
}

//! npm package resolution and function URI naming

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const UNKNOWN_PACKAGE_NAME: &str = "<name>";
pub const UNKNOWN_PACKAGE_VERSION: &str = "<version>";

const MANIFEST_FILE: &str = "package.json";
const NODE_PREFIX: &str = "node:";
const SCRIPT_EXTENSIONS: [&str; 2] = [".js", ".ts"];

#[derive(Debug, Deserialize)]
struct Manifest {
    name: Option<String>,
    version: Option<String>,
}

/// Name and version of an npm package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

impl PackageInfo {
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_PACKAGE_NAME.to_string(),
            version: UNKNOWN_PACKAGE_VERSION.to_string(),
        }
    }

    /// `name@version`, as used for the merged graph's package name
    pub fn qualified(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Package owning a source file, plus the file's path inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLocation {
    pub package: PackageInfo,
    /// Path relative to the package root, without script extension
    pub relative: String,
}

/// Finds the nearest `package.json` above a source file
///
/// Manifests are read at most once per directory. A manifest missing either
/// `name` or `version` does not count and the search continues upward.
#[derive(Debug, Default)]
pub struct PackageResolver {
    manifests: HashMap<PathBuf, Option<PackageInfo>>,
}

impl PackageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manifest of `dir` itself, if it has a usable one
    pub fn manifest(&mut self, dir: &Path) -> Option<PackageInfo> {
        if let Some(cached) = self.manifests.get(dir) {
            return cached.clone();
        }
        let info = read_manifest(dir);
        self.manifests.insert(dir.to_path_buf(), info.clone());
        info
    }

    pub fn locate(&mut self, file: &str) -> PackageLocation {
        let path = Path::new(file);
        for dir in path.ancestors().skip(1) {
            if dir.as_os_str().is_empty() {
                break;
            }
            let Some(package) = self.manifest(dir) else {
                continue;
            };
            let relative = path
                .strip_prefix(dir)
                .map(|rel| rel.to_string_lossy().into_owned())
                .unwrap_or_else(|_| file.to_string());
            return PackageLocation {
                package,
                relative: strip_script_extension(&relative).to_string(),
            };
        }
        PackageLocation {
            package: PackageInfo::unknown(),
            relative: strip_script_extension(file).to_string(),
        }
    }

    pub fn cached_directories(&self) -> usize {
        self.manifests.len()
    }
}

fn read_manifest(dir: &Path) -> Option<PackageInfo> {
    let path = dir.join(MANIFEST_FILE);
    let contents = std::fs::read_to_string(&path).ok()?;
    let manifest: Manifest = match serde_json::from_str(&contents) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable manifest: {}", e);
            return None;
        }
    };
    Some(PackageInfo {
        name: manifest.name?,
        version: manifest.version?,
    })
}

fn strip_script_extension(path: &str) -> &str {
    SCRIPT_EXTENSIONS
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .unwrap_or(path)
}

/// Display name of a function, synthesizing one for anonymous functions
pub fn display_name(name: &str, start: i32, end: i32) -> String {
    if !name.is_empty() || start == 0 {
        return name.to_string();
    }
    format!(".anonymous_function_{}_{}", start, end)
}

/// Stable URI of a function across processes and runs
///
/// Builtins map to `node://node/[node:<module>]/<name>()`, everything else to
/// `javascript://<pkg>$<version>/[<pkg>:<version>:<file>]/<name>()`.
pub fn function_uri(
    resolver: &mut PackageResolver,
    name: &str,
    start: i32,
    end: i32,
    path: &str,
) -> String {
    let name = display_name(name, start, end);
    if let Some(module) = path.strip_prefix(NODE_PREFIX) {
        return format!("node://node/[node:{}]/{}()", module, name);
    }
    let location = resolver.locate(path);
    format!(
        "javascript://{pkg}${version}/[{pkg}:{version}:{file}]/{name}()",
        pkg = location.package.name,
        version = location.package.version,
        file = location.relative,
        name = name,
    )
}

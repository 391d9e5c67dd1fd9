// ─── Library Resolver ───
// Turns a merged library list into classpath, module path and native bundles
// for one platform.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::core::downloader::DownloadEntry;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::join_classpath;
use crate::core::maven::MavenArtifact;
use crate::core::platform::Platform;
use crate::core::version::{LibraryArtifact, LibraryEntry, MergedDescriptor};

/// One archive on disk, with the download that produces it when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArtifact {
    /// `group:artifact[:classifier]`, version excluded.
    pub key: String,
    pub coordinate: String,
    pub path: PathBuf,
    pub download: Option<DownloadEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeBundle {
    pub artifact: ResolvedArtifact,
    /// Archive entry prefixes never unpacked.
    pub exclude: Vec<String>,
}

impl NativeBundle {
    /// Stable identity used in the extraction key.
    pub fn identity(&self) -> &str {
        &self.artifact.coordinate
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedLibraries {
    pub classpath: Vec<ResolvedArtifact>,
    /// Subset of `classpath` flagged as modules, same order.
    pub module_path: Vec<ResolvedArtifact>,
    pub natives: Vec<NativeBundle>,
}

impl ResolvedLibraries {
    /// Every artifact that still has to be fetched.
    pub fn download_entries(&self) -> Vec<DownloadEntry> {
        self.classpath
            .iter()
            .chain(self.natives.iter().map(|n| &n.artifact))
            .filter_map(|a| a.download.clone())
            .collect()
    }

    pub fn classpath_string(&self, separator: &str) -> String {
        join_paths(&self.classpath, separator)
    }

    pub fn module_path_string(&self, separator: &str) -> String {
        join_paths(&self.module_path, separator)
    }
}

fn join_paths(artifacts: &[ResolvedArtifact], separator: &str) -> String {
    join_classpath(artifacts.iter().map(|a| a.path.as_path()), separator)
}

pub struct LibraryResolver {
    /// First root receives downloads; all roots are searched for existing files.
    library_roots: Vec<PathBuf>,
    /// Version roots searched for `<id>/<id>.jar`; first receives the download.
    version_roots: Vec<PathBuf>,
}

impl LibraryResolver {
    pub fn new(libraries_dir: PathBuf, versions_dir: PathBuf) -> Self {
        Self {
            library_roots: vec![libraries_dir],
            version_roots: vec![versions_dir],
        }
    }

    /// Additional read-only roots (e.g. libraries a loader installer wrote
    /// into a profile directory).
    pub fn with_extra_roots(mut self, libraries: PathBuf, versions: PathBuf) -> Self {
        self.library_roots.push(libraries);
        self.version_roots.push(versions);
        self
    }

    pub fn resolve(
        &self,
        merged: &MergedDescriptor,
        platform: &Platform,
    ) -> LauncherResult<ResolvedLibraries> {
        let mut classpath: Vec<(ResolvedArtifact, bool)> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut natives: Vec<NativeBundle> = Vec::new();
        let mut native_slots: HashMap<String, usize> = HashMap::new();

        for library in &merged.libraries {
            if !library.is_allowed(platform) {
                debug!("Skipping library (rules): {}", library.name);
                continue;
            }

            let coordinate = match library.coordinate() {
                Ok(c) => c,
                Err(e) if library.optional => {
                    warn!("Skipping optional library {}: {}", library.name, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(classifier) = library.native_classifier(platform) {
                if library.natives.is_empty() && !classifier_fits(&classifier, platform) {
                    debug!("Skipping native for another platform: {}", library.name);
                    continue;
                }
                let Some(artifact) = self.native_artifact(library, &coordinate, &classifier) else {
                    if library.optional {
                        continue;
                    }
                    return Err(unresolved(library, platform));
                };
                let bundle = NativeBundle {
                    artifact,
                    exclude: library.extract_excludes(),
                };
                upsert(&mut natives, &mut native_slots, bundle.artifact.key.clone(), bundle);
                continue;
            }

            // Natives-only entries for other platforms carry no main artifact.
            if !library.natives.is_empty() && !has_main_artifact(library) {
                continue;
            }

            let Some(artifact) = self.main_artifact(library, &coordinate) else {
                if library.optional {
                    continue;
                }
                return Err(unresolved(library, platform));
            };
            upsert(
                &mut classpath,
                &mut slots,
                coordinate.ga_key(),
                (artifact, library.module),
            );
        }

        classpath.push((self.client_artifact(merged, platform)?, false));

        let module_path = classpath
            .iter()
            .filter(|(_, module)| *module)
            .map(|(a, _)| a.clone())
            .collect();
        let resolved = ResolvedLibraries {
            classpath: classpath.into_iter().map(|(a, _)| a).collect(),
            module_path,
            natives,
        };

        info!(
            "Resolved {} libraries for {}: {} classpath, {} module, {} native",
            merged.libraries.len(),
            platform,
            resolved.classpath.len(),
            resolved.module_path.len(),
            resolved.natives.len()
        );
        Ok(resolved)
    }

    fn main_artifact(
        &self,
        library: &LibraryEntry,
        coordinate: &MavenArtifact,
    ) -> Option<ResolvedArtifact> {
        let declared = library.downloads.as_ref().and_then(|d| d.artifact.as_ref());
        let fallback_sha1 = library.sha1.as_deref();
        self.artifact(
            coordinate.ga_key(),
            coordinate,
            declared,
            library.url.as_deref(),
            fallback_sha1,
        )
    }

    fn native_artifact(
        &self,
        library: &LibraryEntry,
        coordinate: &MavenArtifact,
        classifier: &str,
    ) -> Option<ResolvedArtifact> {
        let mut native = coordinate.clone();
        native.classifier = Some(classifier.to_string());
        let key = format!("{}:{}", coordinate.ga_key(), classifier);

        // Coordinates that already carry the classifier use the plain artifact block.
        let declared = library.downloads.as_ref().and_then(|d| {
            d.classifiers.get(classifier).or_else(|| {
                d.artifact
                    .as_ref()
                    .filter(|_| coordinate.classifier.is_some())
            })
        });
        self.artifact(key, &native, declared, library.url.as_deref(), None)
    }

    /// Locate or plan an archive: existing file under any root, else a
    /// declared download, else the coordinate under a repository base.
    fn artifact(
        &self,
        key: String,
        coordinate: &MavenArtifact,
        declared: Option<&LibraryArtifact>,
        repository: Option<&str>,
        fallback_sha1: Option<&str>,
    ) -> Option<ResolvedArtifact> {
        let relative = declared
            .and_then(|a| a.path.as_deref())
            .map(PathBuf::from)
            .unwrap_or_else(|| coordinate.local_path());
        let primary = self.library_roots.first()?.join(&relative);

        let url = match declared {
            Some(a) if !a.url.is_empty() => Some(a.url.clone()),
            Some(_) => None,
            None => repository.map(|repo| coordinate.url(repo)),
        };
        let sha1 = declared
            .and_then(|a| a.sha1.clone())
            .or_else(|| fallback_sha1.map(str::to_string));

        let existing = self
            .library_roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file());

        let (path, download) = match (existing, url) {
            // A verified download target stays managed, so corruption is repaired.
            (Some(path), Some(url)) if path == primary && sha1.is_some() => (
                path.clone(),
                Some(DownloadEntry {
                    url,
                    dest: path,
                    sha1,
                    size: declared.and_then(|a| a.size),
                }),
            ),
            (Some(path), _) => (path, None),
            (None, Some(url)) => (
                primary.clone(),
                Some(DownloadEntry {
                    url,
                    dest: primary,
                    sha1,
                    size: declared.and_then(|a| a.size),
                }),
            ),
            (None, None) => return None,
        };

        Some(ResolvedArtifact {
            key,
            coordinate: coordinate.to_string(),
            path,
            download,
        })
    }

    fn client_artifact(
        &self,
        merged: &MergedDescriptor,
        platform: &Platform,
    ) -> LauncherResult<ResolvedArtifact> {
        if let Some(client) = &merged.client {
            let path = self.version_roots[0]
                .join(&client.version_id)
                .join(format!("{}.jar", client.version_id));
            return Ok(ResolvedArtifact {
                key: format!("client:{}", client.version_id),
                coordinate: client.version_id.clone(),
                download: Some(DownloadEntry {
                    url: client.download.url.clone(),
                    dest: path.clone(),
                    sha1: client.download.sha1.clone(),
                    size: client.download.size,
                }),
                path,
            });
        }

        // No download declared: accept a jar already placed by an installer.
        for id in merged.chain.iter().rev() {
            for root in &self.version_roots {
                let path = root.join(id).join(format!("{}.jar", id));
                if path.is_file() {
                    return Ok(ResolvedArtifact {
                        key: format!("client:{}", id),
                        coordinate: id.clone(),
                        path,
                        download: None,
                    });
                }
            }
        }

        Err(LauncherError::UnresolvedLibrary {
            name: format!("client jar of {}", merged.id),
            platform: platform.to_string(),
        })
    }
}

/// Keep the slot of the first occurrence, take the content of the latest
/// (most-descendant) one.
fn upsert<T>(items: &mut Vec<T>, slots: &mut HashMap<String, usize>, key: String, item: T) {
    match slots.get(&key) {
        Some(&index) => items[index] = item,
        None => {
            slots.insert(key, items.len());
            items.push(item);
        }
    }
}

fn has_main_artifact(library: &LibraryEntry) -> bool {
    library
        .downloads
        .as_ref()
        .is_some_and(|d| d.artifact.is_some())
        || library.url.is_some()
}

fn unresolved(library: &LibraryEntry, platform: &Platform) -> LauncherError {
    LauncherError::UnresolvedLibrary {
        name: library.name.clone(),
        platform: platform.to_string(),
    }
}

/// `natives-<os>[-<arch>]` classifiers. A bare OS means x86_64.
fn classifier_fits(classifier: &str, platform: &Platform) -> bool {
    let Some(rest) = classifier.strip_prefix("natives-") else {
        return true;
    };
    let (os, arch) = match rest.split_once('-') {
        Some((os, arch)) => (os, arch),
        None => (rest, "x86_64"),
    };
    let os = match os {
        "macos" | "osx" => "osx",
        other => other,
    };
    let arch = match arch {
        "arm64" | "aarch_64" | "aarch64" => "arm64",
        "x86" | "32" => "x86",
        "x86_64" | "64" => "x86_64",
        other => other,
    };
    os == platform.os && arch == platform.arch
}

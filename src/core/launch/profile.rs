// ─── Version Profile ───
// Reads the version JSON left under `versions/` by the content archive and
// the mod-loader installer, and flattens it with the versions it inherits
// from into a main class, a classpath and raw argument lists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

const MAX_INHERITANCE_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionJson {
    id: String,
    #[serde(default)]
    main_class: Option<String>,
    #[serde(default)]
    inherits_from: Option<String>,
    /// Version whose client jar is used, when it is not the root version.
    #[serde(default)]
    jar: Option<String>,
    #[serde(default)]
    assets: Option<String>,
    #[serde(default)]
    asset_index: Option<AssetIndexRef>,
    #[serde(default)]
    libraries: Vec<LibraryEntry>,
    #[serde(default)]
    arguments: Option<Arguments>,
    /// Legacy space-separated game arguments (pre-1.13).
    #[serde(default)]
    minecraft_arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetIndexRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Arguments {
    #[serde(default)]
    game: Vec<Value>,
    #[serde(default)]
    jvm: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct LibraryEntry {
    name: String,
    #[serde(default)]
    downloads: Option<LibraryDownloads>,
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
struct LibraryDownloads {
    #[serde(default)]
    artifact: Option<LibraryArtifact>,
}

#[derive(Debug, Deserialize)]
struct LibraryArtifact {
    path: String,
}

// ─── Rules ───

#[derive(Debug, Deserialize)]
struct Rule {
    action: RuleAction,
    #[serde(default)]
    os: Option<OsRule>,
    #[serde(default)]
    features: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Deserialize)]
struct OsRule {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arch: Option<String>,
}

impl Rule {
    /// Whether the rule matches this machine. No optional features (demo
    /// user, custom resolution, quick play) are ever enabled.
    fn applies(&self) -> bool {
        if self.features.as_ref().is_some_and(|features| !features.is_empty()) {
            return false;
        }
        match &self.os {
            None => true,
            Some(os) => {
                os.name.as_deref().map_or(true, |name| name == current_os_name())
                    && os.arch.as_deref().map_or(true, |arch| arch == current_arch_name())
            }
        }
    }
}

/// Mojang semantics: no rules allows; otherwise the last matching rule wins
/// and nothing matching disallows.
fn rules_allow(rules: &[Rule]) -> bool {
    if rules.is_empty() {
        return true;
    }
    let mut allowed = false;
    for rule in rules.iter().filter(|rule| rule.applies()) {
        allowed = rule.action == RuleAction::Allow;
    }
    allowed
}

fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn current_arch_name() -> &'static str {
    if cfg!(target_arch = "x86") {
        "x86"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "x86_64"
    }
}

fn argument_values(values: &[Value]) -> Vec<String> {
    values.iter().flat_map(argument_value).collect()
}

fn argument_value(value: &Value) -> Vec<String> {
    let obj = match value {
        Value::String(arg) => return vec![arg.clone()],
        Value::Object(obj) => obj,
        _ => return Vec::new(),
    };

    let rules: Vec<Rule> = match obj.get("rules") {
        None => Vec::new(),
        Some(raw) => match serde_json::from_value(raw.clone()) {
            Ok(rules) => rules,
            Err(err) => {
                debug!("Skipping argument with unreadable rules: {}", err);
                return Vec::new();
            }
        },
    };
    if !rules_allow(&rules) {
        return Vec::new();
    }

    match obj.get("value") {
        Some(Value::String(arg)) => vec![arg.clone()],
        Some(Value::Array(args)) => args
            .iter()
            .filter_map(|arg| arg.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// `group:artifact:version[:classifier][@ext]` to its repository path.
fn maven_path(coordinate: &str) -> Option<PathBuf> {
    let (coordinate, extension) = coordinate.split_once('@').unwrap_or((coordinate, "jar"));
    let parts: Vec<&str> = coordinate.split(':').collect();
    let (group, artifact, version, classifier) = match parts.as_slice() {
        [group, artifact, version] => (*group, *artifact, *version, None),
        [group, artifact, version, classifier] => (*group, *artifact, *version, Some(*classifier)),
        _ => return None,
    };

    let file_name = match classifier {
        Some(classifier) => format!("{artifact}-{version}-{classifier}.{extension}"),
        None => format!("{artifact}-{version}.{extension}"),
    };
    let mut path: PathBuf = group.split('.').collect();
    path.push(artifact);
    path.push(version);
    path.push(file_name);
    Some(path)
}

/// Libraries are deduplicated on everything but the version, so a loader can
/// replace a library its parent version declares.
fn library_key(coordinate: &str) -> String {
    let coordinate = coordinate.split('@').next().unwrap_or(coordinate);
    let parts: Vec<&str> = coordinate.split(':').collect();
    match parts.as_slice() {
        [group, artifact, _version, classifier] => format!("{group}:{artifact}:{classifier}"),
        [group, artifact, ..] => format!("{group}:{artifact}"),
        _ => coordinate.to_string(),
    }
}

// ─── Resolution ───

/// A version profile flattened across its `inheritsFrom` chain. Arguments
/// still carry their `${...}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchProfile {
    /// Id of the launched version, e.g. `1.20.1-forge-47.2.0`.
    pub id: String,
    pub main_class: String,
    pub asset_index: Option<String>,
    /// Libraries present on disk, then the client jar.
    pub classpath: Vec<PathBuf>,
    pub jvm_args: Vec<String>,
    pub game_args: Vec<String>,
}

/// Resolve what to launch for `game_version`.
///
/// A profile under `versions/` that inherits from `game_version` (the one a
/// mod-loader installer writes) is preferred over the plain release. Missing
/// or unreadable profiles are launch failures.
pub async fn resolve_launch_profile(install_dir: &Path, game_version: &str) -> LauncherResult<LaunchProfile> {
    let versions_dir = install_dir.join("versions");
    let leaf = match find_loader_profile(&versions_dir, game_version).await {
        Some(id) => {
            info!("Using mod-loader profile {}", id);
            id
        }
        None => {
            info!("No mod-loader profile found, using release {}", game_version);
            game_version.to_string()
        }
    };

    let chain = load_chain(&versions_dir, &leaf).await?;
    flatten(install_dir, chain)
}

async fn find_loader_profile(versions_dir: &Path, game_version: &str) -> Option<String> {
    let mut entries = tokio::fs::read_dir(versions_dir).await.ok()?;
    let mut candidates = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let id = entry.file_name().to_string_lossy().to_string();
        let Ok(raw) = tokio::fs::read(entry.path().join(format!("{id}.json"))).await else {
            continue;
        };
        match serde_json::from_slice::<VersionJson>(&raw) {
            Ok(json) if json.inherits_from.as_deref() == Some(game_version) => candidates.push(id),
            Ok(_) => {}
            Err(err) => warn!("Ignoring unreadable version profile {}: {}", id, err),
        }
    }

    // Several installs side by side: take the highest id.
    candidates.sort();
    candidates.pop()
}

/// The profile named `leaf` first, followed by each version it inherits from.
async fn load_chain(versions_dir: &Path, leaf: &str) -> LauncherResult<Vec<VersionJson>> {
    let mut chain: Vec<VersionJson> = Vec::new();
    let mut next = Some(leaf.to_string());

    while let Some(id) = next {
        if chain.len() >= MAX_INHERITANCE_DEPTH {
            return Err(LauncherError::LaunchFailed(format!(
                "version profile {leaf} inherits too deeply"
            )));
        }

        let path = versions_dir.join(&id).join(format!("{id}.json"));
        let raw = tokio::fs::read(&path).await.map_err(|e| {
            LauncherError::LaunchFailed(format!("cannot read version profile {path:?}: {e}"))
        })?;
        let json: VersionJson = serde_json::from_slice(&raw).map_err(|e| {
            LauncherError::LaunchFailed(format!("invalid version profile {path:?}: {e}"))
        })?;

        debug!("Loaded version profile {} (inherits {:?})", json.id, json.inherits_from);
        next = json.inherits_from.clone();
        chain.push(json);
    }

    Ok(chain)
}

fn flatten(install_dir: &Path, chain: Vec<VersionJson>) -> LauncherResult<LaunchProfile> {
    let (Some(leaf), Some(root)) = (chain.first(), chain.last()) else {
        return Err(LauncherError::LaunchFailed("empty version profile".into()));
    };
    let id = leaf.id.clone();

    let main_class = chain
        .iter()
        .find_map(|version| version.main_class.clone())
        .ok_or_else(|| LauncherError::LaunchFailed(format!("version profile {id} has no main class")))?;
    let asset_index = chain.iter().find_map(|version| {
        version
            .asset_index
            .as_ref()
            .map(|index| index.id.clone())
            .or_else(|| version.assets.clone())
    });
    let jar_id = chain
        .iter()
        .find_map(|version| version.jar.clone())
        .unwrap_or_else(|| root.id.clone());

    // Libraries: the most derived declaration of an artifact wins.
    let libraries_dir = install_dir.join("libraries");
    let mut seen = HashSet::new();
    let mut classpath = Vec::new();
    for library in chain.iter().flat_map(|version| &version.libraries) {
        if !rules_allow(&library.rules) || !seen.insert(library_key(&library.name)) {
            continue;
        }
        let relative = match library.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            Some(artifact) => PathBuf::from(&artifact.path),
            None => match maven_path(&library.name) {
                Some(path) => path,
                None => {
                    warn!("Skipping library with invalid coordinate {}", library.name);
                    continue;
                }
            },
        };
        let path = libraries_dir.join(relative);
        if path.exists() {
            classpath.push(path);
        } else {
            warn!("Library not found on disk (skipping): {}", library.name);
        }
    }

    let client_jar = install_dir
        .join("versions")
        .join(&jar_id)
        .join(format!("{jar_id}.jar"));
    if client_jar.exists() {
        classpath.push(client_jar);
    } else {
        warn!("Client jar {:?} is missing", client_jar);
    }

    // Arguments: parent first, each child appends. A legacy argument string
    // replaces the whole game argument list.
    let mut jvm_args = Vec::new();
    let mut game_args = Vec::new();
    for version in chain.iter().rev() {
        if let Some(arguments) = &version.arguments {
            jvm_args.extend(argument_values(&arguments.jvm));
            game_args.extend(argument_values(&arguments.game));
        }
    }
    if let Some(legacy) = chain.iter().find_map(|version| version.minecraft_arguments.as_deref()) {
        game_args = legacy.split_whitespace().map(str::to_string).collect();
    }

    info!(
        "Resolved {} with main class {} and {} classpath entries",
        id,
        main_class,
        classpath.len()
    );
    Ok(LaunchProfile {
        id,
        main_class,
        asset_index,
        classpath,
        jvm_args,
        game_args,
    })
}

use crate::error::CoordinateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// URL name reserved for the core module.
pub const CORE_URL_NAME: &str = "jenkins-core";

const CORE_GROUP: &str = "org.jenkins-ci.main";
const CORE_URL: &str = "http://github.com/jenkinsci/jenkins/";

/// Display name used for the core module unless configured otherwise.
pub const DEFAULT_CORE_DISPLAY_NAME: &str = "Jenkins Core";

/// Index of a module within one run. Classification records refer to their
/// module through this instead of holding a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub usize);

/// A `group:artifact:version` coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(artifact), Some(version))
                if !group.is_empty() && !artifact.is_empty() && !version.is_empty() =>
            {
                Ok(Self {
                    group: group.to_string(),
                    artifact: artifact.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(CoordinateError(s.to_string())),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ModuleKind {
    Core,
    Plugin {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scm: Option<String>,
    },
}

/// What provisioning hands over before a module is scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub gav: String,
    pub title: String,
    pub url: String,
    pub kind: ModuleKind,
}

impl ModuleDescriptor {
    pub fn core(version: &str) -> Self {
        Self {
            gav: format!("{}:{}:{}", CORE_GROUP, CORE_URL_NAME, version),
            title: DEFAULT_CORE_DISPLAY_NAME.to_string(),
            url: CORE_URL.to_string(),
            kind: ModuleKind::Core,
        }
    }

    pub fn plugin(
        gav: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        scm: Option<String>,
    ) -> Self {
        Self {
            gav: gav.into(),
            title: title.into(),
            url: url.into(),
            kind: ModuleKind::Plugin { scm },
        }
    }

    pub fn is_core(&self) -> bool {
        self.kind == ModuleKind::Core
    }

    /// Artifact id parsed from the coordinate, if it is well formed.
    pub fn artifact_id(&self) -> Option<String> {
        self.gav.parse::<Coordinate>().ok().map(|c| c.artifact)
    }
}

/// A unit of analysis: the core product or one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    pub coordinate: Coordinate,
    pub url: String,
    pub display_name: String,
    pub kind: ModuleKind,
}

impl Module {
    pub fn new(
        id: ModuleId,
        descriptor: &ModuleDescriptor,
        core_display_name: &str,
    ) -> Result<Self, CoordinateError> {
        let coordinate = descriptor.gav.parse()?;
        Ok(Self {
            id,
            coordinate,
            url: descriptor.url.clone(),
            display_name: normalize_display_name(&descriptor.title, core_display_name),
            kind: descriptor.kind.clone(),
        })
    }

    pub fn gav(&self) -> String {
        self.coordinate.to_string()
    }

    pub fn is_core(&self) -> bool {
        self.kind == ModuleKind::Core
    }

    pub fn url_name(&self) -> &str {
        if self.is_core() {
            CORE_URL_NAME
        } else {
            &self.coordinate.artifact
        }
    }

    pub fn sort_key(&self) -> ModuleSortKey {
        ModuleSortKey {
            rank: if self.is_core() { 0 } else { 1 },
            folded_name: self.display_name.to_lowercase(),
            gav: self.gav(),
        }
    }
}

/// Ordering key for modules: core first, then display name ignoring case.
/// The coordinate only breaks ties between equally named modules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleSortKey {
    rank: u8,
    folded_name: String,
    gav: String,
}

/// Strips vendor prefixes and plugin suffixes and standardizes on a trailing
/// " Plugin". The core display name is left untouched.
pub fn normalize_display_name(name: &str, core_display_name: &str) -> String {
    if name == core_display_name {
        return name.to_string();
    }

    let mut name = name;
    name = strip_prefix_ignore_case(name, "Jenkins ");
    name = strip_prefix_ignore_case(name, "Hudson ");
    name = strip_suffix_ignore_case(name, " for Jenkins");
    name = strip_suffix_ignore_case(name, " Plugin");
    name = strip_suffix_ignore_case(name, " Plug-In");
    format!("{} Plugin", name)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> &'a str {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &s[prefix.len()..],
        _ => s,
    }
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> &'a str {
    let Some(start) = s.len().checked_sub(suffix.len()) else {
        return s;
    };
    match s.get(start..) {
        Some(tail) if tail.eq_ignore_ascii_case(suffix) => &s[..start],
        _ => s,
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{Error, Result};

/// Prefix marking a metafile reference in a descriptor
pub const METAFILE_PREFIX: char = '>';

/// Description stamped into rewritten descriptors
pub const PRODUCER_DESCRIPTION: &str = concat!(
    "Created by particle-bridge v",
    env!("CARGO_PKG_VERSION")
);

/// Kind of binary payload a result entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetafileKind {
    /// Primary `particles.cs` array
    Particles,
    /// Row-aligned `passthrough_particles.cs` side table
    Passthrough,
}

impl MetafileKind {
    /// Classify a metafile name; `None` when it is neither kind
    pub fn classify(metafile: &str) -> Option<Self> {
        let name = metafile.trim_start_matches(METAFILE_PREFIX);
        if name.contains("passthrough_particles.cs") {
            Some(MetafileKind::Passthrough)
        } else if name.contains("particles.cs") || name.contains("particles_expanded.cs") {
            Some(MetafileKind::Particles)
        } else {
            None
        }
    }

    /// File name suffix used when writing `<rootname>_<suffix>`
    pub fn file_suffix(&self) -> &'static str {
        match self {
            MetafileKind::Particles => "particles.cs",
            MetafileKind::Passthrough => "passthrough_particles.cs",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MetafileKind::Particles => "particle",
            MetafileKind::Passthrough => "passthrough",
        }
    }
}

/// One entry under `results:` in a `.csg` file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Metafile reference, `>` followed by a file name
    pub metafile: String,

    /// Number of records in the referenced file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_items: Option<u64>,

    /// Remaining keys (`type`, ...), preserved as read
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResultEntry {
    /// File name without the `>` prefix
    pub fn metafile_name(&self) -> &str {
        self.metafile.trim_start_matches(METAFILE_PREFIX)
    }
}

/// The `group:` section of a `.csg` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Remaining keys (`name`, `title`, `type`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// cryoSPARC `.csg` group descriptor
///
/// Maps result keys (`blob`, `alignments3D`, `ctf`, ...) to the binary files
/// holding them. Unknown keys are kept so that rewriting a descriptor only
/// touches the timestamp, description, metafile references and counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<Value>,

    /// Group metadata
    #[serde(default)]
    pub group: GroupInfo,

    /// Result entries keyed by result name
    #[serde(default)]
    pub results: BTreeMap<String, ResultEntry>,

    /// Remaining top-level keys (`version`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Metafiles referenced by a descriptor, resolved against its directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metafiles {
    /// Primary array
    pub particles: PathBuf,
    /// Passthrough array, if any
    pub passthrough: Option<PathBuf>,
}

impl GroupDescriptor {
    /// Load a `.csg` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parse descriptor YAML
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Distinct metafile of each kind
    ///
    /// Every entry must be classifiable, and each kind may name only one file.
    pub fn metafile_names(&self) -> Result<(Option<String>, Option<String>)> {
        let mut particles: Option<String> = None;
        let mut passthrough: Option<String> = None;

        for (key, entry) in &self.results {
            let name = entry.metafile_name();
            let kind = MetafileKind::classify(name).ok_or_else(|| Error::UnknownMetafileKind {
                key: key.clone(),
                metafile: entry.metafile.clone(),
            })?;
            let slot = match kind {
                MetafileKind::Particles => &mut particles,
                MetafileKind::Passthrough => &mut passthrough,
            };
            match slot {
                Some(existing) if existing != name => {
                    return Err(Error::AmbiguousMetafile {
                        kind: kind.label(),
                        first: existing.clone(),
                        second: name.to_string(),
                    })
                }
                Some(_) => {}
                None => *slot = Some(name.to_string()),
            }
        }

        Ok((particles, passthrough))
    }

    /// Resolve the metafiles of a descriptor stored at `csg_path`
    pub fn metafiles(&self, csg_path: &Path) -> Result<Metafiles> {
        let dir = csg_path.parent().unwrap_or_else(|| Path::new(""));
        let (particles, passthrough) = self.metafile_names()?;
        let particles = particles.ok_or_else(|| Error::MissingMetafile {
            path: csg_path.to_path_buf(),
        })?;
        debug!(
            "{} references {} and {:?}",
            csg_path.display(),
            particles,
            passthrough
        );
        Ok(Metafiles {
            particles: dir.join(particles),
            passthrough: passthrough.map(|p| dir.join(p)),
        })
    }

    /// Descriptor pointing at newly written payloads
    ///
    /// Each entry is repointed by kind, every `num_items` is set to
    /// `num_items`, and the timestamp and description are refreshed.
    pub fn rewritten(
        &self,
        particles_name: &str,
        passthrough_name: Option<&str>,
        num_items: usize,
        created: DateTime<Local>,
    ) -> Result<Self> {
        let mut out = self.clone();
        out.created = Some(Value::String(
            created.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        ));
        out.group.description = Some(PRODUCER_DESCRIPTION.to_string());

        for (key, entry) in out.results.iter_mut() {
            let target = match MetafileKind::classify(entry.metafile_name()) {
                Some(MetafileKind::Passthrough) => {
                    passthrough_name.ok_or_else(|| Error::MissingPassthrough { key: key.clone() })?
                }
                Some(MetafileKind::Particles) => particles_name,
                None => {
                    return Err(Error::UnknownMetafileKind {
                        key: key.clone(),
                        metafile: entry.metafile.clone(),
                    })
                }
            };
            entry.metafile = format!("{}{}", METAFILE_PREFIX, target);
            if entry.num_items.is_some() {
                entry.num_items = Some(num_items as u64);
            }
        }

        Ok(out)
    }
}

//! Corpus enumeration: `root/<domain>/<instance>.<ext>` plus a resolved domain
//! definition file per instance.

use planlab_core::config::CorpusConfig;
use planlab_core::{CorpusError, Instance, InstanceKey};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    rules: CorpusConfig,
    domains: Vec<(String, PathBuf)>,
}

impl Corpus {
    /// Lists the domain directories of `root`. Fails when the root cannot be
    /// read or has no domain directory at all.
    pub fn open(root: &Path, rules: &CorpusConfig) -> Result<Self, CorpusError> {
        let mut domains = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| CorpusError::Unreadable {
                path: e.path().unwrap_or(root).to_path_buf(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            })?;
            // `Path::is_dir` follows symlinks; the entry's own file type does not.
            if entry.path().is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                domains.push((name, entry.into_path()));
            }
        }
        if domains.is_empty() {
            return Err(CorpusError::EmptyCorpus {
                root: root.to_path_buf(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
            rules: rules.clone(),
            domains,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(|(name, _)| name.as_str())
    }

    /// Lazily yields the instances domain by domain. Within a domain they come
    /// sorted by numeric id (then file name); structurally broken instances
    /// are yielded as errors so the caller can skip and count them. Calling
    /// this again restarts the enumeration.
    pub fn instances(&self) -> impl Iterator<Item = Result<Instance, CorpusError>> + '_ {
        self.domains
            .iter()
            .flat_map(move |(name, dir)| self.domain_instances(name, dir))
    }

    fn domain_instances(&self, domain: &str, dir: &Path) -> Vec<Result<Instance, CorpusError>> {
        let mut found: Vec<Result<Instance, CorpusError>> = Vec::new();
        let walker = WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    found.push(Err(CorpusError::Unreadable {
                        path: e.path().unwrap_or(dir).to_path_buf(),
                        source: e
                            .into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
                    }));
                    continue;
                }
            };
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_instance_file(&file_name) {
                continue;
            }
            found.push(self.build_instance(domain, dir, &file_name));
        }
        found.sort_by(|a, b| match (a, b) {
            (Ok(a), Ok(b)) => a
                .key
                .id
                .cmp(&b.key.id)
                .then_with(|| a.file_name.cmp(&b.file_name)),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => std::cmp::Ordering::Equal,
        });
        found
    }

    fn is_instance_file(&self, file_name: &str) -> bool {
        let suffix = format!(".{}", self.rules.problem_extension);
        file_name.ends_with(&suffix) && !file_name.contains("domain")
    }

    fn build_instance(
        &self,
        domain: &str,
        dir: &Path,
        file_name: &str,
    ) -> Result<Instance, CorpusError> {
        let id = instance_id(file_name)?;
        let instance_file = dir.join(file_name);
        let domain_file = resolve_domain_file(dir, file_name, &self.rules)?;
        Ok(Instance {
            key: InstanceKey {
                domain: domain.to_string(),
                id,
            },
            file_name: file_name.to_string(),
            instance_file,
            domain_file,
        })
    }
}

/// All digits of the file name, concatenated and parsed.
pub fn instance_id(file_name: &str) -> Result<u64, CorpusError> {
    let digits: String = file_name.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<u64>()
        .map_err(|_| CorpusError::MalformedInstanceId {
            file_name: file_name.to_string(),
        })
}

/// Canonical `domain.<ext>` first, then `<instance-stem><suffix>.<ext>`.
pub fn resolve_domain_file(
    dir: &Path,
    instance_file_name: &str,
    rules: &CorpusConfig,
) -> Result<PathBuf, CorpusError> {
    let canonical = dir.join(&rules.canonical_domain_file);
    if canonical.is_file() {
        return Ok(canonical);
    }
    let ext = format!(".{}", rules.problem_extension);
    let stem = instance_file_name
        .strip_suffix(&ext)
        .unwrap_or(instance_file_name);
    let derived = dir.join(format!("{}{}{}", stem, rules.domain_suffix, ext));
    if derived.is_file() {
        return Ok(derived);
    }
    Err(CorpusError::MissingDomainFile {
        instance: dir.join(instance_file_name),
        tried: vec![canonical, derived],
    })
}

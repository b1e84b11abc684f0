//! Bucket-wide collections manifest
//!
//! The administrator describes the full set of scopes and collections of a
//! bucket as JSON. Every vbucket diffs itself against the parsed value.
//!
//! ```json
//! {"uid": "2",
//!  "scopes": [{"name": "_default", "uid": "0",
//!              "collections": [{"name": "_default", "uid": "0"},
//!                              {"name": "beer", "uid": "8"}]}]}
//! ```
//!
//! All uids are hex strings.

use emberkv_common::{CollectionId, Error, ManifestUid, Result, ScopeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Name of the default scope and default collection
pub const DEFAULT_NAME: &str = "_default";

/// Longest accepted scope or collection name
pub const MAX_NAME_LEN: usize = 30;

#[derive(Debug, Serialize, Deserialize)]
struct ManifestJson {
    uid: String,
    scopes: Vec<ScopeJson>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScopeJson {
    name: String,
    uid: String,
    #[serde(default)]
    collections: Vec<CollectionJson>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionJson {
    name: String,
    uid: String,
}

/// One collection of a bucket manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionInfo {
    pub id: CollectionId,
    pub name: String,
}

/// One scope of a bucket manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    /// Member collections in manifest order
    pub collections: Vec<CollectionInfo>,
}

/// A parsed and validated bucket manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketManifest {
    uid: ManifestUid,
    scopes: BTreeMap<ScopeId, Scope>,
    /// Collection id to owning scope
    collections: HashMap<CollectionId, ScopeId>,
}

impl BucketManifest {
    /// Parse and validate a JSON manifest.
    ///
    /// `max_collections` bounds the total number of collections across all
    /// scopes.
    pub fn from_json(json: &str, max_collections: usize) -> Result<Self> {
        let raw: ManifestJson = serde_json::from_str(json)
            .map_err(|e| Error::invalid_manifest(format!("malformed JSON: {e}")))?;

        let uid = parse_uid(&raw.uid, "manifest")?;
        let mut scopes = BTreeMap::new();
        let mut collections = HashMap::new();

        for scope in raw.scopes {
            let sid = ScopeId::new(parse_id(&scope.uid, "scope")?);
            validate_name(&scope.name, sid.is_default())?;
            if scopes.contains_key(&sid) {
                return Err(Error::invalid_manifest(format!("duplicate scope uid {sid}")));
            }

            let mut members = Vec::with_capacity(scope.collections.len());
            for collection in scope.collections {
                let cid = CollectionId::new(parse_id(&collection.uid, "collection")?);
                validate_name(&collection.name, cid.is_default())?;
                if cid.is_system() {
                    return Err(Error::invalid_manifest(format!(
                        "collection uid {cid} is reserved"
                    )));
                }
                if cid.is_default() && !sid.is_default() {
                    return Err(Error::invalid_manifest(format!(
                        "default collection must belong to the default scope, found in scope {sid}"
                    )));
                }
                if collections.insert(cid, sid).is_some() {
                    return Err(Error::invalid_manifest(format!(
                        "duplicate collection uid {cid}"
                    )));
                }
                members.push(CollectionInfo {
                    id: cid,
                    name: collection.name,
                });
            }

            scopes.insert(
                sid,
                Scope {
                    name: scope.name,
                    collections: members,
                },
            );
        }

        if !scopes.contains_key(&ScopeId::DEFAULT) {
            return Err(Error::invalid_manifest("manifest has no default scope"));
        }
        if collections.len() > max_collections {
            return Err(Error::invalid_manifest(format!(
                "{} collections exceeds the limit of {max_collections}",
                collections.len()
            )));
        }

        Ok(Self {
            uid,
            scopes,
            collections,
        })
    }

    #[must_use]
    pub const fn uid(&self) -> ManifestUid {
        self.uid
    }

    /// Scopes in id order
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter().map(|(sid, scope)| (*sid, scope))
    }

    /// Every (scope, collection) pair of the manifest
    pub fn collections(&self) -> impl Iterator<Item = (ScopeId, CollectionId)> + '_ {
        self.scopes().flat_map(|(sid, scope)| {
            scope.collections.iter().map(move |c| (sid, c.id))
        })
    }

    /// Owning scope of a collection, if the manifest contains it
    #[must_use]
    pub fn find_collection(&self, cid: CollectionId) -> Option<ScopeId> {
        self.collections.get(&cid).copied()
    }

    #[must_use]
    pub fn contains_collection(&self, cid: CollectionId) -> bool {
        self.collections.contains_key(&cid)
    }

    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Serialize back to JSON with scopes in id order
    #[must_use]
    pub fn to_json(&self) -> String {
        let raw = ManifestJson {
            uid: format!("{:x}", self.uid),
            scopes: self
                .scopes
                .iter()
                .map(|(sid, scope)| ScopeJson {
                    name: scope.name.clone(),
                    uid: sid.to_string(),
                    collections: scope
                        .collections
                        .iter()
                        .map(|c| CollectionJson {
                            name: c.name.clone(),
                            uid: c.id.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        };
        // Plain strings and vectors always serialize
        serde_json::to_string(&raw).unwrap_or_default()
    }
}

impl fmt::Display for BucketManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Collections::Manifest uid:{:x}, scopes:{}, collections:{}",
            self.uid,
            self.scopes.len(),
            self.collections.len()
        )?;
        for (sid, scope) in &self.scopes {
            write!(f, "  scope:{sid} name:{}", scope.name)?;
            for c in &scope.collections {
                write!(f, " [{}:{}]", c.id, c.name)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn parse_uid(value: &str, what: &str) -> Result<u64> {
    if value.is_empty() || value.len() > 16 {
        return Err(Error::invalid_manifest(format!(
            "{what} uid {value:?} is not a hex value of 1-16 digits"
        )));
    }
    u64::from_str_radix(value, 16)
        .map_err(|_| Error::invalid_manifest(format!("{what} uid {value:?} is not hex")))
}

fn parse_id(value: &str, what: &str) -> Result<u32> {
    let uid = parse_uid(value, what)?;
    u32::try_from(uid)
        .map_err(|_| Error::invalid_manifest(format!("{what} uid {value:?} exceeds 32 bits")))
}

fn validate_name(name: &str, is_default: bool) -> Result<()> {
    if is_default {
        if name != DEFAULT_NAME {
            return Err(Error::invalid_manifest(format!(
                "uid 0 must be named {DEFAULT_NAME}, found {name:?}"
            )));
        }
        return Ok(());
    }
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_manifest(format!(
            "name {name:?} must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    if name.starts_with('_') {
        return Err(Error::invalid_manifest(format!(
            "name {name:?} cannot start with '_'"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '%'))
    {
        return Err(Error::invalid_manifest(format!(
            "name {name:?} contains invalid character {c:?}"
        )));
    }
    Ok(())
}

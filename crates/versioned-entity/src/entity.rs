use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::definition::{Shape, VersionDef};
use crate::detect;
use crate::schema::SchemaError;

/// Version-detection function: classifies raw input, or `None` if it cannot.
pub type DetectFn = Box<dyn Fn(&Value) -> Option<u32> + Send + Sync>;

const DEFAULT_NAME: &str = "entity";

/// Tag of a [`ParseError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The detection function could not classify the input.
    VerCheckFail,
    /// The detected version is unknown, or above the requested bound.
    InvalidVer,
    /// The detected version is known but its schema rejected the input.
    GivenVerValidationFail,
    /// The upgrade chain needs a version that is not defined.
    BugNoIntermediateFound,
    /// The upgrade chain reached a version flagged as initial.
    BugIntermediateMarkedInitial,
}

impl ErrorKind {
    /// The tag as a string, e.g. `"VER_CHECK_FAIL"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerCheckFail => "VER_CHECK_FAIL",
            Self::InvalidVer => "INVALID_VER",
            Self::GivenVerValidationFail => "GIVEN_VER_VALIDATION_FAIL",
            Self::BugNoIntermediateFound => "BUG_NO_INTERMEDIATE_FOUND",
            Self::BugIntermediateMarkedInitial => "BUG_INTERMEDIATE_MARKED_INITIAL",
        }
    }

    /// Whether this kind points at a malformed version map rather than bad input.
    pub fn is_definition_bug(&self) -> bool {
        matches!(
            self,
            Self::BugNoIntermediateFound | Self::BugIntermediateMarkedInitial
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why validating or migrating a value failed.
///
/// The first three variants describe the input. The two `Bug*` variants
/// describe the entity definition itself and should be treated as programmer
/// errors.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The detection function returned `None`.
    #[error("could not determine the version of the input")]
    VerCheckFail,
    /// The detected version is not in the map, or exceeds the requested bound.
    #[error("version v{ver} is not accepted here")]
    InvalidVer {
        /// The detected version.
        ver: u32,
    },
    /// The detected version's schema rejected the input.
    #[error("input failed validation as v{ver}: {error}")]
    GivenVerValidationFail {
        /// The detected version.
        ver: u32,
        /// The definition the input was validated against.
        definition: Arc<VersionDef>,
        /// What the validator reported.
        error: SchemaError,
    },
    /// A version between the detected one and the target is missing.
    #[error("no definition for intermediate version v{missing_ver}")]
    BugNoIntermediateFound {
        /// The first missing version, counting up.
        missing_ver: u32,
    },
    /// A version between the detected one and the target has no upgrade.
    #[error("intermediate version v{ver} is marked initial")]
    BugIntermediateMarkedInitial {
        /// The offending version.
        ver: u32,
    },
}

impl ParseError {
    /// The tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VerCheckFail => ErrorKind::VerCheckFail,
            Self::InvalidVer { .. } => ErrorKind::InvalidVer,
            Self::GivenVerValidationFail { .. } => ErrorKind::GivenVerValidationFail,
            Self::BugNoIntermediateFound { .. } => ErrorKind::BugNoIntermediateFound,
            Self::BugIntermediateMarkedInitial { .. } => ErrorKind::BugIntermediateMarkedInitial,
        }
    }

    /// Whether this error points at a malformed version map rather than bad input.
    pub fn is_definition_bug(&self) -> bool {
        self.kind().is_definition_bug()
    }
}

/// Failure of a typed parse: the pipeline failed, or its output did not fit `T`.
#[derive(Debug, Error)]
pub enum IntoError {
    /// Validation or migration failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The migrated value did not deserialize into the requested type.
    #[error("migrated value does not match the target type: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// A structural defect in a version map, found by [`VersionedEntity::check_chain`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// No versions are defined.
    #[error("no versions defined")]
    Empty,
    /// The declared latest version has no definition.
    #[error("latest version v{latest} has no definition")]
    LatestMissing {
        /// The declared latest version.
        latest: u32,
    },
    /// The lowest version has an upgrade transform.
    #[error("lowest version v{ver} is not marked initial")]
    FirstNotInitial {
        /// The lowest defined version.
        ver: u32,
    },
    /// A version between the lowest and the latest is missing.
    #[error("missing definition for v{missing}")]
    Gap {
        /// The first missing version.
        missing: u32,
    },
    /// A version after the lowest one has no upgrade transform.
    #[error("v{ver} is marked initial but is not the lowest version")]
    IntermediateMarkedInitial {
        /// The offending version.
        ver: u32,
    },
    /// A version above the declared latest is defined.
    #[error("v{ver} is defined beyond the latest version")]
    BeyondLatest {
        /// The offending version.
        ver: u32,
    },
}

/// Configuration for a [`VersionedEntity`].
#[derive(Debug, Clone)]
pub struct EntityConfig {
    /// Name used in log events and entity reference errors.
    pub name: String,
    /// If true, [`EntityBuilder::build`] runs [`VersionedEntity::check_chain`]
    /// and logs any defect. The entity is still built.
    pub check_chain_on_build: bool,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            check_chain_on_build: false,
        }
    }
}

/// A data shape that has evolved through an ordered chain of versions.
///
/// Holds a map from version number to [`VersionDef`], the latest version
/// number, and a detection function that reads the version of raw input.
/// An entity never changes after it is built, so one instance can be shared
/// freely, including across threads and from inside its own upgrade
/// transforms.
///
/// The map is not checked at construction. Gaps and misplaced initial
/// versions surface as `Bug*` errors when a migration walks over them, or
/// eagerly through [`VersionedEntity::check_chain`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use versioned_entity::{detect, shape, VersionDef, VersionedEntity};
///
/// let entity = VersionedEntity::builder()
///     .name("greeting")
///     .detect_with(detect::integer_field("v"))
///     .version(1, VersionDef::initial(
///         shape::object()
///             .field("v", shape::literal(json!(1)))
///             .field("text", shape::string()),
///     ))
///     .version(2, VersionDef::upgrade(
///         shape::object()
///             .field("v", shape::literal(json!(2)))
///             .field("text", shape::string())
///             .field("lang", shape::string()),
///         |mut old| {
///             old["v"] = json!(2);
///             old["lang"] = json!("en");
///             old
///         },
///     ))
///     .build();
///
/// let latest = entity.safe_parse(&json!({ "v": 1, "text": "hi" })).unwrap();
/// assert_eq!(latest, json!({ "v": 2, "text": "hi", "lang": "en" }));
/// assert!(entity.is(&json!({ "v": 1, "text": "hi" })));
/// assert!(!entity.is_latest(&json!({ "v": 1, "text": "hi" })));
/// ```
pub struct VersionedEntity {
    versions: BTreeMap<u32, Arc<VersionDef>>,
    latest: u32,
    detect: DetectFn,
    config: EntityConfig,
}

impl VersionedEntity {
    /// Create an entity from its parts with default configuration.
    pub fn new(
        latest: u32,
        versions: impl IntoIterator<Item = (u32, VersionDef)>,
        detect: impl Fn(&Value) -> Option<u32> + Send + Sync + 'static,
    ) -> Self {
        Self {
            versions: versions
                .into_iter()
                .map(|(ver, def)| (ver, Arc::new(def)))
                .collect(),
            latest,
            detect: Box::new(detect),
            config: EntityConfig::default(),
        }
    }

    /// Start building an entity.
    pub fn builder() -> EntityBuilder {
        EntityBuilder::new()
    }

    /// The entity's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The declared latest version.
    pub fn latest_version(&self) -> u32 {
        self.latest
    }

    /// The definition for `ver`, if any.
    pub fn definition(&self, ver: u32) -> Option<&VersionDef> {
        self.versions.get(&ver).map(Arc::as_ref)
    }

    /// All defined version numbers, ascending.
    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.versions.keys().copied()
    }

    /// Run the detection function on `data`.
    pub fn version_of(&self, data: &Value) -> Option<u32> {
        (self.detect)(data)
    }

    /// Whether `data` is a valid instance of any defined version.
    pub fn is(&self, data: &Value) -> bool {
        self.version_of(data)
            .and_then(|ver| self.versions.get(&ver))
            .map_or(false, |def| def.schema().accepts(data))
    }

    /// Whether `data` is a valid instance of the latest version.
    ///
    /// Skips version detection and validates against the latest schema
    /// directly. False if the latest version has no definition.
    pub fn is_latest(&self, data: &Value) -> bool {
        self.versions
            .get(&self.latest)
            .map_or(false, |def| def.schema().accepts(data))
    }

    /// Whether `data` is a valid instance of a defined version no newer than `bound`.
    pub fn is_up_to_version(&self, data: &Value, bound: u32) -> bool {
        match self.version_of(data) {
            Some(ver) if ver <= bound => self
                .versions
                .get(&ver)
                .map_or(false, |def| def.schema().accepts(data)),
            _ => false,
        }
    }

    /// Validate `data` at its detected version and upgrade it to the latest version.
    pub fn safe_parse(&self, data: &Value) -> Result<Value, ParseError> {
        let (ver, value) = self.resolve(data, None)?;
        self.migrate(value, ver, self.latest)
    }

    /// Validate `data` and upgrade it no further than `bound`.
    ///
    /// Input newer than `bound` is rejected with [`ParseError::InvalidVer`].
    /// An upgrade transform written against version `bound` can call this on
    /// nested children of the same entity and is guaranteed never to see a
    /// shape introduced after it.
    pub fn safe_parse_up_to_version(&self, data: &Value, bound: u32) -> Result<Value, ParseError> {
        let (ver, value) = self.resolve(data, Some(bound))?;
        self.migrate(value, ver, bound)
    }

    /// [`safe_parse`](Self::safe_parse), then deserialize the result into `T`.
    pub fn safe_parse_into<T: DeserializeOwned>(&self, data: &Value) -> Result<T, IntoError> {
        let value = self.safe_parse(data)?;
        Ok(serde_json::from_value(value)?)
    }

    /// [`safe_parse_up_to_version`](Self::safe_parse_up_to_version), then
    /// deserialize the result into `T`.
    pub fn safe_parse_up_to_version_into<T: DeserializeOwned>(
        &self,
        data: &Value,
        bound: u32,
    ) -> Result<T, IntoError> {
        let value = self.safe_parse_up_to_version(data, bound)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Check the whole version map for structural defects.
    ///
    /// Expects the versions to run contiguously from an initial lowest
    /// version up to the latest, with every other version carrying an
    /// upgrade. Returns the first defect found. Parsing does not depend on
    /// this; the same defects are reported lazily during migration.
    pub fn check_chain(&self) -> Result<(), ChainError> {
        let (&first, first_def) = self.versions.iter().next().ok_or(ChainError::Empty)?;

        if !first_def.is_initial() {
            return Err(ChainError::FirstNotInitial { ver: first });
        }
        if !self.versions.contains_key(&self.latest) {
            return Err(ChainError::LatestMissing {
                latest: self.latest,
            });
        }

        for ver in (first..self.latest).map(|v| v + 1) {
            match self.versions.get(&ver) {
                None => return Err(ChainError::Gap { missing: ver }),
                Some(def) if def.is_initial() => {
                    return Err(ChainError::IntermediateMarkedInitial { ver })
                }
                Some(_) => {}
            }
        }

        match self.versions.range(self.latest.saturating_add(1)..).next() {
            Some((&ver, _)) if ver > self.latest => Err(ChainError::BeyondLatest { ver }),
            _ => Ok(()),
        }
    }

    /// Detect and validate `data`, optionally rejecting versions above `bound`.
    fn resolve(&self, data: &Value, bound: Option<u32>) -> Result<(u32, Value), ParseError> {
        let ver = match self.version_of(data) {
            Some(ver) => ver,
            None => {
                debug!(entity = %self.config.name, "version detection failed");
                return Err(ParseError::VerCheckFail);
            }
        };

        if bound.map_or(false, |bound| ver > bound) {
            debug!(entity = %self.config.name, ver, ?bound, "version above requested bound");
            return Err(ParseError::InvalidVer { ver });
        }

        let definition = match self.versions.get(&ver) {
            Some(def) => def,
            None => {
                debug!(entity = %self.config.name, ver, "unknown version");
                return Err(ParseError::InvalidVer { ver });
            }
        };

        match definition.schema().validate(data) {
            Ok(value) => Ok((ver, value)),
            Err(error) => {
                debug!(entity = %self.config.name, ver, %error, "validation failed");
                Err(ParseError::GivenVerValidationFail {
                    ver,
                    definition: Arc::clone(definition),
                    error,
                })
            }
        }
    }

    /// Apply every upgrade from `from + 1` through `to`, in order.
    fn migrate(&self, mut value: Value, from: u32, to: u32) -> Result<Value, ParseError> {
        for ver in (from..to).map(|v| v + 1) {
            let definition = match self.versions.get(&ver) {
                Some(def) => def,
                None => {
                    error!(entity = %self.config.name, missing_ver = ver, "version map has a gap");
                    return Err(ParseError::BugNoIntermediateFound { missing_ver: ver });
                }
            };
            let upgrade = match definition.upgrade_fn() {
                Some(up) => up,
                None => {
                    error!(entity = %self.config.name, ver, "intermediate version marked initial");
                    return Err(ParseError::BugIntermediateMarkedInitial { ver });
                }
            };

            trace!(entity = %self.config.name, from = ver - 1, to = ver, "upgrading");
            value = upgrade(value);
        }
        Ok(value)
    }
}

impl fmt::Debug for VersionedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedEntity")
            .field("name", &self.config.name)
            .field("latest", &self.latest)
            .field("versions", &self.versions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`VersionedEntity`].
pub struct EntityBuilder {
    versions: BTreeMap<u32, VersionDef>,
    latest: Option<u32>,
    detect: Option<DetectFn>,
    config: EntityConfig,
}

impl EntityBuilder {
    /// An empty builder with default configuration.
    pub fn new() -> Self {
        Self {
            versions: BTreeMap::new(),
            latest: None,
            detect: None,
            config: EntityConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EntityConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the entity's name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Declare the latest version. Defaults to the highest registered version.
    pub fn latest(mut self, ver: u32) -> Self {
        self.latest = Some(ver);
        self
    }

    /// Set the detection function. Defaults to [`detect::integer_field`]`("v")`.
    pub fn detect_with(
        mut self,
        detect: impl Fn(&Value) -> Option<u32> + Send + Sync + 'static,
    ) -> Self {
        self.detect = Some(Box::new(detect));
        self
    }

    /// Register the definition for `ver`, replacing any earlier one.
    pub fn version(mut self, ver: u32, def: VersionDef) -> Self {
        self.versions.insert(ver, def);
        self
    }

    /// Register a `(version, definition)` pair, as generated by `#[upgrade]`.
    pub fn entry(self, (ver, def): (u32, VersionDef)) -> Self {
        self.version(ver, def)
    }

    /// Register the serde type `T` as an initial version at `T::VERSION`.
    pub fn shape<T: Shape>(self) -> Self {
        self.version(T::VERSION, VersionDef::typed_initial::<T>())
    }

    /// Build the entity. Never fails; see [`EntityConfig::check_chain_on_build`].
    pub fn build(self) -> VersionedEntity {
        let entity = self.assemble();
        if entity.config.check_chain_on_build {
            if let Err(defect) = entity.check_chain() {
                error!(entity = %entity.config.name, %defect, "malformed version map");
            }
        }
        entity
    }

    /// Build the entity, failing if [`VersionedEntity::check_chain`] finds a defect.
    pub fn try_build(self) -> Result<VersionedEntity, ChainError> {
        let entity = self.assemble();
        entity.check_chain()?;
        Ok(entity)
    }

    fn assemble(self) -> VersionedEntity {
        let latest = self
            .latest
            .or_else(|| self.versions.keys().next_back().copied())
            .unwrap_or(0);
        VersionedEntity {
            versions: self
                .versions
                .into_iter()
                .map(|(ver, def)| (ver, Arc::new(def)))
                .collect(),
            latest,
            detect: self
                .detect
                .unwrap_or_else(|| Box::new(detect::integer_field("v"))),
            config: self.config,
        }
    }
}

impl Default for EntityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

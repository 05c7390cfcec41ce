//! Filter catalog: which asset each filter draws and how it is offset.
//!
//! The default catalog is embedded at compile time from
//! `contrib/filters.toml`; a replacement can be loaded from disk.

use crate::compositor::Anchor;
use crate::filters::FilterKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_CATALOG: &str = include_str!("../../../contrib/filters.toml");

static EMBEDDED: OnceLock<FilterCatalog> = OnceLock::new();

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad catalog TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("filter {0} is listed more than once")]
    Duplicate(FilterKind),
    #[error("filter {kind} has invalid width_scale {scale}")]
    InvalidScale { kind: FilterKind, scale: f64 },
}

/// One `[[filter]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    /// Sprite file name, relative to the asset directory.
    pub asset: PathBuf,
    #[serde(default)]
    pub anchor: Anchor,
    #[serde(default)]
    pub offset_x: i32,
    #[serde(default)]
    pub offset_y: i32,
    /// Multiplier applied to the reference width.
    #[serde(default = "default_width_scale")]
    pub width_scale: f64,
}

fn default_width_scale() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    filter: Vec<FilterSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterCatalog {
    specs: Vec<FilterSpec>,
}

impl FilterCatalog {
    /// The catalog compiled into the binary.
    pub fn embedded() -> &'static FilterCatalog {
        EMBEDDED.get_or_init(|| match Self::from_toml(DEFAULT_CATALOG) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!(error = %e, "embedded filter catalog is invalid");
                FilterCatalog::default()
            }
        })
    }

    pub fn from_toml(src: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(src)?;

        let mut specs: Vec<FilterSpec> = Vec::with_capacity(file.filter.len());
        for spec in file.filter {
            if specs.iter().any(|s| s.kind == spec.kind) {
                return Err(CatalogError::Duplicate(spec.kind));
            }
            if !spec.width_scale.is_finite() || spec.width_scale <= 0.0 {
                return Err(CatalogError::InvalidScale {
                    kind: spec.kind,
                    scale: spec.width_scale,
                });
            }
            specs.push(spec);
        }

        Ok(Self { specs })
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml(&src)?;
        tracing::info!(path = %path.display(), filters = catalog.specs.len(), "loaded filter catalog");
        Ok(catalog)
    }

    pub fn get(&self, kind: FilterKind) -> Option<&FilterSpec> {
        self.specs.iter().find(|s| s.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterSpec> {
        self.specs.iter()
    }
}

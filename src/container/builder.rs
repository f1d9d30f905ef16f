//! Container builder for flexible configuration

use super::{ContainerInner, GeoPackage, MEMORY_PATH};
use crate::error::Result;
use std::path::PathBuf;

/// Builder for creating containers with custom configuration.
///
/// # Examples
///
/// ## In-memory container without the native range-index module
/// ```rust
/// use gpkg_index::GeoPackageBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let gpkg = GeoPackageBuilder::new()
///     .in_memory()
///     .rtree_module(false)
///     .build()?;
/// assert!(!gpkg.has_rtree_module()?);
/// # Ok(())
/// # }
/// ```
///
/// ## File-backed container
/// ```rust
/// use gpkg_index::GeoPackageBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let temp_path = std::env::temp_dir().join("builder_doc.gpkg");
/// let gpkg = GeoPackageBuilder::new().path(&temp_path).build()?;
/// gpkg.close()?;
/// # let _ = std::fs::remove_file(temp_path);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GeoPackageBuilder {
    path: Option<PathBuf>,
    rtree_module: bool,
}

impl GeoPackageBuilder {
    /// Create a builder for an in-memory container with the range-index
    /// module enabled.
    pub fn new() -> Self {
        Self {
            path: None,
            rtree_module: true,
        }
    }

    /// Back the container with a file. If the file exists its contents are
    /// loaded; otherwise it is created on the first flush.
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        let path = path.into();
        self.path = if path.as_os_str() == MEMORY_PATH {
            None
        } else {
            Some(path)
        };
        self
    }

    /// Keep the container in memory only.
    pub fn in_memory(mut self) -> Self {
        self.path = None;
        self
    }

    /// Enable or disable the native range-index module.
    pub fn rtree_module(mut self, enabled: bool) -> Self {
        self.rtree_module = enabled;
        self
    }

    /// Build the container.
    pub fn build(self) -> Result<GeoPackage> {
        let inner = match self.path {
            None => ContainerInner::new(None, self.rtree_module),
            Some(path) => Self::open_file(path, self.rtree_module)?,
        };
        Ok(GeoPackage::from_inner(inner))
    }

    #[cfg(feature = "persistence")]
    fn open_file(path: PathBuf, rtree_module: bool) -> Result<ContainerInner> {
        let mut inner = ContainerInner::new(Some(path.clone()), rtree_module);
        if path.exists() {
            super::persistence::load_snapshot(&path, &mut inner)?;
            log::debug!("Loaded container from {}", path.display());
        }
        Ok(inner)
    }

    #[cfg(not(feature = "persistence"))]
    fn open_file(path: PathBuf, _rtree_module: bool) -> Result<ContainerInner> {
        Err(crate::error::IndexError::Config(format!(
            "cannot open {}: built without the persistence feature",
            path.display()
        )))
    }
}

impl Default for GeoPackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

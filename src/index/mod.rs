//! Feature spatial indexing
//!
//! Two backends answer "which rows intersect this envelope" for a feature
//! table: the extension-table backend keeps a shadow table of per-row
//! envelopes, and the range-tree backend delegates to the container's native
//! range index. Both implement [`FeatureIndexBackend`], which also provides
//! the shared rebuild driver. [`FeatureIndexManager`] is the entry point.

mod extension;
mod manager;
mod manual;
mod metadata;
mod progress;
mod range_tree;
mod results;

pub use extension::ExtensionTableIndex;
pub use manager::FeatureIndexManager;
pub use manual::ManualFeatureQuery;
pub use metadata::{IndexMetadata, MetadataStore};
pub use progress::{Progress, ProgressCounter};
pub use range_tree::RangeTreeIndex;
pub use results::FeatureIndexResults;

use crate::container::{FeatureRow, FeatureSource};
use crate::envelope::Envelope;
use crate::error::{IndexError, Result};
use crate::geometry::GeometryDecoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Extension name registered by the extension-table backend
pub const EXTENSION_GEOMETRY_INDEX: &str = "nga_geometry_index";

/// Extension name registered by the range-tree backend
pub const EXTENSION_RTREE_INDEX: &str = "gpkg_rtree_index";

/// Decoded envelope of a row's geometry. Envelopes with inverted or
/// non-finite bounds are treated like malformed geometry.
pub(crate) fn row_envelope(decoder: &dyn GeometryDecoder, row: &FeatureRow) -> Option<Envelope> {
    let envelope = decoder.envelope_of(row.geometry.as_ref()?)?;
    match envelope.validate() {
        Ok(()) => Some(envelope),
        Err(e) => {
            log::warn!("Ignoring geometry of row {}: {}", row.id, e);
            None
        }
    }
}

/// Where a feature table's spatial index lives
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IndexLocation {
    /// No index; queries scan every row
    None,
    /// Shadow table of per-row envelopes
    #[default]
    ExtensionTable,
    /// The container's native range index
    RangeTree,
}

impl IndexLocation {
    /// Locations that can hold index data
    pub const BACKENDS: [IndexLocation; 2] = [IndexLocation::ExtensionTable, IndexLocation::RangeTree];

    /// Extension registered by the backend, `None` for [`IndexLocation::None`]
    pub fn extension_name(&self) -> Option<&'static str> {
        match self {
            IndexLocation::None => None,
            IndexLocation::ExtensionTable => Some(EXTENSION_GEOMETRY_INDEX),
            IndexLocation::RangeTree => Some(EXTENSION_RTREE_INDEX),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexLocation::None => "none",
            IndexLocation::ExtensionTable => "extension_table",
            IndexLocation::RangeTree => "range_tree",
        }
    }
}

impl fmt::Display for IndexLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexLocation {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(IndexLocation::None),
            "extension_table" | "extension" | "geopackage" => Ok(IndexLocation::ExtensionTable),
            "range_tree" | "rtree" => Ok(IndexLocation::RangeTree),
            other => Err(IndexError::Config(format!("unknown index location: {}", other))),
        }
    }
}

/// Outcome of a rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexSummary {
    /// Rows that produced an index entry
    pub indexed: u64,
    /// Rows read from the table
    pub scanned: u64,
    /// Rows that could not be read or stored (only with `continue_on_error`)
    pub failed: u64,
    /// The index was already built and no work was done
    pub skipped: bool,
    /// The progress observer stopped the rebuild before the last row
    pub cancelled: bool,
}

impl IndexSummary {
    fn already_built() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Knobs for a single rebuild
#[derive(Clone, Copy, Default)]
pub struct RebuildOptions<'a> {
    /// Rebuild even when the index is already built
    pub force: bool,
    /// Log and skip rows that cannot be read or stored
    pub continue_on_error: bool,
    pub progress: Option<&'a dyn Progress>,
}

/// Storage contract shared by the index backends.
///
/// Implementations store `(row id, envelope)` pairs for one table column and
/// own a [`MetadataStore`] recording when they were last built. The rebuild
/// driver and the un-indexing logic are provided here once for every
/// backend.
pub trait FeatureIndexBackend: Send + Sync {
    fn location(&self) -> IndexLocation;

    /// Metadata record for this backend and table column
    fn metadata(&self) -> &MetadataStore;

    /// Total number of stored entries
    fn count(&self) -> Result<u64>;

    /// Number of entries whose envelope intersects `envelope`
    fn count_envelope(&self, envelope: &Envelope) -> Result<u64>;

    /// Ids of entries whose envelope intersects `envelope`, ascending
    fn query_envelope(&self, envelope: &Envelope) -> Result<Vec<i64>>;

    /// Ids of every entry, ascending
    fn query_all(&self) -> Result<Vec<i64>>;

    /// Union of all stored envelopes
    fn extent(&self) -> Result<Option<Envelope>>;

    /// Insert or replace the entry for a row. Returns whether an entry now
    /// exists for it.
    fn put(&self, id: i64, envelope: Option<&Envelope>) -> Result<bool>;

    /// Remove a row's entry. Returns `false` when there was none.
    fn remove(&self, id: i64) -> Result<bool>;

    /// Create the backing storage if it does not exist yet.
    fn register(&self) -> Result<()>;

    /// Delete every entry but keep the backing storage registered.
    fn clear_entries(&self) -> Result<()>;

    /// Delete the backing storage and its extension registration.
    fn drop_storage(&self) -> Result<bool>;

    fn is_indexed(&self) -> Result<bool> {
        self.metadata().is_indexed()
    }

    fn last_indexed(&self) -> Result<Option<SystemTime>> {
        self.metadata().last_indexed()
    }

    /// Remove all entries and the metadata record. Returns whether anything
    /// was deleted.
    fn clear(&self) -> Result<bool> {
        let dropped = self.drop_storage()?;
        let had_metadata = self.metadata().delete()?;
        Ok(dropped || had_metadata)
    }

    /// Index every row of `source`.
    ///
    /// A built index is left alone unless `force` is set. Any existing
    /// entries are cleared before rows are scanned. Metadata is refreshed at the end,
    /// also when the progress observer cancelled the run.
    fn rebuild(
        &self,
        source: &dyn FeatureSource,
        decoder: &dyn GeometryDecoder,
        options: RebuildOptions<'_>,
    ) -> Result<IndexSummary> {
        let location = self.location();
        if !options.force && self.is_indexed()? {
            log::debug!(
                "{} index on {}.{} already built",
                location,
                source.table_name(),
                source.geometry_column()
            );
            return Ok(IndexSummary::already_built());
        }
        // Also drops entries left behind without metadata
        self.clear_entries()?;
        self.register()?;

        log::debug!(
            "Rebuilding {} index on {}.{}",
            location,
            source.table_name(),
            source.geometry_column()
        );

        if let Some(progress) = options.progress {
            progress.set_max(source.row_count()?);
        }

        let mut summary = IndexSummary::default();
        for row in source.rows() {
            let row = match row {
                Ok(row) => row,
                Err(e) if options.continue_on_error => {
                    log::error!("Failed to read a {} row: {}", source.table_name(), e);
                    summary.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            summary.scanned += 1;

            let envelope = row_envelope(decoder, &row);
            match self.put(row.id, envelope.as_ref()) {
                Ok(true) => summary.indexed += 1,
                Ok(false) => {}
                Err(e) if options.continue_on_error => {
                    log::error!(
                        "Failed to index {} row {}: {}",
                        source.table_name(),
                        row.id,
                        e
                    );
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }

            if let Some(progress) = options.progress {
                progress.add_progress(1);
                if !progress.is_active() {
                    summary.cancelled = true;
                    break;
                }
            }
        }

        self.metadata().touch()?;

        if summary.cancelled {
            log::warn!(
                "{} index on {} cancelled after {} rows, {} indexed",
                location,
                source.table_name(),
                summary.scanned,
                summary.indexed
            );
        } else {
            log::info!(
                "Indexed {} of {} rows of {} into {}",
                summary.indexed,
                summary.scanned,
                source.table_name(),
                location
            );
        }
        Ok(summary)
    }
}

//! A combined view over several dataset stores.
//!
//! Opening the view only touches group metadata. Variable data is read store
//! by store when the view is materialized, so callers never hold more than
//! one store's arrays plus the growing result.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dataset::{Dataset, StepCoord};
use crate::error::{DatasetError, Result};
use crate::zarr::{read_dataset, read_steps};

#[derive(Debug, Clone)]
pub struct MultiStoreView {
    stores: Vec<PathBuf>,
    steps: Vec<StepCoord>,
}

impl MultiStoreView {
    /// Open a view over `paths`, in the given order.
    ///
    /// Every store must exist and carry a step axis.
    pub fn open<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let stores: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if stores.is_empty() {
            return Err(DatasetError::Empty);
        }

        let mut steps = Vec::new();
        for path in &stores {
            let store_steps = read_steps(path)?;
            if store_steps.is_empty() {
                return Err(DatasetError::InvalidDimensions {
                    name: path.display().to_string(),
                    reason: "store has no step axis".to_string(),
                });
            }
            steps.extend(store_steps);
        }

        debug!(stores = stores.len(), steps = steps.len(), "Opened multi-store view");
        Ok(Self { stores, steps })
    }

    pub fn stores(&self) -> &[PathBuf] {
        &self.stores
    }

    /// Step axis of the combined view.
    pub fn steps(&self) -> &[StepCoord] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Read a single store of the view.
    pub fn read(&self, index: usize) -> Result<Dataset> {
        let path = self
            .stores
            .get(index)
            .ok_or_else(|| {
                DatasetError::storage(Path::new("<view>"), format!("no store {}", index))
            })?;
        read_dataset(path)
    }

    /// Concatenate every store along the step axis, in view order.
    pub fn concat_steps(&self) -> Result<Dataset> {
        let parts = (0..self.stores.len())
            .map(|i| self.read(i))
            .collect::<Result<Vec<_>>>()?;
        Dataset::concat_steps(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::dataset::{Attributes, Variable};
    use crate::zarr::ZarrDatasetWriter;
    use chrono::{Duration, TimeZone, Utc};

    fn write_step(dir: &Path, name: &str, hours: u32, value: f32) -> PathBuf {
        let init = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let mut ds = Dataset::new(vec![0.0, 1.0], vec![10.0, 20.0, 30.0]);
        ds.insert("t", Variable::grid(vec![value; 6], Attributes::new()))
            .unwrap();
        let ds = ds
            .expand_step(StepCoord {
                forecast_hours: hours,
                init_time: init,
                valid_time: init + Duration::hours(hours as i64),
                source: name.to_string(),
            })
            .unwrap();

        let path = dir.join(name);
        ZarrDatasetWriter::new(StoreConfig::default())
            .write(&ds, &path)
            .unwrap();
        path
    }

    #[test]
    fn test_view_preserves_store_order() {
        let dir = tempfile::tempdir().unwrap();
        // Deliberately not chronological
        let late = write_step(dir.path(), "a.zarr", 12, 2.0);
        let early = write_step(dir.path(), "b.zarr", 6, 1.0);

        let view = MultiStoreView::open([&late, &early]).unwrap();
        let hours: Vec<u32> = view.steps().iter().map(|s| s.forecast_hours).collect();
        assert_eq!(hours, vec![12, 6]);

        let combined = view.concat_steps().unwrap();
        let t = combined.variable("t").unwrap();
        assert_eq!(t.data[0], 2.0);
        assert_eq!(t.data[6], 1.0);
    }

    #[test]
    fn test_open_fails_on_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_step(dir.path(), "a.zarr", 0, 0.0);
        let missing = dir.path().join("gone.zarr");

        assert!(matches!(
            MultiStoreView::open([good, missing]),
            Err(DatasetError::StorageError { .. })
        ));
    }

    #[test]
    fn test_open_empty() {
        let none: Vec<PathBuf> = Vec::new();
        assert!(matches!(MultiStoreView::open(none), Err(DatasetError::Empty)));
    }
}

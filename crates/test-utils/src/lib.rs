//! Shared test utilities for the forecast ingestion workspace.
//!
//! - Synthetic GRIB2 message builder
//! - Scratch `Data/` + `Outputs/` workspaces
//! - Grid data generators and fixtures
//! - Approximate-equality macro
//!
//! ```ignore
//! use test_utils::{Grib2Builder, ForecastWorkspace, assert_approx_eq};
//! ```

pub mod fixtures;
pub mod generators;
pub mod grib2;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use grib2::*;
pub use paths::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                concat!(
                    "assertion failed: `(left ≈ right)`\n",
                    "  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`"
                ),
                left, right, diff, epsilon
            );
        }
    }};
}

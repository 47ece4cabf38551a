pub mod detector;
pub mod edges;
pub mod grid;
pub mod hough;


pub use detector::*;
pub use edges::{canny, CannyConfig};
pub use grid::{detect_grid, GridConfig, GridSummary};
pub use hough::{find_segments, HoughConfig, LineSegment};

//! Serving layer: latest-day direction predictions from persisted model
//! artifacts, an mtime-keyed artifact cache, and the read contract backing
//! the dashboard.

pub mod cache;
pub mod dashboard;
pub mod serving;

pub use cache::FileCache;
pub use dashboard::{load_dashboard_data, ArtifactPaths, DashboardCaches, DashboardData};
pub use serving::{predict_latest, recent_direction_counts, Prediction};

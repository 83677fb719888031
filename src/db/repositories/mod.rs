pub mod apps;
pub mod timeline;

pub use timeline::TimelineFilter;

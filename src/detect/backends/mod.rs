pub mod mock;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use mock::MockDetector;

#[cfg(feature = "backend-tract")]
pub use tract::TractSegDetector;

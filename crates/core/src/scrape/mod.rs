pub mod error;
pub mod extract;
pub mod fetch;

pub use error::{ExtractError, FetchError};
pub use extract::PriceExtractor;
pub use fetch::{HttpPageFetcher, PageFetcher};

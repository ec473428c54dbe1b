pub mod browser;
pub mod images;
pub mod kleinanzeigen;
pub mod parse;
pub mod traits;
pub mod types;
pub mod validate;

pub use browser::HeadlessChromePageSource;
pub use images::HttpImageFetcher;
pub use kleinanzeigen::KleinanzeigenExtractor;
pub use traits::{ImageFetcher, PageSource};
pub use types::ScrapeTarget;

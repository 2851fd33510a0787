//! Tools module
//!
//! Browser backends behind the [`PageDriver`] capability.

pub mod browser;
pub mod cdp;
pub mod webdriver;

// Re-export commonly used browser types
pub use browser::{launch, PageDriver};
pub use cdp::CdpPage;
pub use webdriver::WebDriverPage;

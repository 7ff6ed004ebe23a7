//! Vendor portal upload through a WebDriver-controlled browser.

pub mod types;
pub mod selectors;
pub mod session;
pub mod automator;

pub use types::*;
pub use session::{run_upload, PortalClient, PortalSession};
pub use automator::{ChromePortal, ChromeSession};

pub mod chrome;
pub mod controller;
pub mod driver;

pub use chrome::ChromeDriver;
pub use controller::{BrowserController, BrowserSession};
pub use driver::{BrowserDriver, BrowserPage, ElementInfo, ScrollDirection};

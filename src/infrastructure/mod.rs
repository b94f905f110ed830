//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源（Page），只暴露浏览器操作能力

pub mod chromium_surface;
pub mod surface;

pub use chromium_surface::ChromiumSurface;
pub use surface::{BrowserSurface, Locator};

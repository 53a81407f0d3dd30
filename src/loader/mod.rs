pub mod json_loader;
pub mod traits;

pub use json_loader::JsonSessionLoader;
pub use traits::SessionSource;

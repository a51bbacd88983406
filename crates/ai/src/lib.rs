mod error;
mod loader;
mod traits;

pub mod openai;

pub use error::ModelError;
pub use loader::ModelLoader;
pub use traits::*;

pub mod assets;
pub mod job;
pub mod script;

pub use assets::AssetBundle;
pub use job::*;
pub use script::{Scene, Script};

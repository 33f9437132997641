pub mod analysis;
pub mod nft;

pub use analysis::*;
pub use nft::*;

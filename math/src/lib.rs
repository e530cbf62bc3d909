mod uint;

pub use uint::{Uint192, Uint256};

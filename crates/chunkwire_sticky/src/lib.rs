mod unsticky;
pub mod map;

pub use unsticky::*;
pub use map::StickyMap;

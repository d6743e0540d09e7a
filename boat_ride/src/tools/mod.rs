pub mod coastline;
pub mod map;
pub mod score;

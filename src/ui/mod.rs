mod tracker;

pub use tracker::Bars;

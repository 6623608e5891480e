pub mod mta_sim;

pub use mta_sim::MtaSim;

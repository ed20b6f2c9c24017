pub mod midnight;

pub use midnight::MidnightRefresh;

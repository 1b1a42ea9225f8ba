pub mod ad;
pub mod adapters;
pub mod context;

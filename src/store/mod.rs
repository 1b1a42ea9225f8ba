pub mod ad_store;

pub mod ads_client;
pub mod ranker;

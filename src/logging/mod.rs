pub mod delivery_logger;
pub mod serve_log;

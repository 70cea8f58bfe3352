pub mod session_connector;
pub mod session_pipeline;

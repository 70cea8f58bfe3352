pub mod network_resolver;

pub mod clone_service;

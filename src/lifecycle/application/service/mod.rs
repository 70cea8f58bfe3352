pub mod lifecycle_service;

pub mod clone_request;

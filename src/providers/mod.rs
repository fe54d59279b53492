pub mod frankfurter;
pub mod open_er_api;

pub mod config;
pub mod d0010;
pub mod db;
pub mod services;

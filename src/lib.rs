pub mod aggregation;
pub mod api;
pub mod binder;
pub mod colormap;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod scene;
pub mod state;
pub mod visibility;

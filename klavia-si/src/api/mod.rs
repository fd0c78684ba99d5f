//! API handlers for klavia-si

pub mod health;
pub mod scores;

pub use health::health_routes;
pub use scores::score_routes;

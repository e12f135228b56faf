//! Minimal host runtime: static route selection and an upstream forwarder.
//!
//! No load balancing or discovery. Each route names exactly one upstream.

mod forward;
mod routes;

pub use forward::{forward, strip_hop_by_hop};
pub use routes::{
    RouteDefinition, RouteSelectionLayer, RouteSelectionService, RouteTable, RouteTarget,
};

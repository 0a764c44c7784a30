//! Device-side BACnet runtime: object database with priority arrays,
//! client/server transaction state machines with segmentation, network
//! layer and router, intrinsic/algorithmic event reporting, and COV
//! subscription management, all driven by a single-task application loop.

pub mod application;
pub mod config;
pub mod cov;
pub mod error;
pub mod event;
pub mod handlers;
pub mod network;
pub mod object;
pub mod peer;
pub mod tsm;

pub use application::{Application, ApplicationHandle, DiscoveredDevice};
pub use config::{BbmdPortConfig, DeviceConfig, RouterConfig, RouterPortConfig};
pub use error::{AppError, ServiceError};
pub use object::{Object, ObjectDatabase, PropertyChange};

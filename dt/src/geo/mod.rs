//! Origin resolution and great-circle distance

pub mod distance;
mod resolver;

pub use distance::{EARTH_RADIUS_M, haversine_m};
pub use resolver::{
    GeoResolver, GeolocationProvider, NoGeolocation, Position, ResolveTrigger, StaticGeolocation, city_center,
};

//! HTTP clients for the weather and AQI upstreams.
//!
//! AccuWeather supplies current conditions; the WAQI feed supplies AQI,
//! pollutant sub-indices, and basic weather as a second tier.

pub mod accuweather;
pub mod provider;
pub mod rate_limit;
pub mod waqi;

pub use accuweather::AccuWeatherClient;
pub use provider::{AqiProvider, WeatherProvider};
pub use rate_limit::RateLimiter;
pub use waqi::{WaqiClient, WaqiFeed};

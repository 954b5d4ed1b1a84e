//! Provider seams used by the fallback chain.

use async_trait::async_trait;
use common::{CurrentAqi, DataSource, Error, WeatherReport};

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn source(&self) -> DataSource;

    async fn current_weather(&self) -> Result<WeatherReport, Error>;
}

#[async_trait]
pub trait AqiProvider: Send + Sync {
    fn source(&self) -> DataSource;

    async fn current_aqi(&self) -> Result<CurrentAqi, Error>;
}

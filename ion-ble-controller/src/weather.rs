//! Weather forecasts pushed to the lamp
//!
//! `Lamp::begin_weather_updates` fetches current and forecast conditions,
//! sends them in one SetWeather packet and reschedules itself: after the
//! refresh interval on success, after the retry interval on any failure.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Timelike};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use ion_proto::{Weather, WeatherCondition};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::lamp::{Lamp, LampEvent};
use crate::transport::Central;
use crate::WeatherError;

const CURRENT_URL: &str = "http://api.openweathermap.org/data/2.5/weather";
const FORECAST_URL: &str = "http://api.openweathermap.org/data/2.5/forecast";

/// The forecast entry roughly six hours out
const FORECAST_ENTRY: usize = 1;

/// Round to the nearest degree and clamp to what the lamp can show
pub fn clamp_temperature(temp: f64) -> i8 {
    temp.round().clamp(f64::from(i8::MIN), f64::from(i8::MAX)) as i8
}

/// Map an OpenWeatherMap icon code ("10d", "13n", ...) to a lamp condition.
/// Anything unrecognised shows as hazy.
pub fn condition_for_icon(icon: &str) -> WeatherCondition {
    match icon {
        "01d" | "01n" | "02d" | "02n" => WeatherCondition::Clear,
        "03d" | "03n" | "04d" | "04n" => WeatherCondition::Clouds,
        "09d" | "09n" | "10d" | "10n" => WeatherCondition::Rain,
        "11d" | "11n" => WeatherCondition::Thunderstorm,
        "13d" | "13n" => WeatherCondition::Snow,
        _ => WeatherCondition::Hazy,
    }
}

/// Raw numbers from a weather provider, before they are fitted to the lamp
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub current_temp: f64,
    pub current_icon: String,
    pub forecast_temp: f64,
    pub forecast_icon: String,
    /// Unix seconds
    pub sunrise: i64,
    pub sunset: i64,
}

impl WeatherReport {
    /// Parse the OpenWeatherMap `weather` and `forecast` responses
    pub fn from_responses(current: &[u8], forecast: &[u8]) -> Result<Self, WeatherError> {
        let current: CurrentResponse = serde_json::from_slice(current)?;
        let forecast: ForecastResponse = serde_json::from_slice(forecast)?;

        let current_icon = current
            .weather
            .first()
            .map(|c| c.icon.clone())
            .ok_or(WeatherError::Missing("current conditions"))?;
        let entry = forecast
            .list
            .get(FORECAST_ENTRY)
            .ok_or(WeatherError::Missing("forecast entry"))?;
        let forecast_icon = entry
            .weather
            .first()
            .map(|c| c.icon.clone())
            .ok_or(WeatherError::Missing("forecast conditions"))?;

        Ok(Self {
            current_temp: current.main.temp,
            current_icon,
            forecast_temp: entry.main.temp,
            forecast_icon,
            sunrise: current.sys.sunrise,
            sunset: current.sys.sunset,
        })
    }

    /// Sunrise and sunset in local time
    pub fn to_weather(&self) -> Result<Weather, WeatherError> {
        self.to_weather_in(&chrono::Local)
    }

    pub fn to_weather_in<Tz: TimeZone>(&self, tz: &Tz) -> Result<Weather, WeatherError> {
        let (sunrise_hour, sunrise_minute) =
            hour_minute(self.sunrise, tz).ok_or(WeatherError::Missing("sunrise"))?;
        let (sunset_hour, sunset_minute) =
            hour_minute(self.sunset, tz).ok_or(WeatherError::Missing("sunset"))?;

        Ok(Weather {
            current_temp: clamp_temperature(self.current_temp),
            current_conditions: condition_for_icon(&self.current_icon),
            future_temp: clamp_temperature(self.forecast_temp),
            future_conditions: condition_for_icon(&self.forecast_icon),
            sunrise_hour,
            sunrise_minute,
            sunset_hour,
            sunset_minute,
        })
    }
}

fn hour_minute<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> Option<(u8, u8)> {
    let time = DateTime::from_timestamp(timestamp, 0)?.with_timezone(tz);
    Some((time.hour() as u8, time.minute() as u8))
}

#[derive(Deserialize)]
struct Main {
    temp: f64,
}

#[derive(Deserialize)]
struct Conditions {
    icon: String,
}

#[derive(Deserialize)]
struct Sun {
    sunrise: i64,
    sunset: i64,
}

#[derive(Deserialize)]
struct CurrentResponse {
    main: Main,
    weather: Vec<Conditions>,
    sys: Sun,
}

#[derive(Deserialize)]
struct ForecastEntry {
    main: Main,
    weather: Vec<Conditions>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastEntry>,
}

/// Where forecasts come from
pub trait WeatherSource: Send + Sync + 'static {
    fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> impl Future<Output = Result<WeatherReport, WeatherError>> + Send;
}

/// OpenWeatherMap over plain HTTP, imperial units
pub struct OpenWeatherMap {
    client: Client<HttpConnector, Full<Bytes>>,
    api_key: Option<String>,
}

impl OpenWeatherMap {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            api_key,
        }
    }

    fn url(&self, base: &str, latitude: f64, longitude: f64, count: usize) -> String {
        let mut url = format!("{base}?units=imperial&cnt={count}&lat={latitude}&lon={longitude}");
        if let Some(key) = &self.api_key {
            url.push_str("&appid=");
            url.push_str(key);
        }
        url
    }

    async fn get(&self, url: String) -> Result<Bytes, WeatherError> {
        let uri: hyper::Uri = url.parse().map_err(|e| WeatherError::Http(format!("{e}")))?;
        let response = self
            .client
            .get(uri)
            .await
            .map_err(|e| WeatherError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| WeatherError::Http(e.to_string()))?;
        Ok(body.to_bytes())
    }
}

impl WeatherSource for OpenWeatherMap {
    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<WeatherReport, WeatherError> {
        let current = self.get(self.url(CURRENT_URL, latitude, longitude, 1)).await?;
        let forecast = self
            .get(self.url(FORECAST_URL, latitude, longitude, FORECAST_ENTRY + 1))
            .await?;
        WeatherReport::from_responses(&current, &forecast)
    }
}

impl<C: Central> Lamp<C> {
    /// Fetch once and send the result to the lamp
    pub async fn push_weather<W: WeatherSource>(
        &self,
        source: &W,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), WeatherError> {
        let report = source.fetch(latitude, longitude).await?;
        let weather = report.to_weather()?;
        self.set_weather(weather).await?;
        info!(?weather, "weather updated");
        Ok(())
    }

    /// Keep the lamp's forecast fresh until the next disconnect. Replaces any
    /// earlier schedule.
    pub fn begin_weather_updates<W: WeatherSource>(&self, source: W, latitude: f64, longitude: f64) {
        self.start_weather_timer(Arc::new(source), latitude, longitude);
    }

    /// Like `begin_weather_updates`, but the schedule starts over every time
    /// the session becomes ready again, so it survives reconnects.
    pub fn keep_weather_updated<W: WeatherSource>(&self, source: W, latitude: f64, longitude: f64) {
        let source = Arc::new(source);
        let mut events = self.subscribe();
        let weak = Arc::downgrade(&self.inner);

        if self.is_ready() {
            self.start_weather_timer(source.clone(), latitude, longitude);
        }

        let watch = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LampEvent::Ready) => {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        debug!("lamp ready, restarting weather updates");
                        Lamp { inner }.start_weather_timer(source.clone(), latitude, longitude);
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return,
                }
            }
        });

        self.set_weather_watch(watch);
    }

    fn start_weather_timer<W: WeatherSource>(&self, source: Arc<W>, latitude: f64, longitude: f64) {
        let refresh = self.config().weather_refresh();
        let retry = self.config().weather_retry();
        let weak = Arc::downgrade(&self.inner);

        let timer = tokio::spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let lamp = Lamp { inner };
                let delay = match lamp.push_weather(source.as_ref(), latitude, longitude).await {
                    Ok(()) => refresh,
                    Err(e) => {
                        warn!("weather update failed, retrying in {}s: {e}", retry.as_secs());
                        retry
                    }
                };
                drop(lamp);
                tokio::time::sleep(delay).await;
            }
        });

        self.set_weather_timer(timer);
    }
}

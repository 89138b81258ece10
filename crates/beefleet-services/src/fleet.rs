//! Fleet-level operations: devices, weekly rewards, the per-device location
//! fan-out joined into dashboard rows, and one device's reward history.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use beefleet_core::{FleetConfig, ProxyError, MAX_HISTORY_WEEKS};
use chrono::{Datelike, Days, Local, NaiveDate};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::location::LocationService;
use crate::proxy::UpstreamProxy;

/// Monday of the week containing `date`.
pub fn reward_period_for(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// Monday of the current local week.
pub fn current_reward_period() -> NaiveDate {
    reward_period_for(Local::now().date_naive())
}

/// The `count` most recent reward periods up to the week containing `date`, newest first.
pub fn recent_reward_periods(date: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let current = reward_period_for(date);
    (0..count as u64)
        .filter_map(|week| current.checked_sub_days(Days::new(week * 7)))
        .collect()
}

/// Run `task` for every item on its own tokio task, at most `limit` at a time.
///
/// Results come back in completion order. A task already started finishes
/// even if the caller goes away.
pub async fn fan_out<T, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Vec<Fut::Output>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    stream::iter(items)
        .map(|item| tokio::spawn(task(item)))
        .buffer_unordered(limit.max(1))
        .filter_map(|joined| async move {
            match joined {
                Ok(output) => Some(output),
                Err(e) => {
                    tracing::warn!("Fan-out task failed: {}", e);
                    None
                }
            }
        })
        .collect()
        .await
}

/// Outcome of one device's location lookup.
#[derive(Debug)]
pub struct DeviceLocation {
    pub device_id: String,
    pub result: Result<Value, ProxyError>,
}

/// One dashboard row: a device joined with its location and rewards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetRow {
    /// `None` for devices upstream listed without a usable id
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub serial_number: Option<String>,
    pub vehicle_plate: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub last_seen: Option<Value>,
    pub honey_rewards: Option<f64>,
    pub mount_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetOverview {
    pub reward_period: String,
    pub rows: Vec<FleetRow>,
}

/// One week of a device's rewards; both figures are `None` when the week
/// has no record for the device or could not be fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReward {
    pub reward_period: String,
    pub honey_rewards: Option<f64>,
    pub mount_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardHistory {
    pub device_id: String,
    /// Newest week first
    pub weeks: Vec<WeeklyReward>,
}

pub struct FleetService {
    proxy: Arc<UpstreamProxy>,
    locations: Arc<LocationService>,
    config: FleetConfig,
}

impl FleetService {
    pub fn new(
        proxy: Arc<UpstreamProxy>,
        locations: Arc<LocationService>,
        config: FleetConfig,
    ) -> Self {
        Self {
            proxy,
            locations,
            config,
        }
    }

    pub async fn list_devices(&self) -> Result<Value, ProxyError> {
        self.proxy.forward("/devices", &[]).await
    }

    /// Rewards for the week starting at `reward_period` (`YYYY-MM-DD`, not validated here).
    pub async fn get_rewards(&self, reward_period: Option<&str>) -> Result<Value, ProxyError> {
        let reward_period = reward_period
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProxyError::InvalidInput("rewardPeriod query param required".to_string()))?;

        self.proxy
            .forward("/hivemapperRewards", &[("rewardPeriod", reward_period)])
            .await
    }

    pub async fn get_location(&self, device_id: Option<&str>) -> Result<Value, ProxyError> {
        self.locations.get_enriched_location(device_id).await
    }

    /// Enriched locations for many devices, at most `fanout_limit` in flight.
    ///
    /// Results come back in completion order.
    pub async fn locations(&self, device_ids: Vec<String>) -> Vec<DeviceLocation> {
        let limit = self.config.effective_limit(device_ids.len());
        tracing::debug!(
            "Fetching {} device locations, {} at a time",
            device_ids.len(),
            limit
        );

        let service = Arc::clone(&self.locations);
        fan_out(device_ids, limit, move |device_id| {
            let service = Arc::clone(&service);
            async move {
                let result = service.get_enriched_location(Some(&device_id)).await;
                DeviceLocation { device_id, result }
            }
        })
        .await
    }

    /// Rewards for one device over the last `weeks` reward periods (the
    /// configured default when `None`), one upstream call per week.
    ///
    /// A week that fails upstream shows up with empty figures; only a missing
    /// credential fails the whole call.
    pub async fn reward_history(
        &self,
        device_id: &str,
        weeks: Option<&str>,
    ) -> Result<RewardHistory, ProxyError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(ProxyError::InvalidInput("deviceId required".to_string()));
        }
        let weeks = parse_weeks(weeks, self.config.history_weeks)?;

        let periods = recent_reward_periods(Local::now().date_naive(), weeks);
        let limit = self.config.effective_limit(periods.len());

        let proxy = Arc::clone(&self.proxy);
        let mut results = fan_out(periods, limit, move |period| {
            let proxy = Arc::clone(&proxy);
            async move {
                let period = period.format("%Y-%m-%d").to_string();
                let result = proxy
                    .forward("/hivemapperRewards", &[("rewardPeriod", period.as_str())])
                    .await;
                (period, result)
            }
        })
        .await;
        results.sort_by(|a, b| b.0.cmp(&a.0));

        let mut history = Vec::with_capacity(results.len());
        for (reward_period, result) in results {
            let reward = match result {
                Ok(body) => index_rewards(&body).remove(device_id),
                Err(e @ ProxyError::Unauthorized(_)) => return Err(e),
                Err(e) => {
                    tracing::debug!("Rewards for {} unavailable: {}", reward_period, e);
                    None
                }
            };
            history.push(WeeklyReward {
                reward_period,
                honey_rewards: reward_field(reward.as_ref(), "rewardAmountHoney"),
                mount_rating: reward_field(reward.as_ref(), "rewardMountRating"),
            });
        }

        Ok(RewardHistory {
            device_id: device_id.to_string(),
            weeks: history,
        })
    }

    /// Devices joined with this week's rewards and their enriched locations.
    ///
    /// Only a devices failure fails the call; missing rewards or locations
    /// leave the affected fields empty.
    pub async fn overview(&self, reward_period: Option<String>) -> Result<FleetOverview, ProxyError> {
        let reward_period = reward_period
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| current_reward_period().format("%Y-%m-%d").to_string());

        let (devices, rewards) = tokio::join!(
            self.list_devices(),
            self.get_rewards(Some(reward_period.as_str()))
        );

        let devices: Vec<Value> = devices?
            .get("devices")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let rewards = match rewards {
            Ok(body) => index_rewards(&body),
            Err(e) => {
                tracing::warn!("Rewards for {} unavailable: {}", reward_period, e);
                HashMap::new()
            }
        };

        let ids: Vec<String> = devices
            .iter()
            .filter_map(|d| d.get("id").and_then(id_string))
            .collect();

        let locations: HashMap<String, Value> = self
            .locations(ids)
            .await
            .into_iter()
            .filter_map(|loc| match loc.result {
                Ok(body) => Some((loc.device_id, body)),
                Err(e) => {
                    tracing::debug!("Location for {} unavailable: {}", loc.device_id, e);
                    None
                }
            })
            .collect();

        let rows = devices
            .iter()
            .map(|device| match device.get("id").and_then(id_string) {
                Some(id) => build_row(device, Some(id.as_str()), rewards.get(&id), locations.get(&id)),
                None => {
                    tracing::debug!("Device listed without an id: {}", device);
                    build_row(device, None, None, None)
                }
            })
            .collect();

        Ok(FleetOverview {
            reward_period,
            rows,
        })
    }
}

/// Upstream ids may be strings or numbers.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `weeks` query value, or `default` when absent.
fn parse_weeks(weeks: Option<&str>, default: usize) -> Result<usize, ProxyError> {
    let Some(raw) = weeks.map(str::trim).filter(|w| !w.is_empty()) else {
        return Ok(default);
    };

    match raw.parse::<usize>() {
        Ok(n) if (1..=MAX_HISTORY_WEEKS).contains(&n) => Ok(n),
        _ => Err(ProxyError::InvalidInput(format!(
            "weeks must be between 1 and {}",
            MAX_HISTORY_WEEKS
        ))),
    }
}

fn index_rewards(body: &Value) -> HashMap<String, Value> {
    body.get("devicesWithRewards")
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .filter_map(|record| {
                    let id = record.get("device")?.get("id").and_then(id_string)?;
                    Some((id, record.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn text(value: Option<&Value>, field: &str) -> Option<String> {
    value?
        .get(field)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn reward_field(reward: Option<&Value>, field: &str) -> Option<f64> {
    reward?.get(field)?.as_f64()
}

fn build_row(
    device: &Value,
    id: Option<&str>,
    reward: Option<&Value>,
    location: Option<&Value>,
) -> FleetRow {
    FleetRow {
        id: id.map(String::from),
        name: text(Some(device), "name"),
        description: text(Some(device), "description"),
        serial_number: text(Some(device), "serialNumber"),
        vehicle_plate: text(Some(device), "vehiclePlate"),
        city: text(location, "city"),
        state: text(location, "state"),
        country: text(location, "country"),
        last_seen: location
            .and_then(|l| l.get("timestamp"))
            .filter(|t| !t.is_null())
            .cloned(),
        honey_rewards: reward_field(reward, "rewardAmountHoney"),
        mount_rating: reward_field(reward, "rewardMountRating"),
    }
}
